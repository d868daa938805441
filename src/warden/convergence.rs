//! Role convergence decisions
//!
//! The decision function is stateless: it takes a fresh membership snapshot
//! and the configured role and returns the one action the node must take.
//! It never executes anything itself, which keeps every tick idempotent.

use crate::types::{DesiredRole, MembershipState, NodeState};

/// The action required to align this node with its desired role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Membership already matches the desired role.
    NoOp,
    /// Membership is degraded; shed cluster state and retry from scratch.
    LeaveAndClean,
    /// Not a member; attempt a join through the discovered controllers.
    Join,
    /// Active membership contradicts the desired role; an operator must
    /// resolve this, the engine never forces a role change on an active
    /// member.
    RaiseRoleMismatch,
}

/// Decide the action for the observed membership and configured role.
pub fn decide_action(membership: &MembershipState, desired_role: DesiredRole) -> Action {
    if matches!(
        membership.local_node_state,
        NodeState::Pending | NodeState::Error
    ) {
        return Action::LeaveAndClean;
    }

    if membership.is_active() {
        let role_matches = match desired_role {
            DesiredRole::Controller => membership.is_controller(),
            DesiredRole::Worker => membership.is_worker(),
        };
        if role_matches {
            Action::NoOp
        } else {
            Action::RaiseRoleMismatch
        }
    } else {
        Action::Join
    }
}

/// The role the membership snapshot actually shows, for reporting.
pub fn observed_role(membership: &MembershipState) -> &'static str {
    if membership.is_controller() {
        "controller"
    } else if membership.is_worker() {
        "worker"
    } else {
        "none"
    }
}
