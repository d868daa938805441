//! Domain types shared across the warden

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::WardenError;

/// Local membership state of the node as reported by the cluster engine.
///
/// The wire mapping is closed: values the engine might add in the future are
/// rejected with [`WardenError::UnknownState`] instead of being folded into a
/// default variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    None,
    Inactive,
    Pending,
    Active,
    Error,
    Locked,
}

impl NodeState {
    /// Decode an engine wire value.
    pub fn from_wire(value: &str) -> Result<Self, WardenError> {
        match value {
            "none" => Ok(NodeState::None),
            "inactive" => Ok(NodeState::Inactive),
            "pending" => Ok(NodeState::Pending),
            "active" => Ok(NodeState::Active),
            "error" => Ok(NodeState::Error),
            "locked" => Ok(NodeState::Locked),
            other => Err(WardenError::UnknownState(format!(
                "node state {other:?}"
            ))),
        }
    }

    /// The engine wire value for this state.
    pub fn as_wire(&self) -> &'static str {
        match self {
            NodeState::None => "none",
            NodeState::Inactive => "inactive",
            NodeState::Pending => "pending",
            NodeState::Active => "active",
            NodeState::Error => "error",
            NodeState::Locked => "locked",
        }
    }
}

/// Reachability status of a cluster node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Unknown,
    Down,
    Ready,
    Disconnected,
}

impl NodeStatus {
    /// Decode an engine wire value.
    pub fn from_wire(value: &str) -> Result<Self, WardenError> {
        match value {
            "unknown" => Ok(NodeStatus::Unknown),
            "down" => Ok(NodeStatus::Down),
            "ready" => Ok(NodeStatus::Ready),
            "disconnected" => Ok(NodeStatus::Disconnected),
            other => Err(WardenError::UnknownState(format!(
                "node status {other:?}"
            ))),
        }
    }

    /// The engine wire value for this status.
    pub fn as_wire(&self) -> &'static str {
        match self {
            NodeStatus::Unknown => "unknown",
            NodeStatus::Down => "down",
            NodeStatus::Ready => "ready",
            NodeStatus::Disconnected => "disconnected",
        }
    }
}

/// A known controller peer and the address it manages the cluster on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerPeer {
    pub node_id: String,
    pub address: String,
}

/// Snapshot of the local node's cluster membership.
///
/// Recomputed fresh on every query and never cached across ticks. The node id
/// and peer list are only meaningful while the membership is active, which is
/// why every predicate below checks activity first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipState {
    pub local_node_state: NodeState,
    pub local_node_id: String,
    pub controller_peers: Vec<ControllerPeer>,
}

impl MembershipState {
    /// True when the node is an active cluster member.
    pub fn is_active(&self) -> bool {
        self.local_node_state == NodeState::Active
    }

    /// True when the node is an active member holding the controller role.
    pub fn is_controller(&self) -> bool {
        self.is_active()
            && self
                .controller_peers
                .iter()
                .any(|peer| peer.node_id == self.local_node_id)
    }

    /// True when the node is an active member without the controller role.
    pub fn is_worker(&self) -> bool {
        self.is_active() && !self.is_controller()
    }
}

/// A single node as seen by a controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub node_id: String,
    pub status: NodeStatus,
    pub is_controller: bool,
    pub controller_address: Option<String>,
    pub is_elected_leader: Option<bool>,
}

/// The role this node should converge toward, fixed for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesiredRole {
    Controller,
    Worker,
}

impl DesiredRole {
    /// Parse the configured role; anything but the two known values is a
    /// fatal configuration error.
    pub fn from_config(value: &str) -> Result<Self, WardenError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "controller" => Ok(DesiredRole::Controller),
            "worker" => Ok(DesiredRole::Worker),
            other => Err(WardenError::Configuration(format!(
                "desired role must be \"controller\" or \"worker\", got {other:?}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DesiredRole::Controller => "controller",
            DesiredRole::Worker => "worker",
        }
    }
}

/// The pair of membership tokens issued by the cluster engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTokens {
    pub controller: String,
    pub worker: String,
}

impl JoinTokens {
    /// Select the token matching the desired role.
    pub fn for_role(&self, role: DesiredRole) -> &str {
        match role {
            DesiredRole::Controller => &self.controller,
            DesiredRole::Worker => &self.worker,
        }
    }
}

/// Payload a controller returns to a node requesting to join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinHandshake {
    pub address: String,
    pub controller_token: String,
    pub worker_token: String,
}

impl JoinHandshake {
    /// Select the token matching the desired role.
    pub fn token_for(&self, role: DesiredRole) -> &str {
        match role {
            DesiredRole::Controller => &self.controller_token,
            DesiredRole::Worker => &self.worker_token,
        }
    }
}

/// A short-lived registry login, used once per refresh cycle then discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryCredential {
    pub username: String,
    pub password: String,
    pub registry: String,
}

impl RegistryCredential {
    /// Decode a broker authorization token of the form `base64(user:pass)`.
    pub fn from_broker_token(token: &str, registry: &str) -> Result<Self, WardenError> {
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(token.trim())
            .map_err(|e| {
                WardenError::Credential(format!("broker token is not valid base64: {e}"))
            })?;
        let decoded = String::from_utf8(decoded)
            .map_err(|_| WardenError::Credential("broker token is not valid UTF-8".to_string()))?;
        let (username, password) = decoded.split_once(':').ok_or_else(|| {
            WardenError::Credential("broker token is missing the user:pass separator".to_string())
        })?;

        Ok(Self {
            username: username.to_string(),
            password: password.to_string(),
            registry: registry.to_string(),
        })
    }
}

/// A running service, identified well enough to trigger a rolling update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub id: String,
    pub name: String,
    pub version: u64,
}

/// Read-only projection of the node's view of the cluster.
#[derive(Debug, Clone, Serialize)]
pub struct SystemInfo {
    pub membership: MembershipState,
    pub role: String,
    pub nodes: Vec<NodeRecord>,
    pub discovered_peers: Vec<String>,
}
