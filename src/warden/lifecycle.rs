//! The convergence engine
//!
//! `SwarmWarden` owns no mutable state. Every operation pulls a fresh
//! membership snapshot, decides, and executes, so ticks are idempotent and
//! safe to repeat after any partial failure.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::WardenConfig;
use crate::discovery::{CredentialBroker, PeerDiscovery};
use crate::error::WardenError;
use crate::maintenance::MaintenanceActions;
use crate::swarm::SwarmEngine;
use crate::types::{JoinHandshake, MembershipState, NodeRecord, NodeStatus, SystemInfo};
use crate::warden::convergence::{self, Action};
use crate::WardenResult;

/// Node label key carrying the availability zone.
pub const ZONE_LABEL_KEY: &str = "availability-zone";

/// Upper bound for one peer-join handshake request.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// The role-convergence engine.
pub struct SwarmWarden {
    config: WardenConfig,
    engine: Arc<dyn SwarmEngine>,
    discovery: Arc<dyn PeerDiscovery>,
    broker: Arc<dyn CredentialBroker>,
    maintenance: MaintenanceActions,
    handshake_client: reqwest::Client,
}

impl SwarmWarden {
    /// Create a warden over the given adapters.
    pub fn new(
        config: WardenConfig,
        engine: Arc<dyn SwarmEngine>,
        discovery: Arc<dyn PeerDiscovery>,
        broker: Arc<dyn CredentialBroker>,
    ) -> WardenResult<Self> {
        let handshake_client = reqwest::Client::builder()
            .timeout(HANDSHAKE_TIMEOUT)
            .build()
            .map_err(|e| WardenError::Internal(format!("failed to build handshake client: {e}")))?;

        let maintenance = MaintenanceActions::new(engine.clone(), &config);

        Ok(Self {
            config,
            engine,
            discovery,
            broker,
            maintenance,
            handshake_client,
        })
    }

    /// Converge this node toward its desired role.
    ///
    /// One decision per call, recomputed from a fresh membership snapshot.
    /// A role mismatch on an active member is returned as an error for the
    /// operator; everything else is handled here.
    pub async fn assume_role(&self) -> WardenResult<()> {
        let membership = self.engine.current_membership().await?;

        match convergence::decide_action(&membership, self.config.desired_role) {
            Action::NoOp => {
                debug!(
                    "Membership already matches the desired role {}",
                    self.config.desired_role.as_str()
                );
                Ok(())
            }
            Action::LeaveAndClean => self.leave_and_clean().await,
            Action::Join => self.join_cluster().await,
            Action::RaiseRoleMismatch => Err(WardenError::RoleMismatch {
                actual: convergence::observed_role(&membership).to_string(),
                desired: self.config.desired_role.as_str().to_string(),
            }),
        }
    }

    /// True when this node is an active controller and the engine reports it
    /// as the elected leader.
    pub async fn is_leader(&self) -> WardenResult<bool> {
        let membership = self.engine.current_membership().await?;
        if !membership.is_controller() {
            return Ok(false);
        }

        match self.engine.describe_node(&membership.local_node_id).await {
            Ok(record) => Ok(record.is_elected_leader.unwrap_or(false)),
            // The node record can vanish while we look at it; the next tick
            // re-evaluates from scratch.
            Err(WardenError::NodeNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Remove every node that is not ready. Leader only.
    ///
    /// Controllers are demoted before removal. A failure on one node never
    /// aborts the sweep, so a single unreachable node cannot block cleanup
    /// of the rest.
    pub async fn prune_nodes(&self) -> WardenResult<()> {
        self.require_leader().await?;

        let nodes = self.engine.list_nodes().await?;
        for node in &nodes {
            if node.status == NodeStatus::Ready {
                continue;
            }
            info!(
                "Pruning node {} in status {}",
                node.node_id,
                node.status.as_wire()
            );
            if let Err(e) = self.remove_unhealthy_node(node).await {
                warn!("Failed to prune node {}: {}", node.node_id, e);
            }
        }

        Ok(())
    }

    /// Refresh the registry login and roll all services. Leader only.
    pub async fn refresh_auth(&self) -> WardenResult<()> {
        self.require_leader().await?;

        let token = self.broker.request_auth_token().await?;
        self.maintenance.refresh_credentials(&token).await
    }

    /// Garbage-collect local engine resources. Runs on every node.
    pub async fn prune_system(&self) -> WardenResult<()> {
        self.maintenance.prune_system().await
    }

    /// The payload served to joining peers.
    ///
    /// Only an active controller may hand out membership tokens; any other
    /// membership state refuses without touching the token endpoint.
    pub async fn join_info(&self) -> WardenResult<JoinHandshake> {
        let membership = self.engine.current_membership().await?;
        if !membership.is_controller() {
            return Err(WardenError::NotController);
        }

        let address = local_controller_address(&membership)?;
        let tokens = self.engine.join_tokens().await?;

        Ok(JoinHandshake {
            address,
            controller_token: tokens.controller,
            worker_token: tokens.worker,
        })
    }

    /// Read-only projection of the node's view of the cluster.
    pub async fn system_info(&self) -> WardenResult<SystemInfo> {
        let membership = self.engine.current_membership().await?;
        let role = convergence::observed_role(&membership).to_string();
        let nodes = self.engine.list_nodes().await?;
        let discovered_peers = self.discovery.controller_candidates().await?;

        Ok(SystemInfo {
            membership,
            role,
            nodes,
            discovered_peers,
        })
    }

    async fn require_leader(&self) -> WardenResult<()> {
        if self.is_leader().await? {
            Ok(())
        } else {
            Err(WardenError::NotLeader)
        }
    }

    /// The node is assumed corrupted: force-leave, then shed engine state so
    /// the next tick can retry a clean join.
    async fn leave_and_clean(&self) -> WardenResult<()> {
        warn!("Local membership is degraded, leaving the swarm and shedding engine state");
        self.engine.leave().await?;
        self.maintenance.prune_system().await
    }

    /// Try the discovered candidates in order until one join succeeds.
    ///
    /// Every per-candidate failure is logged and swallowed; exhausting the
    /// list ends the cycle without an error so the next tick retries.
    async fn join_cluster(&self) -> WardenResult<()> {
        let candidates = self.discovery.controller_candidates().await?;
        if candidates.is_empty() {
            warn!("No controller candidates discovered, retrying next cycle");
            return Ok(());
        }

        info!(
            "Attempting to join the swarm as {} via {} candidate(s)",
            self.config.desired_role.as_str(),
            candidates.len()
        );
        for candidate in &candidates {
            match self.try_join_candidate(candidate).await {
                Ok(()) => {
                    info!("Joined the swarm via {}", candidate);
                    self.reapply_zone_label().await;
                    return Ok(());
                }
                Err(e) => warn!("Join candidate {} failed: {}", candidate, e),
            }
        }

        warn!("Exhausted all join candidates without success");
        Ok(())
    }

    async fn try_join_candidate(&self, candidate: &str) -> WardenResult<()> {
        let url = join_url(candidate);
        let response = self
            .handshake_client
            .get(&url)
            .send()
            .await
            .map_err(|e| WardenError::Join(format!("handshake request to {url} failed: {e}")))?;
        if !response.status().is_success() {
            return Err(WardenError::Join(format!(
                "handshake to {} returned HTTP {}",
                candidate,
                response.status()
            )));
        }

        let handshake: JoinHandshake = response.json().await.map_err(|e| {
            WardenError::Join(format!("malformed handshake payload from {candidate}: {e}"))
        })?;

        let token = handshake.token_for(self.config.desired_role);
        self.engine.join(&handshake.address, token).await
    }

    /// Leaving and re-joining resets node metadata, so the zone label is
    /// written again after every successful join. Best effort: the join
    /// already happened, a label failure only costs placement hints.
    async fn reapply_zone_label(&self) {
        let result = async {
            let membership = self.engine.current_membership().await?;
            self.engine
                .label_node(&membership.local_node_id, ZONE_LABEL_KEY, &self.config.zone_label)
                .await
        }
        .await;

        if let Err(e) = result {
            warn!("Failed to re-apply the availability zone label: {}", e);
        }
    }

    async fn remove_unhealthy_node(&self, node: &NodeRecord) -> WardenResult<()> {
        if node.is_controller {
            self.engine.demote_node(&node.node_id).await?;
        }
        self.engine.remove_node(&node.node_id).await
    }
}

/// Address a joiner should dial for a candidate. Discovery hands out bare
/// hosts; anything already carrying a port is used as-is.
fn join_url(candidate: &str) -> String {
    if candidate.contains(':') {
        format!("http://{candidate}/join")
    } else {
        format!("http://{}:{}/join", candidate, crate::JOIN_PORT)
    }
}

/// The advertise address of this controller, taken from its own entry in the
/// controller peer list.
fn local_controller_address(membership: &MembershipState) -> WardenResult<String> {
    let peer = membership
        .controller_peers
        .iter()
        .find(|peer| peer.node_id == membership.local_node_id)
        .ok_or_else(|| {
            WardenError::Internal("active controller missing from its own peer list".to_string())
        })?;

    let host = peer
        .address
        .split(':')
        .next()
        .unwrap_or(peer.address.as_str());
    Ok(host.to_string())
}
