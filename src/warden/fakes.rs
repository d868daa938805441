//! In-memory fakes for exercising the warden without a live cluster

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::discovery::{CredentialBroker, PeerDiscovery};
use crate::error::WardenError;
use crate::swarm::SwarmEngine;
use crate::types::{
    ControllerPeer, JoinTokens, MembershipState, NodeRecord, NodeState, NodeStatus,
    RegistryCredential, ServiceRecord,
};
use crate::WardenResult;

/// Scriptable engine that records every call it receives.
pub(crate) struct FakeEngine {
    pub membership: Mutex<MembershipState>,
    /// Membership to report after a successful join.
    pub post_join_membership: Mutex<Option<MembershipState>>,
    /// Record returned by `describe_node`; `None` means the node vanished.
    pub self_record: Mutex<Option<NodeRecord>>,
    pub nodes: Mutex<Vec<NodeRecord>>,
    pub tokens: Mutex<Option<JoinTokens>>,
    pub services: Mutex<Vec<ServiceRecord>>,
    /// Service ids whose update fails.
    pub failing_services: Mutex<HashSet<String>>,
    /// Node ids whose removal fails.
    pub failing_removals: Mutex<HashSet<String>>,
    pub fail_join: Mutex<bool>,
    calls: Mutex<Vec<String>>,
}

impl FakeEngine {
    pub fn new(membership: MembershipState) -> Self {
        Self {
            membership: Mutex::new(membership),
            post_join_membership: Mutex::new(None),
            self_record: Mutex::new(None),
            nodes: Mutex::new(Vec::new()),
            tokens: Mutex::new(None),
            services: Mutex::new(Vec::new()),
            failing_services: Mutex::new(HashSet::new()),
            failing_removals: Mutex::new(HashSet::new()),
            fail_join: Mutex::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl SwarmEngine for FakeEngine {
    async fn current_membership(&self) -> WardenResult<MembershipState> {
        self.record("current_membership");
        Ok(self.membership.lock().unwrap().clone())
    }

    async fn describe_node(&self, node_id: &str) -> WardenResult<NodeRecord> {
        self.record(format!("describe_node:{node_id}"));
        self.self_record
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| WardenError::NodeNotFound(node_id.to_string()))
    }

    async fn list_nodes(&self) -> WardenResult<Vec<NodeRecord>> {
        self.record("list_nodes");
        Ok(self.nodes.lock().unwrap().clone())
    }

    async fn join_tokens(&self) -> WardenResult<JoinTokens> {
        self.record("join_tokens");
        self.tokens
            .lock()
            .unwrap()
            .clone()
            .ok_or(WardenError::NotController)
    }

    async fn demote_node(&self, node_id: &str) -> WardenResult<()> {
        self.record(format!("demote:{node_id}"));
        Ok(())
    }

    async fn remove_node(&self, node_id: &str) -> WardenResult<()> {
        self.record(format!("remove:{node_id}"));
        if self.failing_removals.lock().unwrap().contains(node_id) {
            return Err(WardenError::Engine(format!("cannot remove {node_id}")));
        }
        Ok(())
    }

    async fn label_node(&self, node_id: &str, key: &str, value: &str) -> WardenResult<()> {
        self.record(format!("label:{node_id}:{key}={value}"));
        Ok(())
    }

    async fn join(&self, controller_address: &str, token: &str) -> WardenResult<()> {
        self.record(format!("join:{controller_address}:{token}"));
        if *self.fail_join.lock().unwrap() {
            return Err(WardenError::Engine("join rejected".to_string()));
        }
        if let Some(membership) = self.post_join_membership.lock().unwrap().take() {
            *self.membership.lock().unwrap() = membership;
        }
        Ok(())
    }

    async fn leave(&self) -> WardenResult<()> {
        self.record("leave");
        Ok(())
    }

    async fn registry_login(&self, credential: &RegistryCredential) -> WardenResult<()> {
        self.record(format!(
            "login:{}@{}",
            credential.username, credential.registry
        ));
        Ok(())
    }

    async fn list_services(&self) -> WardenResult<Vec<ServiceRecord>> {
        self.record("list_services");
        Ok(self.services.lock().unwrap().clone())
    }

    async fn force_update_service(&self, service: &ServiceRecord) -> WardenResult<()> {
        self.record(format!("update_service:{}", service.name));
        if self.failing_services.lock().unwrap().contains(&service.id) {
            return Err(WardenError::Engine(format!(
                "update of {} failed",
                service.name
            )));
        }
        Ok(())
    }

    async fn prune_containers(&self) -> WardenResult<()> {
        self.record("prune_containers");
        Ok(())
    }

    async fn prune_images(&self) -> WardenResult<()> {
        self.record("prune_images");
        Ok(())
    }

    async fn prune_networks(&self) -> WardenResult<()> {
        self.record("prune_networks");
        Ok(())
    }

    async fn prune_volumes(&self) -> WardenResult<()> {
        self.record("prune_volumes");
        Ok(())
    }
}

/// Discovery fake returning a fixed candidate list.
pub(crate) struct FakeDiscovery {
    pub candidates: Mutex<Vec<String>>,
    pub calls: Mutex<usize>,
}

impl FakeDiscovery {
    pub fn with_candidates(candidates: Vec<String>) -> Self {
        Self {
            candidates: Mutex::new(candidates),
            calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl PeerDiscovery for FakeDiscovery {
    async fn controller_candidates(&self) -> WardenResult<Vec<String>> {
        *self.calls.lock().unwrap() += 1;
        Ok(self.candidates.lock().unwrap().clone())
    }
}

/// Broker fake returning a fixed token.
pub(crate) struct FakeBroker {
    pub token: Mutex<Option<String>>,
    pub calls: Mutex<usize>,
}

impl FakeBroker {
    pub fn with_token(token: &str) -> Self {
        Self {
            token: Mutex::new(Some(token.to_string())),
            calls: Mutex::new(0),
        }
    }

    pub fn empty() -> Self {
        Self {
            token: Mutex::new(None),
            calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl CredentialBroker for FakeBroker {
    async fn request_auth_token(&self) -> WardenResult<String> {
        *self.calls.lock().unwrap() += 1;
        self.token
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| WardenError::Credential("no token scripted".to_string()))
    }
}

// --- membership and node builders ------------------------------------------

pub(crate) fn inactive_membership() -> MembershipState {
    MembershipState {
        local_node_state: NodeState::Inactive,
        local_node_id: String::new(),
        controller_peers: Vec::new(),
    }
}

pub(crate) fn degraded_membership(state: NodeState) -> MembershipState {
    MembershipState {
        local_node_state: state,
        local_node_id: String::new(),
        controller_peers: Vec::new(),
    }
}

pub(crate) fn active_controller_membership(node_id: &str) -> MembershipState {
    MembershipState {
        local_node_state: NodeState::Active,
        local_node_id: node_id.to_string(),
        controller_peers: vec![
            ControllerPeer {
                node_id: node_id.to_string(),
                address: "10.0.0.1:2377".to_string(),
            },
            ControllerPeer {
                node_id: "other-controller".to_string(),
                address: "10.0.0.2:2377".to_string(),
            },
        ],
    }
}

pub(crate) fn active_worker_membership(node_id: &str) -> MembershipState {
    MembershipState {
        local_node_state: NodeState::Active,
        local_node_id: node_id.to_string(),
        controller_peers: vec![ControllerPeer {
            node_id: "some-controller".to_string(),
            address: "10.0.0.1:2377".to_string(),
        }],
    }
}

pub(crate) fn node(node_id: &str, status: NodeStatus, is_controller: bool) -> NodeRecord {
    NodeRecord {
        node_id: node_id.to_string(),
        status,
        is_controller,
        controller_address: is_controller.then(|| "10.0.0.1:2377".to_string()),
        is_elected_leader: is_controller.then_some(false),
    }
}
