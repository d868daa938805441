//! Docker Engine API implementation of the cluster-engine interface

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::WardenError;
use crate::swarm::engine::SwarmEngine;
use crate::types::{
    ControllerPeer, JoinTokens, MembershipState, NodeRecord, NodeState, NodeStatus,
    RegistryCredential, ServiceRecord,
};
use crate::WardenResult;

/// Engine API version all paths are pinned to.
const ENGINE_API_VERSION: &str = "v1.43";

/// Upper bound for any single engine request.
const ENGINE_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Port controllers listen on for cluster management traffic.
const SWARM_CLUSTER_PORT: u16 = 2377;

/// Cluster engine client speaking the Docker Engine REST API.
pub struct DockerSwarmEngine {
    base_url: String,
    client: reqwest::Client,
}

impl DockerSwarmEngine {
    /// Create a client for the engine listening at `endpoint`.
    pub fn new(endpoint: &str) -> WardenResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(ENGINE_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| WardenError::Internal(format!("failed to build engine client: {e}")))?;

        Ok(Self {
            base_url: endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}{}", self.base_url, ENGINE_API_VERSION, path)
    }

    async fn ensure_success(response: reqwest::Response) -> WardenResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(WardenError::Engine(format!(
            "engine returned HTTP {status}: {}",
            body.trim()
        )))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> WardenResult<T> {
        let response = self.client.get(self.url(path)).send().await?;
        let response = Self::ensure_success(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| WardenError::Serialization(format!("engine response for {path}: {e}")))
    }

    async fn post_empty(&self, path: &str) -> WardenResult<()> {
        let response = self.client.post(self.url(path)).send().await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    async fn fetch_node(&self, node_id: &str) -> WardenResult<NodeWire> {
        let response = self
            .client
            .get(self.url(&format!("/nodes/{node_id}")))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(WardenError::NodeNotFound(node_id.to_string()));
        }
        let response = Self::ensure_success(response).await?;
        response
            .json::<NodeWire>()
            .await
            .map_err(|e| WardenError::Serialization(format!("node {node_id}: {e}")))
    }

    async fn update_node_spec(
        &self,
        node_id: &str,
        version: u64,
        spec: &NodeSpecWire,
    ) -> WardenResult<()> {
        let response = self
            .client
            .post(self.url(&format!("/nodes/{node_id}/update")))
            .query(&[("version", version)])
            .json(spec)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(WardenError::NodeNotFound(node_id.to_string()));
        }
        Self::ensure_success(response).await?;
        Ok(())
    }
}

#[async_trait]
impl SwarmEngine for DockerSwarmEngine {
    async fn current_membership(&self) -> WardenResult<MembershipState> {
        let info: InfoWire = self.get_json("/info").await?;
        membership_from_wire(info.swarm)
    }

    async fn describe_node(&self, node_id: &str) -> WardenResult<NodeRecord> {
        let node = self.fetch_node(node_id).await?;
        node_record_from_wire(node)
    }

    async fn list_nodes(&self) -> WardenResult<Vec<NodeRecord>> {
        let response = self.client.get(self.url("/nodes")).send().await?;
        // Workers are refused the node list; that is a role fact, not a fault.
        if response.status() == StatusCode::SERVICE_UNAVAILABLE {
            return Ok(Vec::new());
        }
        let response = Self::ensure_success(response).await?;
        let nodes: Vec<NodeWire> = response
            .json()
            .await
            .map_err(|e| WardenError::Serialization(format!("node list: {e}")))?;

        nodes.into_iter().map(node_record_from_wire).collect()
    }

    async fn join_tokens(&self) -> WardenResult<JoinTokens> {
        let swarm: SwarmWire = self.get_json("/swarm").await?;
        Ok(JoinTokens {
            controller: swarm.join_tokens.manager,
            worker: swarm.join_tokens.worker,
        })
    }

    async fn demote_node(&self, node_id: &str) -> WardenResult<()> {
        info!("Demoting node {} to worker", node_id);
        let node = self.fetch_node(node_id).await?;
        let mut spec = node.spec;
        spec.role = "worker".to_string();
        self.update_node_spec(node_id, node.version.index, &spec)
            .await
    }

    async fn remove_node(&self, node_id: &str) -> WardenResult<()> {
        info!("Removing node {}", node_id);
        let response = self
            .client
            .delete(self.url(&format!("/nodes/{node_id}")))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(WardenError::NodeNotFound(node_id.to_string()));
        }
        Self::ensure_success(response).await?;
        Ok(())
    }

    async fn label_node(&self, node_id: &str, key: &str, value: &str) -> WardenResult<()> {
        info!("Labeling node {} with {}={}", node_id, key, value);
        let node = self.fetch_node(node_id).await?;
        let mut spec = node.spec;
        spec.labels.insert(key.to_string(), value.to_string());
        self.update_node_spec(node_id, node.version.index, &spec)
            .await
    }

    async fn join(&self, controller_address: &str, token: &str) -> WardenResult<()> {
        info!("Joining the swarm via {}", controller_address);
        let body = json!({
            "ListenAddr": format!("0.0.0.0:{SWARM_CLUSTER_PORT}"),
            "JoinToken": token,
            "RemoteAddrs": [format!("{controller_address}:{SWARM_CLUSTER_PORT}")],
        });
        let response = self
            .client
            .post(self.url("/swarm/join"))
            .json(&body)
            .send()
            .await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    async fn leave(&self) -> WardenResult<()> {
        info!("Force-leaving the swarm");
        let response = self
            .client
            .post(self.url("/swarm/leave"))
            .query(&[("force", "true")])
            .send()
            .await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    async fn registry_login(&self, credential: &RegistryCredential) -> WardenResult<()> {
        info!("Logging in to the registry {}", credential.registry);
        let body = json!({
            "username": credential.username,
            "password": credential.password,
            "serveraddress": credential.registry,
        });
        let response = self
            .client
            .post(self.url("/auth"))
            .json(&body)
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| WardenError::Serialization(format!("auth response: {e}")))?;
        if let Some(status) = body.get("Status").and_then(Value::as_str) {
            info!("Registry login status: {}", status);
        }
        Ok(())
    }

    async fn list_services(&self) -> WardenResult<Vec<ServiceRecord>> {
        let services: Vec<ServiceWire> = self.get_json("/services").await?;
        Ok(services
            .into_iter()
            .map(|service| ServiceRecord {
                name: service
                    .spec
                    .get("Name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                id: service.id,
                version: service.version.index,
            })
            .collect())
    }

    async fn force_update_service(&self, service: &ServiceRecord) -> WardenResult<()> {
        info!("Updating the service {}", service.name);

        // Re-fetch so the spec and version are current, then bump the force
        // counter; the engine restarts tasks whenever it changes.
        let wire: ServiceWire = self.get_json(&format!("/services/{}", service.id)).await?;
        let mut spec = wire.spec;
        let force = spec
            .pointer("/TaskTemplate/ForceUpdate")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        spec["TaskTemplate"]["ForceUpdate"] = json!(force + 1);

        let response = self
            .client
            .post(self.url(&format!("/services/{}/update", service.id)))
            .query(&[("version", wire.version.index)])
            .json(&spec)
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        let update: ServiceUpdateWire = response
            .json()
            .await
            .map_err(|e| WardenError::Serialization(format!("service update response: {e}")))?;
        for warning in update.warnings.unwrap_or_default() {
            warn!("Service {} update warning: {}", service.name, warning);
        }
        Ok(())
    }

    async fn prune_containers(&self) -> WardenResult<()> {
        info!("Pruning stopped containers");
        self.post_empty("/containers/prune").await
    }

    async fn prune_images(&self) -> WardenResult<()> {
        info!("Pruning unused images");
        let response = self
            .client
            .post(self.url("/images/prune"))
            .query(&[("filters", r#"{"dangling":{"false":true}}"#)])
            .send()
            .await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    async fn prune_networks(&self) -> WardenResult<()> {
        info!("Pruning unused networks");
        self.post_empty("/networks/prune").await
    }

    async fn prune_volumes(&self) -> WardenResult<()> {
        info!("Pruning unused volumes");
        self.post_empty("/volumes/prune").await
    }
}

fn membership_from_wire(swarm: SwarmStatusWire) -> WardenResult<MembershipState> {
    let local_node_state = NodeState::from_wire(&swarm.local_node_state)?;
    let controller_peers = swarm
        .remote_managers
        .unwrap_or_default()
        .into_iter()
        .map(|manager| ControllerPeer {
            node_id: manager.node_id,
            address: manager.addr,
        })
        .collect();

    Ok(MembershipState {
        local_node_state,
        local_node_id: swarm.node_id,
        controller_peers,
    })
}

fn node_record_from_wire(node: NodeWire) -> WardenResult<NodeRecord> {
    let status = NodeStatus::from_wire(&node.status.state)?;
    let is_controller = node.spec.role == "manager";

    Ok(NodeRecord {
        node_id: node.id,
        status,
        is_controller,
        controller_address: node
            .manager_status
            .as_ref()
            .and_then(|manager| manager.addr.clone()),
        is_elected_leader: node.manager_status.as_ref().map(|manager| manager.leader),
    })
}

// --- Engine wire types -----------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InfoWire {
    swarm: SwarmStatusWire,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SwarmStatusWire {
    local_node_state: String,
    #[serde(rename = "NodeID", default)]
    node_id: String,
    #[serde(default)]
    remote_managers: Option<Vec<RemoteManagerWire>>,
}

#[derive(Debug, Deserialize)]
struct RemoteManagerWire {
    #[serde(rename = "NodeID")]
    node_id: String,
    #[serde(rename = "Addr")]
    addr: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NodeWire {
    #[serde(rename = "ID")]
    id: String,
    version: ObjectVersionWire,
    spec: NodeSpecWire,
    status: NodeStatusWire,
    #[serde(default)]
    manager_status: Option<ManagerStatusWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ObjectVersionWire {
    index: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NodeSpecWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default)]
    labels: HashMap<String, String>,
    role: String,
    availability: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NodeStatusWire {
    state: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ManagerStatusWire {
    #[serde(default)]
    leader: bool,
    #[serde(default)]
    addr: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SwarmWire {
    join_tokens: JoinTokensWire,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct JoinTokensWire {
    worker: String,
    manager: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ServiceWire {
    #[serde(rename = "ID")]
    id: String,
    version: ObjectVersionWire,
    spec: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ServiceUpdateWire {
    #[serde(default)]
    warnings: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_wire_maps_to_membership() {
        let info: InfoWire = serde_json::from_str(
            r#"{
                "Swarm": {
                    "LocalNodeState": "active",
                    "NodeID": "n1",
                    "RemoteManagers": [
                        {"NodeID": "n1", "Addr": "10.0.0.1:2377"},
                        {"NodeID": "n2", "Addr": "10.0.0.2:2377"}
                    ]
                }
            }"#,
        )
        .unwrap();

        let membership = membership_from_wire(info.swarm).unwrap();
        assert_eq!(membership.local_node_state, NodeState::Active);
        assert_eq!(membership.local_node_id, "n1");
        assert_eq!(membership.controller_peers.len(), 2);
        assert_eq!(membership.controller_peers[0].address, "10.0.0.1:2377");
        assert!(membership.is_controller());
    }

    #[test]
    fn inactive_info_has_no_managers() {
        let info: InfoWire = serde_json::from_str(
            r#"{"Swarm": {"LocalNodeState": "inactive", "NodeID": "", "RemoteManagers": null}}"#,
        )
        .unwrap();

        let membership = membership_from_wire(info.swarm).unwrap();
        assert_eq!(membership.local_node_state, NodeState::Inactive);
        assert!(membership.controller_peers.is_empty());
        assert!(!membership.is_controller());
        assert!(!membership.is_worker());
    }

    #[test]
    fn unknown_local_node_state_fails_closed() {
        let info: InfoWire = serde_json::from_str(
            r#"{"Swarm": {"LocalNodeState": "bootstrapping", "NodeID": "n1"}}"#,
        )
        .unwrap();

        let err = membership_from_wire(info.swarm).unwrap_err();
        assert!(matches!(err, WardenError::UnknownState(_)));
    }

    #[test]
    fn node_wire_maps_to_record() {
        let node: NodeWire = serde_json::from_str(
            r#"{
                "ID": "n2",
                "Version": {"Index": 17},
                "Spec": {"Labels": {"zone": "a"}, "Role": "manager", "Availability": "active"},
                "Status": {"State": "ready"},
                "ManagerStatus": {"Leader": true, "Addr": "10.0.0.2:2377"}
            }"#,
        )
        .unwrap();

        let record = node_record_from_wire(node).unwrap();
        assert_eq!(record.node_id, "n2");
        assert_eq!(record.status, NodeStatus::Ready);
        assert!(record.is_controller);
        assert_eq!(record.controller_address.as_deref(), Some("10.0.0.2:2377"));
        assert_eq!(record.is_elected_leader, Some(true));
    }

    #[test]
    fn worker_node_has_no_manager_fields() {
        let node: NodeWire = serde_json::from_str(
            r#"{
                "ID": "n3",
                "Version": {"Index": 4},
                "Spec": {"Role": "worker", "Availability": "active"},
                "Status": {"State": "down"}
            }"#,
        )
        .unwrap();

        let record = node_record_from_wire(node).unwrap();
        assert_eq!(record.status, NodeStatus::Down);
        assert!(!record.is_controller);
        assert!(record.controller_address.is_none());
        assert!(record.is_elected_leader.is_none());
    }

    #[test]
    fn node_spec_round_trips_for_updates() {
        let mut spec: NodeSpecWire = serde_json::from_str(
            r#"{"Labels": {}, "Role": "manager", "Availability": "active"}"#,
        )
        .unwrap();
        spec.role = "worker".to_string();
        spec.labels
            .insert("availability-zone".to_string(), "eu-west-1a".to_string());

        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["Role"], "worker");
        assert_eq!(json["Labels"]["availability-zone"], "eu-west-1a");
        // An absent name must stay absent, not serialize as null.
        assert!(json.get("Name").is_none());
    }

    #[test]
    fn swarm_wire_exposes_both_tokens() {
        let swarm: SwarmWire = serde_json::from_str(
            r#"{"JoinTokens": {"Worker": "SWMTKN-w", "Manager": "SWMTKN-m"}}"#,
        )
        .unwrap();
        assert_eq!(swarm.join_tokens.worker, "SWMTKN-w");
        assert_eq!(swarm.join_tokens.manager, "SWMTKN-m");
    }

    #[test]
    fn engine_url_is_version_pinned() {
        let engine = DockerSwarmEngine::new("http://localhost:2375/").unwrap();
        assert_eq!(engine.url("/info"), "http://localhost:2375/v1.43/info");
        assert_eq!(
            engine.url("/nodes/n1/update"),
            "http://localhost:2375/v1.43/nodes/n1/update"
        );
    }
}
