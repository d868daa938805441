//! The consumed cluster-engine interface

use async_trait::async_trait;

use crate::types::{
    JoinTokens, MembershipState, NodeRecord, RegistryCredential, ServiceRecord,
};
use crate::WardenResult;

/// Everything the warden needs from the underlying cluster engine.
///
/// Queries are idempotent and side-effect free. Mutations are accepted, not
/// confirmed: the engine acknowledges the request and converges afterwards,
/// so callers re-query to observe the outcome.
#[async_trait]
pub trait SwarmEngine: Send + Sync {
    /// Read the local node's membership snapshot.
    ///
    /// Fails with [`crate::WardenError::EngineUnavailable`] when the local
    /// engine cannot be reached.
    async fn current_membership(&self) -> WardenResult<MembershipState>;

    /// Describe a single node.
    ///
    /// Fails with [`crate::WardenError::NodeNotFound`] when the id no longer
    /// exists; racing a concurrent removal is expected and non-fatal for
    /// callers.
    async fn describe_node(&self, node_id: &str) -> WardenResult<NodeRecord>;

    /// List all cluster nodes.
    ///
    /// Returns an empty list, not an error, when the local node is not a
    /// controller, since only controllers can enumerate the node set.
    async fn list_nodes(&self) -> WardenResult<Vec<NodeRecord>>;

    /// Fetch the current membership tokens. Controller only.
    async fn join_tokens(&self) -> WardenResult<JoinTokens>;

    /// Demote a controller node to the worker role.
    async fn demote_node(&self, node_id: &str) -> WardenResult<()>;

    /// Remove a node from the cluster.
    async fn remove_node(&self, node_id: &str) -> WardenResult<()>;

    /// Set a label on a node.
    async fn label_node(&self, node_id: &str, key: &str, value: &str) -> WardenResult<()>;

    /// Join the cluster through the given controller using a membership token.
    async fn join(&self, controller_address: &str, token: &str) -> WardenResult<()>;

    /// Force-leave the cluster.
    async fn leave(&self) -> WardenResult<()>;

    /// Re-authenticate the engine against the private registry.
    async fn registry_login(&self, credential: &RegistryCredential) -> WardenResult<()>;

    /// List all running services. Controller only.
    async fn list_services(&self) -> WardenResult<Vec<ServiceRecord>>;

    /// Trigger a rolling update of a service so its tasks re-pull their image.
    async fn force_update_service(&self, service: &ServiceRecord) -> WardenResult<()>;

    /// Remove stopped containers.
    async fn prune_containers(&self) -> WardenResult<()>;

    /// Remove unused images.
    async fn prune_images(&self) -> WardenResult<()>;

    /// Remove unused networks.
    async fn prune_networks(&self) -> WardenResult<()>;

    /// Remove unused volumes.
    async fn prune_volumes(&self) -> WardenResult<()>;
}
