//! Engine maintenance actions
//!
//! Garbage collection and registry credential refresh, executed through the
//! cluster engine. Leadership gating happens in the warden; these actions
//! only know how to do the work.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{PruneConfig, WardenConfig};
use crate::swarm::SwarmEngine;
use crate::types::RegistryCredential;
use crate::WardenResult;

/// Maintenance executor bound to one engine and the configured gc flags.
pub struct MaintenanceActions {
    engine: Arc<dyn SwarmEngine>,
    registry: String,
    prune: PruneConfig,
}

impl MaintenanceActions {
    /// Create maintenance actions for the given engine.
    pub fn new(engine: Arc<dyn SwarmEngine>, config: &WardenConfig) -> Self {
        Self {
            engine,
            registry: config.registry.clone(),
            prune: config.prune.clone(),
        }
    }

    /// Garbage-collect unused engine resources.
    ///
    /// Containers go first so images they pinned become reclaimable; images
    /// and volumes are each gated by their configuration flag.
    pub async fn prune_system(&self) -> WardenResult<()> {
        info!("Pruning engine resources");
        self.engine.prune_containers().await?;

        if self.prune.images {
            self.engine.prune_images().await?;
        }

        self.engine.prune_networks().await?;

        if self.prune.volumes {
            self.engine.prune_volumes().await?;
        }

        Ok(())
    }

    /// Decode a broker token, re-authenticate the engine against the
    /// registry, and roll every running service so its tasks re-pull under
    /// the refreshed login.
    ///
    /// Service updates are independent and best effort; one failing service
    /// never stops the remaining updates.
    pub async fn refresh_credentials(&self, broker_token: &str) -> WardenResult<()> {
        let credential = RegistryCredential::from_broker_token(broker_token, &self.registry)?;
        info!(
            "Refreshing the registry login for {} as {}",
            credential.registry, credential.username
        );
        self.engine.registry_login(&credential).await?;

        let services = self.engine.list_services().await?;
        info!(
            "Rolling {} service(s) to pick up the refreshed login",
            services.len()
        );
        for service in &services {
            if let Err(e) = self.engine.force_update_service(service).await {
                warn!("Failed to update the service {}: {}", service.name, e);
            }
        }

        Ok(())
    }
}
