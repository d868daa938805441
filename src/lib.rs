//! Swarm Warden - self-managing swarm sidecar daemon
//!
//! Runs on every node of a Docker Swarm cluster, converges the node toward
//! its operator-declared role, and performs cluster maintenance on the
//! elected leader.

pub mod config;
pub mod discovery;
pub mod error;
pub mod health;
pub mod http;
pub mod maintenance;
pub mod scheduler;
pub mod swarm;
pub mod types;
pub mod warden;

/// Warden version
pub const WARDEN_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Warden name
pub const WARDEN_NAME: &str = "swarm-warden";

/// Default status server bind address
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:2380";

/// Default cluster engine API endpoint
pub const DEFAULT_ENGINE_ENDPOINT: &str = "http://localhost:2375";

/// Port peers dial for the join handshake
pub const JOIN_PORT: u16 = 2380;

/// Delay before the one-off convergence attempt at startup
pub const STARTUP_CONVERGENCE_DELAY_SECS: u64 = 5;

// Re-export main types for convenience
pub use config::WardenConfig;
pub use error::WardenError;
pub use types::*;
pub use warden::SwarmWarden;

/// Result type for warden operations
pub type WardenResult<T> = Result<T, WardenError>;

use std::sync::Arc;

use discovery::{Ec2PeerDiscovery, EcrCredentialBroker};
use swarm::DockerSwarmEngine;

/// Initialize a warden over the real engine, discovery, and broker clients.
pub async fn init_warden(config: WardenConfig) -> WardenResult<SwarmWarden> {
    tracing::info!("Initializing Swarm Warden v{}", WARDEN_VERSION);

    let engine = Arc::new(DockerSwarmEngine::new(&config.engine_endpoint)?);
    let peer_discovery = Arc::new(Ec2PeerDiscovery::new(&config.peer_filter).await);
    let credential_broker = Arc::new(EcrCredentialBroker::new().await);

    let warden = SwarmWarden::new(config, engine, peer_discovery, credential_broker)?;
    tracing::info!("Swarm Warden initialization completed");

    Ok(warden)
}
