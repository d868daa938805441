//! Peer discovery and registry credential acquisition

pub mod aws;

use async_trait::async_trait;

use crate::WardenResult;

pub use aws::{Ec2PeerDiscovery, EcrCredentialBroker};

/// Lists network addresses of nodes that might be acting controllers.
///
/// The returned order is advisory; callers try candidates in it.
#[async_trait]
pub trait PeerDiscovery: Send + Sync {
    async fn controller_candidates(&self) -> WardenResult<Vec<String>>;
}

/// Issues short-lived registry authorization tokens.
///
/// Tokens are opaque `base64(user:pass)` strings, decoded by the caller and
/// discarded after a single refresh cycle.
#[async_trait]
pub trait CredentialBroker: Send + Sync {
    async fn request_auth_token(&self) -> WardenResult<String>;
}
