//! Error types for Swarm Warden

use thiserror::Error;

/// Error type for warden operations
#[derive(Error, Debug)]
pub enum WardenError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Cluster engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Cluster engine error: {0}")]
    Engine(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Unknown engine state: {0}")]
    UnknownState(String),

    #[error("This node is not a controller")]
    NotController,

    #[error("This node is not the elected leader")]
    NotLeader,

    #[error("Active membership role \"{actual}\" contradicts desired role \"{desired}\"")]
    RoleMismatch { actual: String, desired: String },

    #[error("Join handshake failed: {0}")]
    Join(String),

    #[error("Peer discovery error: {0}")]
    Discovery(String),

    #[error("Credential broker error: {0}")]
    Credential(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Shutdown error: {0}")]
    Shutdown(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<std::io::Error> for WardenError {
    fn from(err: std::io::Error) -> Self {
        WardenError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for WardenError {
    fn from(err: serde_json::Error) -> Self {
        WardenError::Serialization(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for WardenError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        WardenError::Timeout(err.to_string())
    }
}

impl From<reqwest::Error> for WardenError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            WardenError::Timeout(err.to_string())
        } else {
            WardenError::EngineUnavailable(err.to_string())
        }
    }
}
