//! Configuration for Swarm Warden

use serde::{Deserialize, Serialize};

use crate::error::WardenError;
use crate::types::DesiredRole;

/// Configuration for the warden daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WardenConfig {
    /// Private registry host for credential refresh
    pub registry: String,

    /// Role this node converges toward
    pub desired_role: DesiredRole,

    /// Peer-group filter value used by discovery to find controller candidates
    pub peer_filter: String,

    /// Availability-zone label value re-applied after a join
    pub zone_label: String,

    /// Job intervals
    #[serde(default)]
    pub intervals: IntervalsConfig,

    /// Garbage collection flags
    #[serde(default)]
    pub prune: PruneConfig,

    /// Cluster engine API base URL
    #[serde(default = "default_engine_endpoint")]
    pub engine_endpoint: String,

    /// Status server bind address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            registry: "registry.local".to_string(),
            desired_role: DesiredRole::Worker,
            peer_filter: "swarm-controller".to_string(),
            zone_label: "zone-a".to_string(),
            intervals: IntervalsConfig::default(),
            prune: PruneConfig::default(),
            engine_endpoint: default_engine_endpoint(),
            listen_addr: default_listen_addr(),
        }
    }
}

/// Intervals, in seconds, for each scheduled job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntervalsConfig {
    pub assume_role_secs: u64,
    pub prune_nodes_secs: u64,
    pub prune_system_secs: u64,
    pub refresh_auth_secs: u64,
}

impl Default for IntervalsConfig {
    fn default() -> Self {
        Self {
            assume_role_secs: 300,
            prune_nodes_secs: 3600,
            prune_system_secs: 86_400,
            refresh_auth_secs: 21_600,
        }
    }
}

/// Flags for the optional garbage collection targets
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PruneConfig {
    pub images: bool,
    pub volumes: bool,
}

fn default_engine_endpoint() -> String {
    crate::DEFAULT_ENGINE_ENDPOINT.to_string()
}

fn default_listen_addr() -> String {
    crate::DEFAULT_LISTEN_ADDR.to_string()
}

impl WardenConfig {
    /// Load configuration from `SWARM_*` environment variables.
    pub fn from_env() -> Result<Self, WardenError> {
        let registry = require_env("SWARM_REGISTRY")?;
        let desired_role = DesiredRole::from_config(&require_env("SWARM_DESIRED_ROLE")?)?;
        let peer_filter = require_env("SWARM_PEER_FILTER")?;
        let zone_label = require_env("SWARM_ZONE_LABEL")?;

        let defaults = IntervalsConfig::default();
        let intervals = IntervalsConfig {
            assume_role_secs: env_u64("SWARM_INTERVAL_ASSUME_ROLE", defaults.assume_role_secs)?,
            prune_nodes_secs: env_u64("SWARM_INTERVAL_PRUNE_NODES", defaults.prune_nodes_secs)?,
            prune_system_secs: env_u64("SWARM_INTERVAL_PRUNE_SYSTEM", defaults.prune_system_secs)?,
            refresh_auth_secs: env_u64("SWARM_INTERVAL_REFRESH_AUTH", defaults.refresh_auth_secs)?,
        };

        let prune = PruneConfig {
            images: env_bool("SWARM_PRUNE_IMAGES"),
            volumes: env_bool("SWARM_PRUNE_VOLUMES"),
        };

        Ok(Self {
            registry,
            desired_role,
            peer_filter,
            zone_label,
            intervals,
            prune,
            engine_endpoint: std::env::var("SWARM_ENGINE_ENDPOINT")
                .unwrap_or_else(|_| default_engine_endpoint()),
            listen_addr: std::env::var("SWARM_LISTEN_ADDR")
                .unwrap_or_else(|_| default_listen_addr()),
        })
    }

    /// Parse configuration from a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, WardenError> {
        toml::from_str(content)
            .map_err(|e| WardenError::Configuration(format!("invalid config file: {e}")))
    }

    /// Interpret a configuration flag the way operators write them.
    pub fn str_to_bool(value: &str) -> bool {
        matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "true" | "yes" | "y" | "1"
        )
    }
}

fn require_env(key: &str) -> Result<String, WardenError> {
    std::env::var(key).map_err(|_| WardenError::Configuration(format!("{key} is required")))
}

fn env_u64(key: &str, default: u64) -> Result<u64, WardenError> {
    match std::env::var(key) {
        Ok(value) => value.trim().parse::<u64>().map_err(|_| {
            WardenError::Configuration(format!(
                "{key} must be an integer number of seconds, got {value:?}"
            ))
        }),
        Err(_) => Ok(default),
    }
}

fn env_bool(key: &str) -> bool {
    std::env::var(key)
        .map(|value| WardenConfig::str_to_bool(&value))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize the tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn str_to_bool_accepts_operator_spellings() {
        for value in ["true", "TRUE", "yes", "Yes", "y", "1", " true "] {
            assert!(WardenConfig::str_to_bool(value), "{value:?}");
        }
        for value in ["false", "no", "n", "0", "", "on"] {
            assert!(!WardenConfig::str_to_bool(value), "{value:?}");
        }
    }

    #[test]
    fn defaults_are_sensible() {
        let config = WardenConfig::default();
        assert_eq!(config.intervals.assume_role_secs, 300);
        assert_eq!(config.intervals.prune_nodes_secs, 3600);
        assert!(!config.prune.images);
        assert!(!config.prune.volumes);
        assert_eq!(config.listen_addr, crate::DEFAULT_LISTEN_ADDR);
    }

    #[test]
    fn from_toml_parses_a_minimal_document() {
        let config = WardenConfig::from_toml(
            r#"
            registry = "123456789012.dkr.ecr.eu-west-1.amazonaws.com"
            desired_role = "controller"
            peer_filter = "prod-swarm-manager"
            zone_label = "eu-west-1a"

            [intervals]
            assume_role_secs = 60

            [prune]
            images = true
            "#,
        )
        .unwrap();

        assert_eq!(config.desired_role, DesiredRole::Controller);
        assert_eq!(config.intervals.assume_role_secs, 60);
        // Unset intervals keep their defaults.
        assert_eq!(config.intervals.refresh_auth_secs, 21_600);
        assert!(config.prune.images);
        assert!(!config.prune.volumes);
        assert_eq!(config.engine_endpoint, crate::DEFAULT_ENGINE_ENDPOINT);
    }

    #[test]
    fn from_toml_rejects_unknown_roles() {
        let result = WardenConfig::from_toml(
            r#"
            registry = "r"
            desired_role = "manager"
            peer_filter = "f"
            zone_label = "z"
            "#,
        );
        assert!(matches!(result, Err(WardenError::Configuration(_))));
    }

    #[test]
    fn from_env_reads_the_full_key_set() {
        let _guard = ENV_LOCK.lock().unwrap();

        std::env::set_var("SWARM_REGISTRY", "registry.example.com");
        std::env::set_var("SWARM_DESIRED_ROLE", "worker");
        std::env::set_var("SWARM_PEER_FILTER", "prod-managers");
        std::env::set_var("SWARM_ZONE_LABEL", "us-east-1b");
        std::env::set_var("SWARM_INTERVAL_ASSUME_ROLE", "120");
        std::env::set_var("SWARM_PRUNE_IMAGES", "yes");
        std::env::remove_var("SWARM_PRUNE_VOLUMES");
        std::env::remove_var("SWARM_INTERVAL_PRUNE_NODES");

        let config = WardenConfig::from_env().unwrap();
        assert_eq!(config.registry, "registry.example.com");
        assert_eq!(config.desired_role, DesiredRole::Worker);
        assert_eq!(config.peer_filter, "prod-managers");
        assert_eq!(config.zone_label, "us-east-1b");
        assert_eq!(config.intervals.assume_role_secs, 120);
        assert_eq!(config.intervals.prune_nodes_secs, 3600);
        assert!(config.prune.images);
        assert!(!config.prune.volumes);

        for key in [
            "SWARM_REGISTRY",
            "SWARM_DESIRED_ROLE",
            "SWARM_PEER_FILTER",
            "SWARM_ZONE_LABEL",
            "SWARM_INTERVAL_ASSUME_ROLE",
            "SWARM_PRUNE_IMAGES",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn from_env_requires_the_registry() {
        let _guard = ENV_LOCK.lock().unwrap();

        std::env::remove_var("SWARM_REGISTRY");
        let result = WardenConfig::from_env();
        assert!(matches!(result, Err(WardenError::Configuration(_))));
    }

    #[test]
    fn from_env_rejects_non_numeric_intervals() {
        let _guard = ENV_LOCK.lock().unwrap();

        std::env::set_var("SWARM_REGISTRY", "r");
        std::env::set_var("SWARM_DESIRED_ROLE", "worker");
        std::env::set_var("SWARM_PEER_FILTER", "f");
        std::env::set_var("SWARM_ZONE_LABEL", "z");
        std::env::set_var("SWARM_INTERVAL_REFRESH_AUTH", "hourly");

        let result = WardenConfig::from_env();
        assert!(matches!(result, Err(WardenError::Configuration(_))));

        for key in [
            "SWARM_REGISTRY",
            "SWARM_DESIRED_ROLE",
            "SWARM_PEER_FILTER",
            "SWARM_ZONE_LABEL",
            "SWARM_INTERVAL_REFRESH_AUTH",
        ] {
            std::env::remove_var(key);
        }
    }
}
