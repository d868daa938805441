//! Cluster engine access for Swarm Warden

pub mod docker;
pub mod engine;

pub use docker::DockerSwarmEngine;
pub use engine::SwarmEngine;
