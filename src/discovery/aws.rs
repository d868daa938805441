//! AWS-backed discovery and credential brokering

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_ec2::types::Filter;
use tracing::info;

use crate::discovery::{CredentialBroker, PeerDiscovery};
use crate::error::WardenError;
use crate::WardenResult;

/// Discovers controller candidates by listing running EC2 instances whose
/// `Name` tag matches the configured peer filter.
pub struct Ec2PeerDiscovery {
    client: aws_sdk_ec2::Client,
    peer_filter: String,
}

impl Ec2PeerDiscovery {
    /// Create a discovery client using the ambient AWS credential chain.
    pub async fn new(peer_filter: &str) -> Self {
        let aws_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        Self {
            client: aws_sdk_ec2::Client::new(&aws_config),
            peer_filter: peer_filter.to_string(),
        }
    }
}

#[async_trait]
impl PeerDiscovery for Ec2PeerDiscovery {
    async fn controller_candidates(&self) -> WardenResult<Vec<String>> {
        let response = self
            .client
            .describe_instances()
            .filters(
                Filter::builder()
                    .name("tag:Name")
                    .values(self.peer_filter.as_str())
                    .build(),
            )
            .filters(
                Filter::builder()
                    .name("instance-state-name")
                    .values("running")
                    .build(),
            )
            .send()
            .await
            .map_err(|e| WardenError::Discovery(format!("describe-instances failed: {e}")))?;

        let mut candidates = Vec::new();
        for reservation in response.reservations() {
            for instance in reservation.instances() {
                if let Some(address) = instance.private_ip_address() {
                    candidates.push(address.to_string());
                }
            }
        }

        info!(
            "Discovered {} controller candidate(s) for filter {:?}",
            candidates.len(),
            self.peer_filter
        );
        Ok(candidates)
    }
}

/// Requests registry authorization tokens from ECR.
pub struct EcrCredentialBroker {
    client: aws_sdk_ecr::Client,
}

impl EcrCredentialBroker {
    /// Create a broker using the ambient AWS credential chain.
    pub async fn new() -> Self {
        let aws_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        Self {
            client: aws_sdk_ecr::Client::new(&aws_config),
        }
    }
}

#[async_trait]
impl CredentialBroker for EcrCredentialBroker {
    async fn request_auth_token(&self) -> WardenResult<String> {
        let response = self
            .client
            .get_authorization_token()
            .send()
            .await
            .map_err(|e| {
                WardenError::Credential(format!("get-authorization-token failed: {e}"))
            })?;

        let data = response.authorization_data().first().ok_or_else(|| {
            WardenError::Credential("authorization response contained no token data".to_string())
        })?;

        data.authorization_token()
            .map(str::to_string)
            .ok_or_else(|| {
                WardenError::Credential("authorization data contained no token".to_string())
            })
    }
}
