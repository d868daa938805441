//! HTTP endpoints for Swarm Warden
//!
//! Read-only projections plus the peer-join handshake. Handlers never mutate
//! core state; every response is computed from a fresh query.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::error::WardenError;
use crate::health::{self, HealthState};
use crate::scheduler::{WardenScheduler, EXPECTED_JOBS};
use crate::warden::SwarmWarden;
use crate::WardenResult;

/// Status server exposing health, system state, and the join handshake.
#[derive(Clone)]
pub struct StatusServer {
    warden: Arc<SwarmWarden>,
    scheduler: Arc<WardenScheduler>,
}

impl StatusServer {
    /// Create a new status server.
    pub fn new(warden: Arc<SwarmWarden>, scheduler: Arc<WardenScheduler>) -> Self {
        Self { warden, scheduler }
    }

    /// Create the router with all endpoints.
    pub fn create_router(&self) -> Router {
        Router::new()
            .route("/health", get(Self::health))
            .route("/system", get(Self::system))
            .route("/join", get(Self::join))
            .with_state(Arc::new(self.clone()))
    }

    /// Serve until the shutdown signal fires.
    pub async fn serve(self, addr: SocketAddr, mut shutdown: watch::Receiver<bool>) -> WardenResult<()> {
        let app = self.create_router();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| WardenError::Internal(format!("failed to bind {addr}: {e}")))?;

        info!("Status server listening on {}", addr);
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await
            .map_err(|e| WardenError::Internal(format!("status server error: {e}")))
    }

    /// Health endpoint: UP while the full job set is scheduled.
    async fn health(State(server): State<Arc<Self>>) -> impl IntoResponse {
        let jobs = server.scheduler.list_jobs().await;
        let info = health::evaluate(jobs, EXPECTED_JOBS);

        let status_code = match info.status {
            HealthState::Up => StatusCode::OK,
            HealthState::Warn => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status_code, Json(json!(info)))
    }

    /// System endpoint: membership, role, nodes, and discovered peers.
    async fn system(State(server): State<Arc<Self>>) -> impl IntoResponse {
        match server.warden.system_info().await {
            Ok(info) => (StatusCode::OK, Json(json!(info))),
            Err(e) => {
                error!("Failed to collect system info: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": e.to_string() })),
                )
            }
        }
    }

    /// Join handshake endpoint: membership tokens for a joining peer.
    ///
    /// Anything but an active controller answers 400 without tokens.
    async fn join(State(server): State<Arc<Self>>) -> impl IntoResponse {
        match server.warden.join_info().await {
            Ok(handshake) => (StatusCode::OK, Json(json!(handshake))),
            Err(e) => {
                warn!("Refusing join request: {}", e);
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": e.to_string() })),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WardenConfig;
    use crate::scheduler::JobPolicy;
    use crate::types::{JoinHandshake, JoinTokens};
    use crate::warden::fakes::{
        active_controller_membership, active_worker_membership, FakeBroker, FakeDiscovery,
        FakeEngine,
    };

    fn warden_for(engine: Arc<FakeEngine>) -> Arc<SwarmWarden> {
        Arc::new(
            SwarmWarden::new(
                WardenConfig::default(),
                engine,
                Arc::new(FakeDiscovery::with_candidates(vec!["10.0.0.5".to_string()])),
                Arc::new(FakeBroker::empty()),
            )
            .unwrap(),
        )
    }

    fn scheduler_with_jobs(count: usize) -> Arc<WardenScheduler> {
        let mut scheduler = WardenScheduler::default();
        for i in 0..count {
            scheduler.add_job(&format!("job-{i}"), 60, JobPolicy::default(), || async {
                Ok(())
            });
        }
        Arc::new(scheduler)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn state_for(
        engine: Arc<FakeEngine>,
        scheduler: Arc<WardenScheduler>,
    ) -> State<Arc<StatusServer>> {
        State(Arc::new(StatusServer::new(warden_for(engine), scheduler)))
    }

    #[tokio::test]
    async fn health_is_up_with_the_full_job_set() {
        let engine = Arc::new(FakeEngine::new(active_worker_membership("self")));
        let response = StatusServer::health(state_for(engine, scheduler_with_jobs(EXPECTED_JOBS)))
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "UP");
        assert_eq!(body["jobs"].as_array().unwrap().len(), EXPECTED_JOBS);
    }

    #[tokio::test]
    async fn health_warns_on_a_job_count_mismatch() {
        let engine = Arc::new(FakeEngine::new(active_worker_membership("self")));
        let response = StatusServer::health(state_for(engine, scheduler_with_jobs(1)))
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["status"], "WARN");
    }

    #[tokio::test]
    async fn join_serves_the_handshake_on_controllers() {
        let engine = Arc::new(FakeEngine::new(active_controller_membership("self")));
        *engine.tokens.lock().unwrap() = Some(JoinTokens {
            controller: "SWMTKN-c".to_string(),
            worker: "SWMTKN-w".to_string(),
        });
        let response = StatusServer::join(state_for(engine, scheduler_with_jobs(EXPECTED_JOBS)))
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let handshake: JoinHandshake = serde_json::from_value(body).unwrap();
        assert_eq!(handshake.address, "10.0.0.1");
        assert_eq!(handshake.controller_token, "SWMTKN-c");
        assert_eq!(handshake.worker_token, "SWMTKN-w");
    }

    #[tokio::test]
    async fn join_refuses_workers_without_leaking_tokens() {
        let engine = Arc::new(FakeEngine::new(active_worker_membership("self")));
        *engine.tokens.lock().unwrap() = Some(JoinTokens {
            controller: "SWMTKN-c".to_string(),
            worker: "SWMTKN-w".to_string(),
        });
        let response = StatusServer::join(state_for(engine, scheduler_with_jobs(EXPECTED_JOBS)))
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        let rendered = body.to_string();
        assert!(!rendered.contains("SWMTKN"));
        assert!(body.get("error").is_some());
    }

    #[tokio::test]
    async fn system_projects_membership_and_peers() {
        let engine = Arc::new(FakeEngine::new(active_controller_membership("self")));
        let response = StatusServer::system(state_for(engine, scheduler_with_jobs(EXPECTED_JOBS)))
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["role"], "controller");
        assert_eq!(body["discovered_peers"][0], "10.0.0.5");
        assert_eq!(body["membership"]["local_node_state"], "active");
    }
}
