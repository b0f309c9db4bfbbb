//! Control API for a running bot session.
//!
//! Provides HTTP endpoints for:
//! - Service info
//! - Session status
//! - Stop, pause and resume requests

pub mod error;
pub mod routes;

use crate::config::ApiConfig;
use crate::session::SessionControl;
use anyhow::{Context, Result};
use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tracing::info;

pub struct ApiServer {
    bind: String,
    port: u16,
    control: SessionControl,
}

impl ApiServer {
    pub fn new(config: &ApiConfig, control: SessionControl) -> Self {
        Self {
            bind: config.bind.clone(),
            port: config.port,
            control,
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(service_info))
            .merge(routes::session::router(self.control.clone()))
            .layer(ServiceBuilder::new())
    }

    pub async fn start(self) -> Result<()> {
        let app = self.router();
        let addr = format!("{}:{}", self.bind, self.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind control API on {}", addr))?;

        info!("API server listening on http://{}", addr);
        info!("Endpoints:");
        info!("  GET  /        - Service info");
        info!("  GET  /status  - Session status");
        info!("  POST /stop    - End the session");
        info!("  POST /pause   - Pause recording");
        info!("  POST /resume  - Resume recording");

        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn service_info() -> Json<Value> {
    Json(json!({
        "service": "meetbot",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{EndReason, EndReasonRegistry, SessionPhase};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn server() -> (ApiServer, SessionControl, EndReasonRegistry) {
        let registry = EndReasonRegistry::new();
        let control = SessionControl::new(registry.clone());
        let server = ApiServer::new(&ApiConfig::default(), control.clone());
        (server, control, registry)
    }

    async fn call(app: Router, method: &str, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_service_info() {
        let (server, _, _) = server();
        let (status, body) = call(server.router(), "GET", "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "meetbot");
    }

    #[tokio::test]
    async fn test_status_reports_phase() {
        let (server, control, _) = server();
        control.set_phase(SessionPhase::Recording);

        let (status, body) = call(server.router(), "GET", "/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["phase"], "recording");
        assert_eq!(body["paused"], false);
        assert!(body["end_reason"].is_null());
    }

    #[tokio::test]
    async fn test_stop_records_api_request() {
        let (server, _, registry) = server();
        let (status, body) = call(server.router(), "POST", "/stop").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(registry.reason(), Some(EndReason::ApiRequest));
    }

    #[tokio::test]
    async fn test_pause_outside_recording_conflicts() {
        let (server, control, _) = server();
        control.set_phase(SessionPhase::WaitingRoom);

        let (status, body) = call(server.router(), "POST", "/pause").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], true);
    }

    #[tokio::test]
    async fn test_pause_then_resume() {
        let (server, control, _) = server();
        control.set_phase(SessionPhase::Recording);

        let (status, _) = call(server.router(), "POST", "/pause").await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(server.router(), "POST", "/resume").await;
        assert_eq!(status, StatusCode::CONFLICT);

        control.set_phase(SessionPhase::Paused);
        let (status, _) = call(server.router(), "POST", "/resume").await;
        assert_eq!(status, StatusCode::OK);
    }
}
