//! Session control endpoints.
//!
//! - `GET /status` reports phase, end reason and pause state
//! - `POST /stop` ends the session with reason `api_request`
//! - `POST /pause` and `POST /resume` toggle recording (409 when the phase
//!   does not allow it)

use axum::{extract::State, response::Json, routing::get, routing::post, Router};
use serde_json::{json, Value};
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::session::{ControlError, SessionControl, SessionStatus};

pub fn router(control: SessionControl) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/stop", post(stop))
        .route("/pause", post(pause))
        .route("/resume", post(resume))
        .with_state(control)
}

async fn status(State(control): State<SessionControl>) -> Json<SessionStatus> {
    Json(control.status())
}

async fn stop(State(control): State<SessionControl>) -> Json<Value> {
    info!("Stop requested via API");
    let accepted = control.request_stop();
    let status = control.status();
    Json(json!({
        "success": accepted,
        "phase": status.phase,
        "end_reason": status.end_reason,
    }))
}

async fn pause(State(control): State<SessionControl>) -> ApiResult<Json<Value>> {
    control.request_pause()?;
    Ok(Json(json!({ "success": true, "message": "Pause requested" })))
}

async fn resume(State(control): State<SessionControl>) -> ApiResult<Json<Value>> {
    control.request_resume()?;
    Ok(Json(json!({ "success": true, "message": "Resume requested" })))
}

impl From<ControlError> for ApiError {
    fn from(err: ControlError) -> Self {
        Self::conflict(err.to_string())
    }
}
