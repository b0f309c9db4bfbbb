use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::StateHandler;
use crate::notifier::EventCode;
use crate::services::snapshot;
use crate::session::context::SessionContext;
use crate::session::end_reason::EndReason;
use crate::session::phase::SessionPhase;

pub struct ErrorState;

/// The single terminal event announced for each failure reason. Unmapped
/// reasons are reported as a generic meeting error.
pub(crate) fn error_event(reason: EndReason) -> Option<EventCode> {
    match reason {
        EndReason::BotNotAccepted => Some(EventCode::BotRejected),
        EndReason::BotRemoved => Some(EventCode::BotRemoved),
        EndReason::BotRemovedTooEarly => Some(EventCode::BotRemovedTooEarly),
        EndReason::TimeoutWaitingToStart => Some(EventCode::WaitingRoomTimeout),
        EndReason::InvalidMeetingUrl => Some(EventCode::InvalidMeetingUrl),
        EndReason::ApiRequest => Some(EventCode::ApiRequestStop),
        _ => None,
    }
}

#[async_trait]
impl StateHandler for ErrorState {
    async fn execute(&self, ctx: &mut SessionContext) -> Result<SessionPhase> {
        let reason = ctx.end_reason.reason().unwrap_or(EndReason::Internal);
        let message = ctx
            .end_reason
            .error_message()
            .unwrap_or_else(|| reason.default_message().to_string());

        if let (Ok(page), Ok(paths)) = (ctx.page(), ctx.paths()) {
            snapshot::spawn_capture(page, paths.snapshots(), "error_state");
        }

        if reason.is_expected() {
            warn!(reason = %reason, "Session ended early: {}", message);
        } else {
            error!(reason = %reason, "Session failed: {}", message);
        }
        if let Some(detail) = &ctx.error {
            error!("Fault detail: {}", detail);
        }

        match error_event(reason) {
            Some(code) => {
                ctx.notifier.send_once(code, json!({}));
            }
            None => ctx.notifier.meeting_error(&message),
        }
        if !ctx.notifier.flush(ctx.config.timeouts.error_notification()).await {
            warn!("Error notification not confirmed in time");
        }

        let in_call_for = ctx
            .timing
            .started_at
            .map(|started| Instant::now().saturating_duration_since(started));
        info!(
            reason = %reason,
            recorded_secs = in_call_for.map(|d| d.as_secs()).unwrap_or(0),
            paused_secs = ctx.timing.total_pause.as_secs(),
            "Session outcome"
        );

        Ok(SessionPhase::Cleanup)
    }
}
