//! One handler per lifecycle phase.
//!
//! Each handler owns its phase's work against the shared context and returns
//! the next phase. Expected failures are classified inside the handler; an
//! `Err` or panic escaping `execute` is an unexpected fault handled by the
//! machine.

mod cleanup;
mod error;
mod in_call;
mod initialization;
mod paused;
mod recording;
mod resuming;
mod terminated;
mod waiting_room;

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

use super::context::SessionContext;
use super::end_reason::EndReason;
use super::phase::SessionPhase;

pub use cleanup::CleanupState;
pub use error::ErrorState;
pub use in_call::InCallState;
pub use initialization::InitializationState;
pub use paused::PausedState;
pub use recording::RecordingState;
pub use resuming::ResumingState;
pub use terminated::TerminatedState;
pub use waiting_room::WaitingRoomState;

const LEAVE_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait StateHandler: Send + Sync {
    async fn execute(&self, ctx: &mut SessionContext) -> Result<SessionPhase>;
}

pub fn handler_for(phase: SessionPhase) -> Box<dyn StateHandler> {
    match phase {
        SessionPhase::Initialization => Box::new(InitializationState),
        SessionPhase::WaitingRoom => Box::new(WaitingRoomState),
        SessionPhase::InCall => Box::new(InCallState),
        SessionPhase::Recording => Box::new(RecordingState),
        SessionPhase::Paused => Box::new(PausedState),
        SessionPhase::Resuming => Box::new(ResumingState),
        SessionPhase::Error => Box::new(ErrorState),
        SessionPhase::Cleanup => Box::new(CleanupState),
        SessionPhase::Terminated => Box::new(TerminatedState),
    }
}

/// Leaves the meeting after an end condition. Recording and Paused both end
/// this way before Cleanup.
pub(crate) async fn finish_meeting(ctx: &mut SessionContext, reason: EndReason) {
    if reason.is_normal() {
        ctx.end_reason.set_end_reason(reason);
    } else {
        ctx.end_reason.set_error(reason, None);
    }
    info!("Meeting ending: {}", reason);

    if reason != EndReason::BotRemoved {
        if let Some(page) = ctx.handles.page.clone() {
            match super::within("provider close", LEAVE_TIMEOUT, ctx.provider.close(page)).await {
                Ok(Ok(())) => info!("Left the meeting"),
                Ok(Err(e)) => warn!("Failed to leave the meeting cleanly: {}", e),
                Err(_) => {}
            }
        }
    }

    ctx.notifier.call_ended();
}
