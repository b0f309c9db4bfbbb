use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{finish_meeting, StateHandler};
use crate::session::conditions::Verdict;
use crate::session::context::SessionContext;
use crate::session::end_reason::EndReason;
use crate::session::phase::SessionPhase;
use crate::session::within;

pub(crate) const TICK: Duration = Duration::from_millis(250);

pub struct RecordingState;

enum Exit {
    Pause,
    End(EndReason),
}

#[async_trait]
impl StateHandler for RecordingState {
    async fn execute(&self, ctx: &mut SessionContext) -> Result<SessionPhase> {
        match monitor(ctx).await {
            Exit::Pause => Ok(SessionPhase::Paused),
            Exit::End(reason) => {
                finish_meeting(ctx, reason).await;
                Ok(SessionPhase::Cleanup)
            }
        }
    }
}

async fn monitor(ctx: &mut SessionContext) -> Exit {
    let started_at = *ctx.timing.started_at.get_or_insert_with(Instant::now);
    let ceiling = ctx.config.automatic_leave.recording();

    let mut ticker = tokio::time::interval(TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Monitoring meeting (ceiling {:?})", ceiling);

    loop {
        ticker.tick().await;

        if let Some(reason) = ctx.end_reason.reason() {
            info!("End reason already recorded: {}", reason);
            return Exit::End(reason);
        }

        if removed_from_meeting(ctx).await {
            let reason = ctx.end_reason.reason().unwrap_or(EndReason::BotRemoved);
            info!("Bot is no longer in the meeting ({})", reason);
            return Exit::End(reason);
        }

        let now = Instant::now();
        let sound_level = ctx.handles.streaming.as_ref().map(|s| s.sound_level());
        let signals = ctx.participants.snapshot();
        match ctx.conditions.evaluate(now, started_at, sound_level, &signals) {
            Verdict::Continue => {}
            Verdict::SoundActive => ctx.participants.clear_silence(),
            Verdict::End(reason) => return Exit::End(reason),
        }

        if now.saturating_duration_since(started_at) >= ceiling {
            info!("Recording reached its {:?} ceiling", ceiling);
            return Exit::End(EndReason::RecordingTimeout);
        }

        if ctx.control.take_pause_request() {
            info!("Pausing recording");
            return Exit::Pause;
        }
    }
}

/// A lost page or a hung check both count as removal.
async fn removed_from_meeting(ctx: &SessionContext) -> bool {
    let page = match ctx.page() {
        Ok(page) => page,
        Err(_) => return true,
    };

    let limit = ctx.config.timeouts.removal_check();
    match within("removal check", limit, ctx.provider.detect_session_ended(page)).await {
        Ok(Ok(ended)) => ended,
        Ok(Err(e)) => {
            debug!("Removal check failed, assuming still in call: {:#}", e);
            false
        }
        Err(timeout) => {
            warn!("{}, treating as removed", timeout);
            true
        }
    }
}
