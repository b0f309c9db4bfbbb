use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

use super::recording::TICK;
use super::{finish_meeting, StateHandler};
use crate::session::context::SessionContext;
use crate::session::phase::SessionPhase;
use crate::session::within;

pub struct PausedState;

#[async_trait]
impl StateHandler for PausedState {
    async fn execute(&self, ctx: &mut SessionContext) -> Result<SessionPhase> {
        enter_pause(ctx).await;

        let mut ticker = tokio::time::interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if let Some(reason) = ctx.end_reason.reason() {
                info!("Ending while paused: {}", reason);
                leave_pause(ctx);
                finish_meeting(ctx, reason).await;
                return Ok(SessionPhase::Cleanup);
            }

            if ctx.control.take_resume_request() {
                let window = leave_pause(ctx);
                if let Some(saved) = ctx.saved_signals.take() {
                    ctx.saved_signals = Some(saved.shifted(window));
                }
                ctx.conditions.shift(window);
                return Ok(SessionPhase::Resuming);
            }
        }
    }
}

async fn enter_pause(ctx: &mut SessionContext) {
    ctx.timing.pause_started = Some(Instant::now());
    ctx.timing.paused = true;
    ctx.saved_signals = Some(ctx.participants.snapshot());

    let limit = ctx.config.timeouts.resume();
    if let Some(streaming) = ctx.handles.streaming.clone() {
        match within("pause streaming", limit, streaming.pause()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to pause streaming: {:#}", e),
            Err(timeout) => warn!("{}", timeout),
        }
    }
    if let Some(observer) = ctx.handles.speaker_observer.clone() {
        match within("stop speaker observer", limit, observer.stop()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to stop speaker observer: {:#}", e),
            Err(timeout) => warn!("{}", timeout),
        }
    }

    ctx.notifier.recording_paused();
    info!("Recording paused");
}

/// Closes the pause window and returns its length.
fn leave_pause(ctx: &mut SessionContext) -> Duration {
    let now = Instant::now();
    let window = ctx
        .timing
        .pause_started
        .map(|started| now.saturating_duration_since(started))
        .unwrap_or_default();
    let total = ctx.timing.end_pause(now);
    ctx.control.record_pause_total(total);
    info!("Paused for {:?} ({:?} in total)", window, total);
    window
}
