use anyhow::Result;
use async_trait::async_trait;
use tracing::{error, info};

use super::StateHandler;
use crate::session::context::SessionContext;
use crate::session::phase::SessionPhase;
use crate::session::within;

pub struct ResumingState;

#[async_trait]
impl StateHandler for ResumingState {
    async fn execute(&self, ctx: &mut SessionContext) -> Result<SessionPhase> {
        let limit = ctx.config.timeouts.resume();
        match within("resume", limit, resume(ctx)).await {
            Ok(Ok(())) => {
                info!("Recording resumed");
                Ok(SessionPhase::Recording)
            }
            Ok(Err(e)) => {
                error!("Resume failed: {:#}", e);
                ctx.record_fault(format!("Resume failed: {:#}", e));
                Ok(SessionPhase::Error)
            }
            Err(timeout) => {
                error!("{}", timeout);
                ctx.record_fault(timeout.to_string());
                Ok(SessionPhase::Error)
            }
        }
    }
}

async fn resume(ctx: &mut SessionContext) -> Result<()> {
    if let Some(saved) = ctx.saved_signals.take() {
        ctx.participants.restore(saved);
    }

    if let Some(streaming) = ctx.handles.streaming.clone() {
        streaming.resume().await?;
    }

    if let Some(observer) = ctx.handles.speaker_observer.clone() {
        observer.start(ctx.page()?, ctx.speakers_callback()).await?;
    }

    ctx.notifier.recording_resumed();
    Ok(())
}
