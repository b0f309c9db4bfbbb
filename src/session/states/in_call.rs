use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::StateHandler;
use crate::provider::ProviderKind;
use crate::session::context::SessionContext;
use crate::session::phase::SessionPhase;
use crate::session::within;

const OBSERVER_ATTEMPTS: u32 = 3;
const OBSERVER_RETRY_DELAY: Duration = Duration::from_secs(5);

pub struct InCallState;

#[async_trait]
impl StateHandler for InCallState {
    async fn execute(&self, ctx: &mut SessionContext) -> Result<SessionPhase> {
        let limit = ctx.config.timeouts.setup();
        match within("in-call setup", limit, setup(ctx)).await {
            Ok(Ok(())) => Ok(SessionPhase::Recording),
            Ok(Err(e)) => {
                error!("In-call setup failed: {:#}", e);
                ctx.record_fault(format!("{:#}", e));
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

async fn setup(ctx: &mut SessionContext) -> Result<()> {
    ctx.notifier.in_call_not_recording();
    let page = ctx.page()?;

    let cleaner = ctx.services.dom_cleaner(page.clone());
    match cleaner.start().await {
        Ok(()) => ctx.handles.dom_cleaner = Some(cleaner),
        Err(e) => warn!("DOM cleanup unavailable: {:#}", e),
    }

    start_speaker_observer(ctx).await;

    if ctx.provider.kind() == ProviderKind::Meet {
        let fixer = ctx.services.video_fixer(page);
        match fixer.start().await {
            Ok(()) => ctx.handles.video_fixer = Some(fixer),
            Err(e) => warn!("Video layout fixer unavailable: {:#}", e),
        }
    }

    let started_wall = Utc::now();
    ctx.timing.started_at = Some(Instant::now());
    ctx.timing.started_wall = Some(started_wall);
    ctx.notifier.in_call_recording(started_wall);
    info!("Recording started at {}", started_wall.to_rfc3339());
    Ok(())
}

/// The session can run without speaker data, so exhausting the attempts only
/// degrades end-condition detection.
async fn start_speaker_observer(ctx: &mut SessionContext) {
    let page = match ctx.page() {
        Ok(page) => page,
        Err(_) => return,
    };
    let observer = ctx.services.speaker_observer();

    for attempt in 1..=OBSERVER_ATTEMPTS {
        match observer.start(page.clone(), ctx.speakers_callback()).await {
            Ok(()) => {
                info!("Speaker observer started");
                ctx.handles.speaker_observer = Some(observer);
                return;
            }
            Err(e) => {
                warn!(
                    "Speaker observer attempt {}/{} failed: {:#}",
                    attempt, OBSERVER_ATTEMPTS, e
                );
                if attempt < OBSERVER_ATTEMPTS {
                    tokio::time::sleep(OBSERVER_RETRY_DELAY).await;
                }
            }
        }
    }

    warn!("Continuing without speaker observer; silence detection is degraded");
}
