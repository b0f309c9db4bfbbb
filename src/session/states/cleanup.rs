use anyhow::Result;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::StateHandler;
use crate::services::snapshot;
use crate::session::context::SessionContext;
use crate::session::phase::SessionPhase;
use crate::session::within;

pub struct CleanupState;

#[async_trait]
impl StateHandler for CleanupState {
    async fn execute(&self, ctx: &mut SessionContext) -> Result<SessionPhase> {
        let limit = ctx.config.timeouts.cleanup();
        match within("cleanup", limit, teardown(ctx)).await {
            Ok(()) => info!("Cleanup complete"),
            Err(timeout) => warn!("{}, terminating anyway", timeout),
        }

        if let Some(dialogs) = ctx.handles.dialog_observer.take() {
            dialogs.stop();
        }
        if let Some(watch) = ctx.handles.recorder_watch.take() {
            watch.abort();
        }

        Ok(SessionPhase::Terminated)
    }
}

async fn teardown(ctx: &mut SessionContext) {
    if let Some(dialogs) = ctx.handles.dialog_observer.take() {
        dialogs.stop();
        debug!("Dialog observer stopped");
    }

    // Nothing else may run until the recording is finalized.
    if let Some(recorder) = ctx.handles.recorder.take() {
        match recorder.stop().await {
            Ok(()) => info!("Recorder stopped"),
            Err(e) => error!("Recorder stop failed, continuing teardown: {:#}", e),
        }
    }

    if let (Ok(page), Ok(paths)) = (ctx.page(), ctx.paths()) {
        snapshot::spawn_capture(page, paths.snapshots(), "cleanup_final_dom_state");
    }

    let step = ctx.config.timeouts.cleanup_step();
    let streaming = ctx.handles.streaming.take();
    let speakers = ctx.handles.speaker_observer.take();
    let cleaner = ctx.handles.dom_cleaner.take();
    let fixer = ctx.handles.video_fixer.take();

    tokio::join!(
        stop_step("streaming", step, async move {
            match streaming {
                Some(streaming) => streaming.stop().await,
                None => Ok(()),
            }
        }),
        stop_step("speaker observer", step, async move {
            match speakers {
                Some(observer) => observer.stop().await,
                None => Ok(()),
            }
        }),
        stop_step("DOM cleaner", step, async move {
            match cleaner {
                Some(cleaner) => cleaner.stop().await,
                None => Ok(()),
            }
        }),
        stop_step("video fixer", step, async move {
            match fixer {
                Some(fixer) => fixer.stop().await,
                None => Ok(()),
            }
        }),
    );

    if let Some(mut branding) = ctx.handles.branding.take() {
        stop_step("branding", step, async move { branding.kill().await }).await;
    }

    let page = ctx.handles.page.take();
    let browser = ctx.handles.browser.take();
    if let Some(browser) = browser.clone() {
        stop_step("media output", step, async move { browser.stop_media().await }).await;
    }
    if let Some(page) = page {
        stop_step("page", step, async move { page.close().await }).await;
    }
    if let Some(browser) = browser {
        stop_step("browser", step, async move { browser.close().await }).await;
    }

    if let Some(watch) = ctx.handles.recorder_watch.take() {
        watch.abort();
    }
}

/// Runs one teardown step under its own deadline. Failures are only logged.
async fn stop_step<F>(name: &'static str, limit: Duration, step: F)
where
    F: Future<Output = Result<()>>,
{
    match within(name, limit, step).await {
        Ok(Ok(())) => debug!("Stopped {}", name),
        Ok(Err(e)) => warn!("Failed to stop {}: {:#}", name, e),
        Err(timeout) => warn!("{}, abandoning it", timeout),
    }
}
