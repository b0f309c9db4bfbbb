use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::StateHandler;
use crate::provider::{JoinIdentity, MeetingReference, ProviderError};
use crate::services::RecorderEvent;
use crate::session::context::SessionContext;
use crate::session::end_reason::{EndReason, EndReasonRegistry};
use crate::session::phase::SessionPhase;
use crate::session::within;

const STOP_POLL: Duration = Duration::from_secs(1);

pub struct WaitingRoomState;

enum AdmissionFailure {
    Provider(ProviderError),
    TimedOut,
    Stopped,
}

#[async_trait]
impl StateHandler for WaitingRoomState {
    async fn execute(&self, ctx: &mut SessionContext) -> Result<SessionPhase> {
        let reference = match ctx.provider.parse_reference(&ctx.config.bot.meeting_url) {
            Ok(reference) => reference,
            Err(e) => {
                error!("Invalid meeting reference: {}", e);
                ctx.end_reason
                    .set_error(EndReason::InvalidMeetingUrl, Some(e.to_string()));
                return Ok(SessionPhase::Error);
            }
        };

        if let Err(e) = prepare(ctx, &reference).await {
            error!("Failed to prepare the meeting page: {:#}", e);
            ctx.record_fault(format!("{:#}", e));
            return Ok(SessionPhase::Error);
        }

        ctx.notifier.in_waiting_room();

        match wait_for_admission(ctx).await {
            Ok(()) => Ok(SessionPhase::InCall),
            Err(failure) => {
                classify(ctx, failure);
                Ok(SessionPhase::Error)
            }
        }
    }
}

/// Opens the meeting page and starts capture before the bot is admitted.
async fn prepare(ctx: &mut SessionContext, reference: &MeetingReference) -> Result<()> {
    let identity = JoinIdentity {
        display_name: ctx.config.bot.bot_name.clone(),
        enter_message: ctx.config.bot.enter_message.clone(),
    };
    let link = ctx.provider.build_join_link(reference, &identity);
    info!("Joining {} meeting via {}", ctx.provider.kind().as_str(), link);

    let browser = ctx
        .handles
        .browser
        .clone()
        .ok_or_else(|| anyhow!("No browser session"))?;

    let dialogs = ctx.services.dialog_observer();
    dialogs.start(browser.clone());
    ctx.handles.dialog_observer = Some(dialogs);

    let media_input = ctx.config.bot.streaming_input.clone();
    let page = within(
        "open meeting page",
        ctx.config.timeouts.setup(),
        ctx.provider
            .open_session_page(browser, &link, media_input.as_deref()),
    )
    .await??;
    ctx.handles.page = Some(page.clone());

    ctx.handles.streaming = Some(ctx.services.streaming(page)?);

    let output = ctx.paths()?.recording_file();
    let recorder = ctx.services.recorder();
    let events = recorder.subscribe();
    ctx.handles.recorder = Some(recorder.clone());
    recorder.start(&output).await?;
    ctx.handles.recorder_watch = Some(tokio::spawn(watch_recorder(
        events,
        ctx.end_reason.clone(),
    )));

    info!("Recorder started: {:?}", output);
    Ok(())
}

async fn watch_recorder(mut events: broadcast::Receiver<RecorderEvent>, registry: EndReasonRegistry) {
    loop {
        match events.recv().await {
            Ok(RecorderEvent::Error(message)) => {
                error!("Recorder failed: {}", message);
                registry.set_error(EndReason::StreamingSetupFailed, Some(message));
            }
            Ok(RecorderEvent::AudioWarning(message)) => {
                warn!("Recorder audio warning: {}", message);
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!("Recorder watcher skipped {} events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn wait_for_admission(ctx: &SessionContext) -> Result<(), AdmissionFailure> {
    let page = ctx
        .page()
        .map_err(|e| AdmissionFailure::Provider(ProviderError::Page(e)))?;
    let provider = ctx.provider.clone();
    let admitted = Arc::new(AtomicBool::new(false));

    let registry = ctx.end_reason.clone();
    let cancel = move || registry.stop_requested();
    let flag = admitted.clone();
    let on_admitted = move || {
        flag.store(true, Ordering::SeqCst);
    };

    let join = provider.join(page, &cancel, &on_admitted);
    tokio::pin!(join);

    let limit = ctx.config.automatic_leave.waiting_room();
    let timer = tokio::time::sleep(limit);
    tokio::pin!(timer);
    let mut timer_armed = true;

    let mut stop_poll = tokio::time::interval(STOP_POLL);

    loop {
        tokio::select! {
            result = &mut join => {
                return match result {
                    Ok(()) => {
                        info!("Admitted into the meeting");
                        Ok(())
                    }
                    Err(ProviderError::Cancelled) => Err(AdmissionFailure::Stopped),
                    Err(e) => Err(AdmissionFailure::Provider(e)),
                };
            }
            _ = &mut timer, if timer_armed => {
                timer_armed = false;
                if admitted.load(Ordering::SeqCst) {
                    debug!("Waiting room timer fired after admission, ignoring");
                    continue;
                }
                warn!("Not admitted after {:?}", limit);
                return Err(AdmissionFailure::TimedOut);
            }
            _ = stop_poll.tick() => {
                if ctx.end_reason.stop_requested() {
                    info!("Stop requested while waiting to be admitted");
                    return Err(AdmissionFailure::Stopped);
                }
            }
        }
    }
}

fn classify(ctx: &mut SessionContext, failure: AdmissionFailure) {
    let registry = &ctx.end_reason;
    match failure {
        AdmissionFailure::TimedOut => {
            registry.set_error(EndReason::TimeoutWaitingToStart, None);
        }
        AdmissionFailure::Stopped => {
            // The reason that triggered the stop is already recorded.
        }
        AdmissionFailure::Provider(error) => {
            let reason = match &error {
                ProviderError::Rejected => EndReason::BotNotAccepted,
                ProviderError::RemovedTooEarly => EndReason::BotRemovedTooEarly,
                ProviderError::LoginRequired => EndReason::LoginRequired,
                ProviderError::InvalidReference(_) => EndReason::InvalidMeetingUrl,
                ProviderError::Cancelled | ProviderError::Page(_) => EndReason::Internal,
            };
            warn!("Join failed: {} ({})", error, reason);
            let message = match reason {
                EndReason::Internal => Some(format!("{:#}", error)),
                _ => None,
            };
            registry.set_error(reason, message);
            if reason == EndReason::Internal {
                ctx.error = Some(error.to_string());
            }
        }
    }
}
