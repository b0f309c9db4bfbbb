use crate::api::ApiServer;
use crate::config::Config;
use crate::notifier::{EventSink, LogSink, Notifier, WebhookSink};
use crate::provider::{self, MeetingProvider};
use crate::services::{DefaultServices, SessionServices};
use crate::session::{EndReason, SessionContext, SessionMachine, SessionPhase};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const FINAL_FLUSH: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub successful: bool,
    pub end_reason: Option<EndReason>,
    pub error: Option<String>,
    pub transitions: Vec<(SessionPhase, SessionPhase)>,
}

/// Runs one bot session with the production collaborators. Returns whether
/// the recording ended normally.
pub async fn run_bot(config: Config) -> Result<bool> {
    info!("Starting meetbot for bot {}", config.bot.bot_id);

    let config = Arc::new(config);
    let provider = provider::for_config(&config)?;
    let services: Arc<dyn SessionServices> = Arc::new(DefaultServices::new(&config));
    let sink = build_sink(&config);

    let outcome = run_session(config, provider, services, sink).await;
    Ok(outcome.successful)
}

fn build_sink(config: &Config) -> Arc<dyn EventSink> {
    match config.webhook.url.as_deref() {
        Some(url) => {
            info!("Sending lifecycle events to {}", url);
            Arc::new(WebhookSink::new(
                url,
                config.webhook.api_key.clone(),
                config.bot.bot_id.clone(),
            ))
        }
        None => {
            info!("No webhook configured, lifecycle events are only logged");
            Arc::new(LogSink)
        }
    }
}

pub async fn run_session(
    config: Arc<Config>,
    provider: Arc<dyn MeetingProvider>,
    services: Arc<dyn SessionServices>,
    sink: Arc<dyn EventSink>,
) -> SessionOutcome {
    let notifier = Notifier::spawn(sink);
    let context = SessionContext::new(config.clone(), provider, services, notifier.clone());
    let mut machine = SessionMachine::new(context);

    let api = if config.api.enabled {
        let server = ApiServer::new(&config.api, machine.control());
        Some(tokio::spawn(async move {
            if let Err(e) = server.start().await {
                error!("API server failed: {:#}", e);
            }
        }))
    } else {
        None
    };

    notifier.joining_call();
    machine.run().await;

    report(&machine, &notifier, &config.bot.bot_id);
    if !notifier.flush(FINAL_FLUSH).await {
        warn!("Some lifecycle events may not have been delivered");
    }
    if let Some(api) = api {
        api.abort();
    }

    SessionOutcome {
        successful: machine.was_recording_successful(),
        end_reason: machine.end_reason(),
        error: machine.error(),
        transitions: machine.transitions().to_vec(),
    }
}

fn report(machine: &SessionMachine, notifier: &Notifier, bot_id: &str) {
    if machine.was_recording_successful() {
        info!(
            end_reason = ?machine.end_reason(),
            paused_secs = machine.pause_duration().as_secs(),
            "Recording succeeded"
        );
        notifier.recording_succeeded();
        return;
    }

    let reason = machine.end_reason().unwrap_or(EndReason::Internal);
    let message = machine
        .error()
        .unwrap_or_else(|| reason.default_message().to_string());
    warn!(end_reason = %reason, "Recording failed: {}", message);
    notifier.recording_failed(&message);

    if reason.is_not_admitted() {
        notifier.failed(bot_id, reason.as_str());
    }
}
