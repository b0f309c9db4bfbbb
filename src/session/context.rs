//! Everything a session carries from one phase to the next.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::conditions::EndConditions;
use super::control::SessionControl;
use super::end_reason::EndReasonRegistry;
use crate::config::Config;
use crate::global::SessionPaths;
use crate::notifier::Notifier;
use crate::provider::MeetingProvider;
use crate::services::{
    BrandingProcess, BrowserSession, DialogObserver, MeetingPage, PageObserver, Recorder,
    SessionServices, SpeakerObserver, SpeakersCallback, StreamingSession,
};
use crate::speakers::{ParticipantSignals, ParticipantState, SpeakerAggregator};

/// Resources started by earlier phases. Cleanup takes each one out exactly once.
#[derive(Default)]
pub struct SessionHandles {
    pub browser: Option<Arc<dyn BrowserSession>>,
    pub page: Option<Arc<dyn MeetingPage>>,
    pub recorder: Option<Arc<dyn Recorder>>,
    pub streaming: Option<Arc<dyn StreamingSession>>,
    pub speaker_observer: Option<Arc<dyn SpeakerObserver>>,
    pub dom_cleaner: Option<Arc<dyn PageObserver>>,
    pub video_fixer: Option<Arc<dyn PageObserver>>,
    pub dialog_observer: Option<Arc<dyn DialogObserver>>,
    pub branding: Option<Box<dyn BrandingProcess>>,
    pub recorder_watch: Option<JoinHandle<()>>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionTiming {
    /// Set once recording starts; never reset by pause/resume.
    pub started_at: Option<Instant>,
    pub started_wall: Option<DateTime<Utc>>,
    pub pause_started: Option<Instant>,
    pub total_pause: Duration,
    pub paused: bool,
}

impl SessionTiming {
    /// Closes the current pause window, if any, into `total_pause`.
    pub fn end_pause(&mut self, now: Instant) -> Duration {
        if let Some(started) = self.pause_started.take() {
            self.total_pause += now.saturating_duration_since(started);
        }
        self.paused = false;
        self.total_pause
    }
}

pub struct SessionContext {
    pub config: Arc<Config>,
    pub provider: Arc<dyn MeetingProvider>,
    pub services: Arc<dyn SessionServices>,
    pub end_reason: EndReasonRegistry,
    pub notifier: Notifier,
    pub control: SessionControl,
    pub participants: ParticipantSignals,
    /// Lives across pause/resume so an armed no-attendee latch survives.
    pub conditions: EndConditions,
    pub paths: Option<SessionPaths>,
    pub handles: SessionHandles,
    pub timing: SessionTiming,
    /// Participant signals captured when pausing, restored on resume.
    pub saved_signals: Option<ParticipantState>,
    /// Detail of the last unexpected fault, for diagnostics.
    pub error: Option<String>,
}

impl SessionContext {
    pub fn new(
        config: Arc<Config>,
        provider: Arc<dyn MeetingProvider>,
        services: Arc<dyn SessionServices>,
        notifier: Notifier,
    ) -> Self {
        let end_reason = EndReasonRegistry::new();
        let control = SessionControl::new(end_reason.clone());
        let conditions = EndConditions::new(&config.automatic_leave);
        Self {
            config,
            provider,
            services,
            end_reason,
            notifier,
            control,
            participants: ParticipantSignals::new(),
            conditions,
            paths: None,
            handles: SessionHandles::default(),
            timing: SessionTiming::default(),
            saved_signals: None,
            error: None,
        }
    }

    pub fn page(&self) -> Result<Arc<dyn MeetingPage>> {
        self.handles
            .page
            .clone()
            .ok_or_else(|| anyhow!("No meeting page"))
    }

    pub fn paths(&self) -> Result<&SessionPaths> {
        self.paths
            .as_ref()
            .ok_or_else(|| anyhow!("Session directory not prepared"))
    }

    /// Callback handed to the speaker observer; feeds the shared signals.
    pub fn speakers_callback(&self) -> SpeakersCallback {
        let aggregator = SpeakerAggregator::new(
            self.config.bot.bot_name.clone(),
            self.participants.clone(),
        );
        Arc::new(move |speakers| aggregator.observe(&speakers))
    }

    /// Records an unexpected fault without overriding a more specific reason.
    pub fn record_fault(&mut self, message: String) {
        self.end_reason
            .set_error_if_unset(super::EndReason::Internal, Some(message.clone()));
        self.error = Some(message);
    }
}
