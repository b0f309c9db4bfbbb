//! Turns raw speaker-list updates into the participant signals the
//! recording loop reads.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// One entry of the meeting's participant list as reported by the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerData {
    pub name: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub is_speaking: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParticipantState {
    pub attendees_count: usize,
    pub first_user_joined: bool,
    pub last_speaker_time: Option<Instant>,
    /// Start of the current stretch with nobody speaking.
    pub silence_start: Option<Instant>,
}

impl ParticipantState {
    /// Moves the activity timestamps forward so a pause does not count as
    /// silence.
    pub fn shifted(mut self, by: Duration) -> Self {
        self.last_speaker_time = self.last_speaker_time.map(|t| t + by);
        self.silence_start = self.silence_start.map(|t| t + by);
        self
    }
}

/// Shared, lock-protected participant state. Written by the speaker observer
/// callback, read by the recording loop.
#[derive(Debug, Clone, Default)]
pub struct ParticipantSignals {
    inner: Arc<Mutex<ParticipantState>>,
}

impl ParticipantSignals {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ParticipantState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> ParticipantState {
        self.lock().clone()
    }

    pub fn restore(&self, state: ParticipantState) {
        *self.lock() = state;
    }

    pub fn clear_silence(&self) {
        self.lock().silence_start = None;
    }

    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut ParticipantState),
    {
        f(&mut self.lock());
    }
}

#[derive(Clone)]
pub struct SpeakerAggregator {
    bot_name: String,
    signals: ParticipantSignals,
}

impl SpeakerAggregator {
    pub fn new(bot_name: impl Into<String>, signals: ParticipantSignals) -> Self {
        Self {
            bot_name: bot_name.into(),
            signals,
        }
    }

    pub fn signals(&self) -> &ParticipantSignals {
        &self.signals
    }

    pub fn observe(&self, speakers: &[SpeakerData]) {
        self.observe_at(speakers, Instant::now());
    }

    pub fn observe_at(&self, speakers: &[SpeakerData], now: Instant) {
        let humans: Vec<&SpeakerData> = speakers
            .iter()
            .filter(|s| !s.name.trim().eq_ignore_ascii_case(self.bot_name.trim()))
            .collect();
        let anyone_speaking = humans.iter().any(|s| s.is_speaking);

        self.signals.update(|state| {
            state.attendees_count = humans.len();
            if !humans.is_empty() {
                state.first_user_joined = true;
            }

            if anyone_speaking {
                state.last_speaker_time = Some(now);
                state.silence_start = None;
            } else if state.silence_start.is_none() {
                debug!("Nobody speaking, latching silence start");
                state.silence_start = Some(now);
            }
        });
    }
}
