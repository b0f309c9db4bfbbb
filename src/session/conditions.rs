//! Activity-based end conditions evaluated on every recording tick.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use super::end_reason::EndReason;
use crate::config::AutomaticLeaveConfig;
use crate::speakers::ParticipantState;

/// How long the meeting must stay empty before the bot leaves.
pub const NO_ATTENDEE_CONFIRMATION: Duration = Duration::from_secs(45);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    /// Sound above the activity threshold; both silence latches must reset.
    SoundActive,
    End(EndReason),
}

#[derive(Debug, Clone)]
pub struct EndConditions {
    grace: Duration,
    silence_timeout: Duration,
    sound_threshold: f32,
    empty_since: Option<Instant>,
}

impl EndConditions {
    pub fn new(leave: &AutomaticLeaveConfig) -> Self {
        Self {
            grace: leave.noone_joined(),
            silence_timeout: leave.silence(),
            sound_threshold: leave.sound_activity_threshold,
            empty_since: None,
        }
    }

    pub fn empty_since(&self) -> Option<Instant> {
        self.empty_since
    }

    /// Moves an armed no-attendee latch forward past a pause window.
    pub fn shift(&mut self, by: Duration) {
        self.empty_since = self.empty_since.map(|since| since + by);
    }

    pub fn evaluate(
        &mut self,
        now: Instant,
        started_at: Instant,
        sound_level: Option<f32>,
        signals: &ParticipantState,
    ) -> Verdict {
        if let Some(level) = sound_level {
            if level > self.sound_threshold {
                self.empty_since = None;
                return Verdict::SoundActive;
            }
        }

        if self.no_attendees(now, started_at, signals) {
            return Verdict::End(EndReason::NoAttendees);
        }

        if let Some(silent_since) = signals.silence_start {
            if now.saturating_duration_since(silent_since) > self.silence_timeout {
                info!(
                    "No speaker for {:?}, ending meeting",
                    now.saturating_duration_since(silent_since)
                );
                return Verdict::End(EndReason::NoSpeaker);
            }
        }

        Verdict::Continue
    }

    fn no_attendees(&mut self, now: Instant, started_at: Instant, signals: &ParticipantState) -> bool {
        if signals.attendees_count > 0 {
            self.empty_since = None;
            return false;
        }

        let grace_over = now.saturating_duration_since(started_at) > self.grace;
        if !grace_over && !signals.first_user_joined {
            self.empty_since = None;
            return false;
        }

        let since = *self.empty_since.get_or_insert_with(|| {
            debug!("Meeting looks empty, starting confirmation window");
            now
        });

        let empty_for = now.saturating_duration_since(since);
        if empty_for >= NO_ATTENDEE_CONFIRMATION {
            info!("Meeting empty for {:?}, ending meeting", empty_for);
            return true;
        }
        false
    }
}
