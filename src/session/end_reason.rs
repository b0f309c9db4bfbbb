//! Why a session is ending, and whether that counts as a failure.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    BotNotAccepted,
    BotRemoved,
    BotRemovedTooEarly,
    TimeoutWaitingToStart,
    InvalidMeetingUrl,
    LoginRequired,
    ApiRequest,
    NoAttendees,
    NoSpeaker,
    RecordingTimeout,
    StreamingSetupFailed,
    Internal,
}

/// Reasons that mean the session ended the way it was supposed to.
pub const NORMAL_END_REASONS: [EndReason; 4] = [
    EndReason::ApiRequest,
    EndReason::NoAttendees,
    EndReason::NoSpeaker,
    EndReason::RecordingTimeout,
];

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BotNotAccepted => "bot_not_accepted",
            Self::BotRemoved => "bot_removed",
            Self::BotRemovedTooEarly => "bot_removed_too_early",
            Self::TimeoutWaitingToStart => "timeout_waiting_to_start",
            Self::InvalidMeetingUrl => "invalid_meeting_url",
            Self::LoginRequired => "login_required",
            Self::ApiRequest => "api_request",
            Self::NoAttendees => "no_attendees",
            Self::NoSpeaker => "no_speaker",
            Self::RecordingTimeout => "recording_timeout",
            Self::StreamingSetupFailed => "streaming_setup_failed",
            Self::Internal => "internal",
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            Self::BotNotAccepted => "The bot was not accepted into the meeting",
            Self::BotRemoved => "The bot was removed from the meeting",
            Self::BotRemovedTooEarly => "The bot was removed from the meeting too early",
            Self::TimeoutWaitingToStart => "Timed out waiting to be admitted to the meeting",
            Self::InvalidMeetingUrl => "The meeting URL is invalid",
            Self::LoginRequired => "The meeting requires the bot to sign in",
            Self::ApiRequest => "Recording stopped on request",
            Self::NoAttendees => "Nobody is left in the meeting",
            Self::NoSpeaker => "Nobody has spoken for too long",
            Self::RecordingTimeout => "Maximum recording duration reached",
            Self::StreamingSetupFailed => "The recorder failed",
            Self::Internal => "Internal error",
        }
    }

    pub fn is_normal(&self) -> bool {
        NORMAL_END_REASONS.contains(self)
    }

    /// Reasons that, once recorded, cannot be replaced by a different one.
    pub fn is_priority(&self) -> bool {
        matches!(self, Self::ApiRequest | Self::LoginRequired)
    }

    /// Outcomes the operator expects to happen now and then; logged as warnings.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            Self::BotNotAccepted
                | Self::BotRemoved
                | Self::BotRemovedTooEarly
                | Self::TimeoutWaitingToStart
                | Self::ApiRequest
        )
    }

    /// The bot never made it into the meeting.
    pub fn is_not_admitted(&self) -> bool {
        matches!(
            self,
            Self::BotNotAccepted
                | Self::TimeoutWaitingToStart
                | Self::InvalidMeetingUrl
                | Self::LoginRequired
        )
    }
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default, Clone)]
struct RegistryState {
    reason: Option<EndReason>,
    message: Option<String>,
}

/// Session-wide end-reason record. Cloning shares the same record.
#[derive(Debug, Clone, Default)]
pub struct EndReasonRegistry {
    inner: Arc<Mutex<RegistryState>>,
}

impl EndReasonRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records a failure. Returns false when a priority reason already holds
    /// the record and the new reason differs.
    pub fn set_error(&self, reason: EndReason, message: Option<String>) -> bool {
        let mut state = self.lock();

        if let Some(current) = state.reason {
            if current.is_priority() && current != reason {
                warn!(
                    "Ignoring end reason {} because {} is already set",
                    reason, current
                );
                return false;
            }
        }

        let keep_custom_message = message.is_none()
            && state.reason == Some(reason)
            && state
                .message
                .as_deref()
                .is_some_and(|m| m != reason.default_message());

        state.reason = Some(reason);
        if reason.is_normal() {
            state.message = None;
        } else if !keep_custom_message {
            state.message = Some(message.unwrap_or_else(|| reason.default_message().to_string()));
        }

        info!("End reason set to {} (error)", reason);
        true
    }

    /// Records why the session is ending without attaching an error message.
    /// Normal-bucket reasons clear any message recorded earlier.
    pub fn set_end_reason(&self, reason: EndReason) -> bool {
        let mut state = self.lock();

        if let Some(current) = state.reason {
            if current.is_priority() && current != reason {
                warn!(
                    "Ignoring end reason {} because {} is already set",
                    reason, current
                );
                return false;
            }
        }

        state.reason = Some(reason);
        if reason.is_normal() {
            state.message = None;
        }

        info!("End reason set to {}", reason);
        true
    }

    /// Classifies a fault only when nothing more specific was recorded yet.
    pub fn set_error_if_unset(&self, reason: EndReason, message: Option<String>) -> bool {
        if self.reason().is_some() {
            return false;
        }
        self.set_error(reason, message)
    }

    pub fn reason(&self) -> Option<EndReason> {
        self.lock().reason
    }

    pub fn error_message(&self) -> Option<String> {
        self.lock().message.clone()
    }

    pub fn has_error(&self) -> bool {
        self.lock().message.is_some()
    }

    /// An operator stop or a sign-in wall: both abort whatever is waiting.
    pub fn stop_requested(&self) -> bool {
        matches!(
            self.reason(),
            Some(EndReason::ApiRequest) | Some(EndReason::LoginRequired)
        )
    }

    pub fn was_successful(&self) -> bool {
        let state = self.lock();
        match state.reason {
            Some(reason) => state.message.is_none() && reason.is_normal(),
            None => false,
        }
    }
}
