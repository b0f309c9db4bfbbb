//! Lifecycle event delivery.
//!
//! Sends are queued onto a bounded channel and delivered by a background
//! task, so the control loop never waits on the network. `send_once`
//! delivers each code at most once per session.

pub mod sink;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

pub use sink::{EventSink, LogSink, MemorySink, WebhookSink};

pub const STATUS_CHANGE: &str = "bot.status_change";
const QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCode {
    JoiningCall,
    InWaitingRoom,
    InCallNotRecording,
    InCallRecording,
    RecordingPaused,
    RecordingResumed,
    CallEnded,
    BotRejected,
    BotRemoved,
    BotRemovedTooEarly,
    WaitingRoomTimeout,
    InvalidMeetingUrl,
    ApiRequestStop,
    MeetingError,
    RecordingSucceeded,
    RecordingFailed,
    Failed,
}

impl EventCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JoiningCall => "joining_call",
            Self::InWaitingRoom => "in_waiting_room",
            Self::InCallNotRecording => "in_call_not_recording",
            Self::InCallRecording => "in_call_recording",
            Self::RecordingPaused => "recording_paused",
            Self::RecordingResumed => "recording_resumed",
            Self::CallEnded => "call_ended",
            Self::BotRejected => "bot_rejected",
            Self::BotRemoved => "bot_removed",
            Self::BotRemovedTooEarly => "bot_removed_too_early",
            Self::WaitingRoomTimeout => "waiting_room_timeout",
            Self::InvalidMeetingUrl => "invalid_meeting_url",
            Self::ApiRequestStop => "api_request_stop",
            Self::MeetingError => "meeting_error",
            Self::RecordingSucceeded => "recording_succeeded",
            Self::RecordingFailed => "recording_failed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BotEvent {
    pub code: EventCode,
    pub event_type: String,
    pub extra: Value,
    pub created_at: DateTime<Utc>,
}

impl BotEvent {
    pub fn new(code: EventCode, extra: Value, event_type: &str) -> Self {
        Self {
            code,
            event_type: event_type.to_string(),
            extra,
            created_at: Utc::now(),
        }
    }
}

enum Job {
    Deliver(BotEvent),
    Flush(oneshot::Sender<()>),
}

#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::Sender<Job>,
    sent: Arc<Mutex<HashSet<EventCode>>>,
}

impl Notifier {
    /// Starts the delivery task. Must be called inside a tokio runtime.
    pub fn spawn(sink: Arc<dyn EventSink>) -> Self {
        let (tx, mut rx) = mpsc::channel::<Job>(QUEUE_CAPACITY);

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                match job {
                    Job::Deliver(event) => {
                        if let Err(e) = sink.deliver(&event).await {
                            warn!(
                                "Unable to send event {} (continuing): {}",
                                event.code.as_str(),
                                e
                            );
                        }
                    }
                    Job::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            debug!("Notifier queue closed");
        });

        Self {
            tx,
            sent: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Queues `code` unless it was already sent this session. Returns whether
    /// the event was queued.
    pub fn send_once(&self, code: EventCode, extra: Value) -> bool {
        let mut sent = self.sent.lock().unwrap_or_else(|p| p.into_inner());
        if sent.contains(&code) {
            warn!("Event {} already sent, skipping", code.as_str());
            return false;
        }
        // A dropped event stays eligible for a later attempt.
        let queued = self.enqueue(BotEvent::new(code, extra, STATUS_CHANGE));
        if queued {
            sent.insert(code);
        }
        queued
    }

    /// Queues `code` unconditionally.
    pub fn send(&self, code: EventCode, extra: Value, event_type: &str) -> bool {
        self.enqueue(BotEvent::new(code, extra, event_type))
    }

    pub fn was_sent(&self, code: EventCode) -> bool {
        self.sent
            .lock()
            .map(|sent| sent.contains(&code))
            .unwrap_or(false)
    }

    fn enqueue(&self, event: BotEvent) -> bool {
        let code = event.code;
        match self.tx.try_send(Job::Deliver(event)) {
            Ok(()) => true,
            Err(e) => {
                warn!("Dropping event {}: {}", code.as_str(), e);
                false
            }
        }
    }

    /// Waits until everything queued before this call has been attempted.
    pub async fn flush(&self, limit: Duration) -> bool {
        let (done_tx, done_rx) = oneshot::channel();
        let wait = async {
            self.tx.send(Job::Flush(done_tx)).await.ok()?;
            done_rx.await.ok()
        };
        matches!(tokio::time::timeout(limit, wait).await, Ok(Some(())))
    }

    pub fn joining_call(&self) {
        self.send_once(EventCode::JoiningCall, Value::Null);
    }

    pub fn in_waiting_room(&self) {
        self.send_once(EventCode::InWaitingRoom, Value::Null);
    }

    pub fn in_call_not_recording(&self) {
        self.send_once(EventCode::InCallNotRecording, Value::Null);
    }

    pub fn in_call_recording(&self, start_time: DateTime<Utc>) {
        self.send_once(
            EventCode::InCallRecording,
            json!({ "start_time": start_time.timestamp_millis() }),
        );
    }

    pub fn recording_paused(&self) {
        self.send(EventCode::RecordingPaused, Value::Null, STATUS_CHANGE);
    }

    pub fn recording_resumed(&self) {
        self.send(EventCode::RecordingResumed, Value::Null, STATUS_CHANGE);
    }

    pub fn call_ended(&self) {
        self.send_once(EventCode::CallEnded, Value::Null);
    }

    pub fn meeting_error(&self, message: &str) {
        self.send_once(
            EventCode::MeetingError,
            json!({ "error_message": message, "error_type": "MeetingError" }),
        );
    }

    pub fn recording_succeeded(&self) {
        self.send_once(EventCode::RecordingSucceeded, Value::Null);
    }

    pub fn recording_failed(&self, message: &str) {
        self.send_once(
            EventCode::RecordingFailed,
            json!({ "error_message": message }),
        );
    }

    pub fn failed(&self, bot_id: &str, reason: &str) {
        self.send(
            EventCode::Failed,
            json!({ "bot_id": bot_id, "error": reason, "message": reason }),
            "failed",
        );
    }
}
