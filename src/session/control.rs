//! Handle through which the outside world (the HTTP API) steers a running
//! session: stop, pause, resume, and a read-only status view.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use super::end_reason::{EndReason, EndReasonRegistry};
use super::phase::SessionPhase;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("cannot pause while {0}: only an active recording can be paused")]
    NotRecording(SessionPhase),
    #[error("cannot resume while {0}: the recording is not paused")]
    NotPaused(SessionPhase),
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub phase: SessionPhase,
    pub end_reason: Option<EndReason>,
    pub error_message: Option<String>,
    pub paused: bool,
    pub pause_duration_ms: u64,
}

struct ControlInner {
    phase: Mutex<SessionPhase>,
    pause_requested: AtomicBool,
    resume_requested: AtomicBool,
    pause_total_ms: AtomicU64,
    registry: EndReasonRegistry,
}

#[derive(Clone)]
pub struct SessionControl {
    inner: Arc<ControlInner>,
}

impl SessionControl {
    pub fn new(registry: EndReasonRegistry) -> Self {
        Self {
            inner: Arc::new(ControlInner {
                phase: Mutex::new(SessionPhase::Initialization),
                pause_requested: AtomicBool::new(false),
                resume_requested: AtomicBool::new(false),
                pause_total_ms: AtomicU64::new(0),
                registry,
            }),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        *self.inner.phase.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub(crate) fn set_phase(&self, phase: SessionPhase) {
        *self.inner.phase.lock().unwrap_or_else(|p| p.into_inner()) = phase;
    }

    pub fn request_pause(&self) -> Result<(), ControlError> {
        let phase = self.phase();
        if phase != SessionPhase::Recording {
            return Err(ControlError::NotRecording(phase));
        }
        info!("Pause requested");
        self.inner.pause_requested.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn request_resume(&self) -> Result<(), ControlError> {
        let phase = self.phase();
        if phase != SessionPhase::Paused {
            return Err(ControlError::NotPaused(phase));
        }
        info!("Resume requested");
        self.inner.resume_requested.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Asks the session to end. Returns false if a different priority reason
    /// already holds.
    pub fn request_stop(&self) -> bool {
        info!("Stop requested");
        self.inner.registry.set_end_reason(EndReason::ApiRequest)
    }

    /// Consumes a pending pause request.
    pub(crate) fn take_pause_request(&self) -> bool {
        self.inner.pause_requested.swap(false, Ordering::SeqCst)
    }

    /// Consumes a pending resume request.
    pub(crate) fn take_resume_request(&self) -> bool {
        self.inner.resume_requested.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn record_pause_total(&self, total: Duration) {
        self.inner
            .pause_total_ms
            .store(total.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn pause_duration(&self) -> Duration {
        Duration::from_millis(self.inner.pause_total_ms.load(Ordering::SeqCst))
    }

    pub fn status(&self) -> SessionStatus {
        let phase = self.phase();
        SessionStatus {
            phase,
            end_reason: self.inner.registry.reason(),
            error_message: self.inner.registry.error_message(),
            paused: phase == SessionPhase::Paused,
            pause_duration_ms: self.pause_duration().as_millis() as u64,
        }
    }
}
