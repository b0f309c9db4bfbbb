use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tracing::{error, info};

use super::context::SessionContext;
use super::control::SessionControl;
use super::end_reason::EndReason;
use super::phase::SessionPhase;
use super::states::handler_for;

/// Drives one session through its phases until it reaches Terminated.
///
/// Handlers classify their own failures. Anything escaping a handler, an
/// `Err` or a panic, is recorded as an internal fault here and the session
/// is routed towards teardown, so `run` always finishes.
pub struct SessionMachine {
    phase: SessionPhase,
    context: SessionContext,
    transitions: Vec<(SessionPhase, SessionPhase)>,
}

impl SessionMachine {
    pub fn new(context: SessionContext) -> Self {
        Self {
            phase: SessionPhase::Initialization,
            context,
            transitions: Vec::new(),
        }
    }

    pub async fn run(&mut self) {
        info!(bot_id = %self.context.config.bot.bot_id, "Session starting");
        self.context.control.set_phase(self.phase);

        while self.phase != SessionPhase::Terminated {
            let handler = handler_for(self.phase);
            let outcome = AssertUnwindSafe(handler.execute(&mut self.context))
                .catch_unwind()
                .await;

            let next = match outcome {
                Ok(Ok(next)) => next,
                Ok(Err(e)) => {
                    error!(phase = %self.phase, "Unhandled fault: {:#}", e);
                    self.context.record_fault(format!("{:#}", e));
                    self.phase.on_fault()
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!(phase = %self.phase, "Handler panicked: {}", message);
                    self.context.record_fault(format!("panic in {}: {}", self.phase, message));
                    self.phase.on_fault()
                }
            };

            self.transition(next);
        }

        info!(
            end_reason = ?self.end_reason(),
            successful = self.was_recording_successful(),
            "Session terminated"
        );
    }

    fn transition(&mut self, next: SessionPhase) {
        if next != self.phase {
            info!("Phase {} -> {}", self.phase, next);
        }
        self.transitions.push((self.phase, next));
        self.phase = next;
        self.context.control.set_phase(next);
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn was_recording_successful(&self) -> bool {
        self.context.end_reason.was_successful()
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        self.context.end_reason.reason()
    }

    /// The classified error message, or the detail of an unexpected fault.
    pub fn error(&self) -> Option<String> {
        self.context
            .end_reason
            .error_message()
            .or_else(|| self.context.error.clone())
    }

    pub fn transitions(&self) -> &[(SessionPhase, SessionPhase)] {
        &self.transitions
    }

    pub fn control(&self) -> SessionControl {
        self.context.control.clone()
    }

    pub fn pause_duration(&self) -> Duration {
        self.context.timing.total_pause
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.context.timing.started_wall
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
