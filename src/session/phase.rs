use serde::{Deserialize, Serialize};

/// Lifecycle phase of a bot session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Initialization,
    WaitingRoom,
    InCall,
    Recording,
    Paused,
    Resuming,
    Error,
    Cleanup,
    Terminated,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialization => "initialization",
            Self::WaitingRoom => "waiting_room",
            Self::InCall => "in_call",
            Self::Recording => "recording",
            Self::Paused => "paused",
            Self::Resuming => "resuming",
            Self::Error => "error",
            Self::Cleanup => "cleanup",
            Self::Terminated => "terminated",
        }
    }

    /// Where the loop goes when a handler in this phase faults unexpectedly.
    /// Teardown phases only ever move forward.
    pub fn on_fault(&self) -> SessionPhase {
        match self {
            Self::Error => Self::Cleanup,
            Self::Cleanup | Self::Terminated => Self::Terminated,
            _ => Self::Error,
        }
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
