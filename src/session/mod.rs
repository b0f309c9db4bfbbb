//! Bot session lifecycle: phases, end reasons, the shared context and the
//! machine that drives one session from Initialization to Terminated.

pub mod conditions;
pub mod context;
pub mod control;
pub mod deadline;
pub mod end_reason;
pub mod machine;
pub mod phase;
pub mod states;

pub use conditions::{EndConditions, Verdict, NO_ATTENDEE_CONFIRMATION};
pub use context::{SessionContext, SessionHandles, SessionTiming};
pub use control::{ControlError, SessionControl, SessionStatus};
pub use deadline::{within, TimedOut};
pub use end_reason::{EndReason, EndReasonRegistry};
pub use machine::SessionMachine;
pub use phase::SessionPhase;
pub use states::StateHandler;
