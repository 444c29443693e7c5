//! Agent module - the run loop and its state
//!
//! Turns an objective into cycles of extract, annotate, decide and execute.

pub mod action_log;
pub mod decision;
pub mod loop_state;
pub mod orchestrator;
pub mod session;

pub use action_log::{ActionLog, JsonlActionLog};
pub use decision::{DecisionEngine, LogIndicator, ThinkingIndicator};
pub use loop_state::{LoopStatus, ObjectiveOutcome, ObjectiveState};
pub use orchestrator::{Agent, PageInfo, ShutdownSummary};
pub use session::{SessionReport, SessionState};
