//! Polling and reconciliation core.
//!
//! [`engine`] classifies executions, [`state`] holds the alert flags,
//! [`poll`] drives the engine on a fixed delay and [`control`] is the handle
//! other tasks use to read status and send commands.

pub mod control;
pub mod engine;
pub mod poll;
pub mod state;

pub use self::control::MonitorHandle;
pub use self::engine::{EngineSettings, ExecutionRecord, KnownExecutions, ReconciliationEngine, TickOutcome};
pub use self::poll::{Command, Monitor, StartupError, StatusSnapshot};
pub use self::state::{IconState, MonitorState};

#[cfg(test)]
pub(crate) mod testing;
