//! Job-server collaborator boundary.
//!
//! The monitor core only sees [`ExecutionFetcher`]; [`rundeck::RundeckClient`]
//! is the production implementation speaking the Rundeck REST API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod rundeck;

pub use self::rundeck::RundeckClient;

/// Event filter selecting failed executions in the history API.
pub const FAILED_EVENT_FILTER: &str = "fail";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("authentication rejected by server (HTTP {status})")]
    Auth { status: u16 },

    #[error("unexpected HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("failed to decode server response: {0}")]
    Decode(String),

    #[error("invalid server url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// One entry of the execution history, filtered on failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEvent {
    pub execution_id: i64,
    pub started_at: DateTime<Utc>,
    pub title: String,
}

/// An execution the server currently reports as running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningExecution {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub description: String,
}

/// Source of execution state for one project.
///
/// Both calls may block on network I/O and fail with a [`FetchError`].
#[async_trait::async_trait]
pub trait ExecutionFetcher: Send + Sync {
    /// Most recent history events matching `event_filter`, at most `limit`,
    /// skipping `offset`. Order is the server's.
    async fn get_history(
        &self,
        project: &str,
        event_filter: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<FailureEvent>, FetchError>;

    /// Executions currently running in `project`.
    async fn get_running_executions(&self, project: &str) -> Result<Vec<RunningExecution>, FetchError>;
}
