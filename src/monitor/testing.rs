//! Scripted collaborators shared by the monitor tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::client::{ExecutionFetcher, FailureEvent, FetchError, RunningExecution};
use crate::config::MonitorConfig;
use crate::monitor::engine::{ExecutionRecord, ExecutionSnapshot};
use crate::monitor::state::{IconState, MonitorState};
use crate::tray::PresentationLayer;

pub fn running(id: i64, started_at: DateTime<Utc>, description: &str) -> RunningExecution {
    RunningExecution {
        id,
        started_at,
        description: description.to_string(),
    }
}

pub fn failure(execution_id: i64, started_at: DateTime<Utc>, title: &str) -> FailureEvent {
    FailureEvent {
        execution_id,
        started_at,
        title: title.to_string(),
    }
}

#[derive(Default)]
struct ScriptState {
    /// `None` scripts a server error for that tick.
    queue: VecDeque<Option<ExecutionSnapshot>>,
    last: Option<Option<ExecutionSnapshot>>,
    pending_running: Option<Vec<RunningExecution>>,
    history_calls: Vec<(String, String, usize, usize)>,
}

/// Fetcher replaying one queued snapshot per tick; the last one repeats.
#[derive(Clone, Default)]
pub struct ScriptedFetcher {
    inner: Arc<Mutex<ScriptState>>,
}

impl ScriptedFetcher {
    pub fn push_ok(&self, running: Vec<RunningExecution>, failures: Vec<FailureEvent>) {
        self.inner
            .lock()
            .unwrap()
            .queue
            .push_back(Some(ExecutionSnapshot { failures, running }));
    }

    pub fn push_err(&self) {
        self.inner.lock().unwrap().queue.push_back(None);
    }

    pub fn history_calls(&self) -> Vec<(String, String, usize, usize)> {
        self.inner.lock().unwrap().history_calls.clone()
    }
}

fn scripted_error() -> FetchError {
    FetchError::Status {
        status: 503,
        url: "http://rundeck.test/api".to_string(),
    }
}

#[async_trait::async_trait]
impl ExecutionFetcher for ScriptedFetcher {
    async fn get_history(
        &self,
        project: &str,
        event_filter: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<FailureEvent>, FetchError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .history_calls
            .push((project.to_string(), event_filter.to_string(), limit, offset));

        let script = match inner.queue.pop_front() {
            Some(script) => {
                inner.last = Some(script.clone());
                script
            }
            None => inner.last.clone().unwrap_or(Some(ExecutionSnapshot::default())),
        };

        match script {
            Some(snapshot) => {
                inner.pending_running = Some(snapshot.running);
                Ok(snapshot.failures)
            }
            None => Err(scripted_error()),
        }
    }

    async fn get_running_executions(&self, _project: &str) -> Result<Vec<RunningExecution>, FetchError> {
        Ok(self.inner.lock().unwrap().pending_running.take().unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PresenterCall {
    Entries(Vec<ExecutionRecord>),
    Icon(IconState),
    Reset,
    Reload(usize),
}

/// Presenter recording every call it receives.
#[derive(Clone, Default)]
pub struct RecordingPresenter {
    calls: Arc<Mutex<Vec<PresenterCall>>>,
}

impl RecordingPresenter {
    pub fn calls(&self) -> Vec<PresenterCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn icons(&self) -> Vec<IconState> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                PresenterCall::Icon(icon) => Some(icon),
                _ => None,
            })
            .collect()
    }
}

impl PresentationLayer for RecordingPresenter {
    fn update_execution_list(&mut self, entries: &[ExecutionRecord]) {
        self.calls.lock().unwrap().push(PresenterCall::Entries(entries.to_vec()));
    }

    fn update_icon(&mut self, state: &MonitorState) {
        self.calls.lock().unwrap().push(PresenterCall::Icon(state.icon()));
    }

    fn reset_alerts(&mut self) {
        self.calls.lock().unwrap().push(PresenterCall::Reset);
    }

    fn reload(&mut self, config: &MonitorConfig) {
        self.calls
            .lock()
            .unwrap()
            .push(PresenterCall::Reload(config.monitor.failed_job_number));
    }
}
