//! Reconciliation of fetched execution state against what was already seen.
//!
//! A tick is split into an I/O stage ([`ReconciliationEngine::fetch`]) and a
//! synchronous stage ([`ReconciliationEngine::reconcile`]) that classifies
//! executions, grows the known-id sets and updates the [`MonitorState`].
//! A failed fetch never reaches the second stage, so errors leave every set
//! and flag untouched.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::client::{ExecutionFetcher, FailureEvent, FetchError, RunningExecution, FAILED_EVENT_FILTER};
use crate::config::MonitorConfig;
use crate::monitor::state::MonitorState;

/// One line of the displayed job list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_id: i64,
    pub started_at: DateTime<Utc>,
    pub description: String,
    /// Running past the late threshold (`true`) or reported failed (`false`).
    pub is_long_running: bool,
    /// First time this id was seen in its category; drives the popup.
    pub is_new: bool,
}

/// Engine inputs taken from the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub project: String,
    pub late_threshold: Duration,
    pub failed_job_number: usize,
}

impl EngineSettings {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            project: config.rundeck.project.clone(),
            late_threshold: late_threshold(config.monitor.late_threshold_sec),
            failed_job_number: config.monitor.failed_job_number,
        }
    }
}

/// Saturates instead of panicking on values chrono cannot represent.
fn late_threshold(seconds: u64) -> Duration {
    i64::try_from(seconds)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

/// Raw server state gathered by one fetch.
#[derive(Debug, Clone, Default)]
pub struct ExecutionSnapshot {
    pub failures: Vec<FailureEvent>,
    pub running: Vec<RunningExecution>,
}

/// Execution ids already surfaced to the user. Append-only within a run.
#[derive(Debug, Clone, Default)]
pub struct KnownExecutions {
    late: HashSet<i64>,
    failed: HashSet<i64>,
}

impl KnownExecutions {
    pub fn is_known_late(&self, id: i64) -> bool {
        self.late.contains(&id)
    }

    pub fn is_known_failed(&self, id: i64) -> bool {
        self.failed.contains(&id)
    }

    pub fn late_count(&self) -> usize {
        self.late.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// Returns `true` when `id` was not known yet.
    fn insert_late(&mut self, id: i64) -> bool {
        self.late.insert(id)
    }

    fn insert_failed(&mut self, id: i64) -> bool {
        self.failed.insert(id)
    }
}

/// Result of a successful tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    /// Late executions first, then failures, each in source order.
    pub entries: Vec<ExecutionRecord>,
    pub new_late_ids: Vec<i64>,
    pub new_failed_ids: Vec<i64>,
    /// Flags after the tick.
    pub state: MonitorState,
}

impl TickOutcome {
    pub fn has_new(&self) -> bool {
        !self.new_late_ids.is_empty() || !self.new_failed_ids.is_empty()
    }
}

pub struct ReconciliationEngine<F> {
    fetcher: F,
    settings: EngineSettings,
    known: KnownExecutions,
    state: MonitorState,
}

impl<F: ExecutionFetcher> ReconciliationEngine<F> {
    pub fn new(fetcher: F, settings: EngineSettings) -> Self {
        Self {
            fetcher,
            settings,
            known: KnownExecutions::default(),
            state: MonitorState::new(),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn known(&self) -> &KnownExecutions {
        &self.known
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    /// Replace limits after a configuration reload. Known ids are kept.
    pub fn apply_settings(&mut self, settings: EngineSettings) {
        info!(
            project = %settings.project,
            late_threshold_sec = settings.late_threshold.num_seconds(),
            failed_job_number = settings.failed_job_number,
            "engine settings updated"
        );
        self.settings = settings;
    }

    pub fn mark_disconnected(&mut self) {
        self.state.set_disconnected(true);
    }

    /// Acknowledge failures: clear the sticky flag, keep the known ids.
    pub fn reset_alerts(&mut self) {
        self.state.set_failed_jobs(false);
    }

    /// Request failure history, then running executions.
    pub async fn fetch(&self) -> Result<ExecutionSnapshot, FetchError> {
        let project = self.settings.project.as_str();
        let failures = self
            .fetcher
            .get_history(project, FAILED_EVENT_FILTER, self.settings.failed_job_number, 0)
            .await?;
        let running = self.fetcher.get_running_executions(project).await?;
        Ok(ExecutionSnapshot { failures, running })
    }

    pub async fn tick(&mut self, is_initial: bool) -> Result<TickOutcome, FetchError> {
        self.tick_at(is_initial, Utc::now()).await
    }

    /// Same as [`tick`](Self::tick) with an explicit clock reading.
    pub async fn tick_at(&mut self, is_initial: bool, now: DateTime<Utc>) -> Result<TickOutcome, FetchError> {
        let snapshot = self.fetch().await?;
        Ok(self.reconcile(snapshot, now, is_initial))
    }

    /// Classify a fetched snapshot and fold it into the known sets and flags.
    pub fn reconcile(&mut self, snapshot: ExecutionSnapshot, now: DateTime<Utc>, is_initial: bool) -> TickOutcome {
        self.state.set_disconnected(false);

        let mut entries = Vec::with_capacity(snapshot.running.len() + snapshot.failures.len());
        let mut new_late_ids = Vec::new();
        let mut new_failed_ids = Vec::new();

        let mut late_found = false;
        for execution in snapshot.running {
            // Strictly greater: exactly at the threshold is still on time.
            if now - execution.started_at <= self.settings.late_threshold {
                continue;
            }
            late_found = true;
            let is_new = self.known.insert_late(execution.id);
            if is_new {
                new_late_ids.push(execution.id);
            }
            entries.push(ExecutionRecord {
                execution_id: execution.id,
                started_at: execution.started_at,
                description: execution.description,
                is_long_running: true,
                is_new,
            });
        }
        self.state.set_late_jobs(late_found);

        for event in snapshot.failures {
            let is_new = self.known.insert_failed(event.execution_id);
            if is_new {
                self.state.set_failed_jobs(true);
                new_failed_ids.push(event.execution_id);
            }
            entries.push(ExecutionRecord {
                execution_id: event.execution_id,
                started_at: event.started_at,
                description: event.title,
                is_long_running: false,
                is_new,
            });
        }

        if is_initial {
            // History predating the monitor is seeded without alerting.
            self.state.set_failed_jobs(false);
            for entry in &mut entries {
                entry.is_new = false;
            }
            info!(
                known_late = self.known.late_count(),
                known_failed = self.known.failed_count(),
                "seeded known executions"
            );
            new_late_ids.clear();
            new_failed_ids.clear();
        }

        debug!(
            entries = entries.len(),
            new_late = new_late_ids.len(),
            new_failed = new_failed_ids.len(),
            icon = %self.state.icon(),
            "tick reconciled"
        );

        TickOutcome {
            entries,
            new_late_ids,
            new_failed_ids,
            state: self.state,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
