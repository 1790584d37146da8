//! Fixed-delay poll loop.
//!
//! A single task owns the [`ReconciliationEngine`] and the presenter. It
//! ticks, sleeps `refresh_delay` after the tick completes and repeats
//! forever. Fetch errors flip the icon to disconnected and are retried on the
//! same cadence. Commands from other tasks are applied between ticks, so they
//! never race a tick's writes. Readers observe [`StatusSnapshot`]s published
//! on a watch channel.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{ExecutionFetcher, FetchError};
use crate::config::{MonitorConfig, RundeckConfig};
use crate::monitor::engine::{EngineSettings, ExecutionRecord, ReconciliationEngine};
use crate::monitor::state::{IconState, MonitorState};
use crate::tray::PresentationLayer;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("initial poll of project '{project}' failed: {source}")]
    InitialTick {
        project: String,
        #[source]
        source: FetchError,
    },
}

/// Requests sent to the poll loop by the control context.
#[derive(Debug, Clone)]
pub enum Command {
    /// Acknowledge the current failures.
    ResetAlerts,
    /// Apply a freshly loaded configuration and poll immediately.
    Reload(Box<MonitorConfig>),
}

/// Read-only view published after every state change.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub name: String,
    pub project: String,
    pub state: MonitorState,
    pub icon: IconState,
    pub entries: Vec<ExecutionRecord>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub ticks: u64,
    pub failed_ticks: u64,
}

pub struct Monitor<F, P> {
    engine: ReconciliationEngine<F>,
    presenter: P,
    name: String,
    rundeck: RundeckConfig,
    refresh_delay: Duration,
    entries: Vec<ExecutionRecord>,
    last_success: Option<DateTime<Utc>>,
    last_error: Option<String>,
    ticks: u64,
    failed_ticks: u64,
    status_tx: watch::Sender<StatusSnapshot>,
}

impl<F, P> Monitor<F, P>
where
    F: ExecutionFetcher + 'static,
    P: PresentationLayer + 'static,
{
    /// Build the monitor and run the silent initial tick.
    ///
    /// Failing to reach the server here is fatal: the process does not start
    /// without one successful poll.
    pub async fn start(fetcher: F, mut presenter: P, config: &MonitorConfig) -> Result<Self, StartupError> {
        let settings = EngineSettings::from_config(config);
        let project = settings.project.clone();
        let mut engine = ReconciliationEngine::new(fetcher, settings);

        info!(project = %project, "running initial poll");
        let outcome = engine
            .tick(true)
            .await
            .map_err(|source| StartupError::InitialTick { project, source })?;

        presenter.update_execution_list(&outcome.entries);
        presenter.update_icon(&outcome.state);

        let now = Utc::now();
        let initial = StatusSnapshot {
            name: config.monitor.name.clone(),
            project: config.rundeck.project.clone(),
            state: outcome.state,
            icon: outcome.state.icon(),
            entries: outcome.entries.clone(),
            last_success: Some(now),
            last_error: None,
            ticks: 1,
            failed_ticks: 0,
        };
        let (status_tx, _) = watch::channel(initial);

        Ok(Self {
            engine,
            presenter,
            name: config.monitor.name.clone(),
            rundeck: config.rundeck.clone(),
            refresh_delay: Duration::from_secs(config.monitor.refresh_delay_sec),
            entries: outcome.entries,
            last_success: Some(now),
            last_error: None,
            ticks: 1,
            failed_ticks: 0,
            status_tx,
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.status_tx.subscribe()
    }

    pub fn state(&self) -> &MonitorState {
        self.engine.state()
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn refresh_delay(&self) -> Duration {
        self.refresh_delay
    }

    /// One steady-state tick. Returns `false` when the server was unreachable.
    pub async fn poll_once(&mut self) -> bool {
        self.ticks += 1;
        match self.engine.tick(false).await {
            Ok(outcome) => {
                if outcome.has_new() {
                    info!(
                        new_late = ?outcome.new_late_ids,
                        new_failed = ?outcome.new_failed_ids,
                        "new late or failed executions"
                    );
                }
                self.presenter.update_execution_list(&outcome.entries);
                self.presenter.update_icon(&outcome.state);
                self.entries = outcome.entries;
                self.last_success = Some(Utc::now());
                self.last_error = None;
                self.publish();
                true
            }
            Err(e) => {
                warn!(error = %e, "poll failed, marking monitor disconnected");
                self.failed_ticks += 1;
                self.engine.mark_disconnected();
                self.presenter.update_icon(self.engine.state());
                self.last_error = Some(e.to_string());
                self.publish();
                false
            }
        }
    }

    /// Clear the failure alert and the presenter's new-job markers.
    pub fn reset_alerts(&mut self) {
        info!("alerts reset");
        self.engine.reset_alerts();
        self.presenter.reset_alerts();
        self.presenter.update_icon(self.engine.state());
        self.publish();
    }

    /// Apply new limits and display settings. Known ids survive.
    pub fn reload(&mut self, config: &MonitorConfig) {
        if config.rundeck != self.rundeck {
            warn!("rundeck connection settings changed; restart the monitor to apply them");
        }
        self.engine.apply_settings(EngineSettings::from_config(config));
        self.refresh_delay = Duration::from_secs(config.monitor.refresh_delay_sec);
        self.name = config.monitor.name.clone();
        self.presenter.reload(config);
        info!(refresh_delay_sec = config.monitor.refresh_delay_sec, "configuration reloaded");
        self.publish();
    }

    fn publish(&self) {
        let state = *self.engine.state();
        self.status_tx.send_replace(StatusSnapshot {
            name: self.name.clone(),
            project: self.engine.settings().project.clone(),
            state,
            icon: state.icon(),
            entries: self.entries.clone(),
            last_success: self.last_success,
            last_error: self.last_error.clone(),
            ticks: self.ticks,
            failed_ticks: self.failed_ticks,
        });
    }

    /// Tick, wait, repeat until `cancel` fires.
    ///
    /// A fetch in flight is not interrupted; cancellation is observed while
    /// waiting for the next tick.
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>, cancel: CancellationToken) {
        info!(refresh_delay_sec = self.refresh_delay.as_secs(), "poll loop started");
        let mut commands_open = true;

        'ticks: loop {
            if cancel.is_cancelled() {
                break;
            }
            self.poll_once().await;

            let deadline = next_deadline(Instant::now(), self.refresh_delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break 'ticks,
                    _ = tokio::time::sleep_until(deadline) => break,
                    cmd = commands.recv(), if commands_open => match cmd {
                        Some(Command::ResetAlerts) => self.reset_alerts(),
                        Some(Command::Reload(config)) => {
                            self.reload(&config);
                            break;
                        }
                        None => {
                            debug!("command channel closed");
                            commands_open = false;
                        }
                    },
                }
            }
        }

        info!("poll loop stopped");
    }
}

/// `now + delay`, clamped to a far-future instant instead of overflowing.
fn next_deadline(now: Instant, delay: Duration) -> Instant {
    now.checked_add(delay)
        .unwrap_or_else(|| now + Duration::from_secs(FAR_FUTURE_SEC))
}

/// Roughly thirty years.
const FAR_FUTURE_SEC: u64 = 86_400 * 365 * 30;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
