//! Handle used by signal handlers and the control API.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, watch};
use tracing::info;

use crate::config::MonitorConfig;
use crate::monitor::poll::{Command, StatusSnapshot};

/// Cheap to clone; never touches engine state directly.
#[derive(Clone)]
pub struct MonitorHandle {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<StatusSnapshot>,
    config_path: PathBuf,
}

impl MonitorHandle {
    pub fn new(commands: mpsc::Sender<Command>, status: watch::Receiver<StatusSnapshot>, config_path: PathBuf) -> Self {
        Self {
            commands,
            status,
            config_path,
        }
    }

    /// Latest published status.
    pub fn status(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub async fn reset_alerts(&self) -> Result<()> {
        self.commands
            .send(Command::ResetAlerts)
            .await
            .map_err(|_| anyhow!("poll loop is not running"))
    }

    /// Re-read the configuration file and hand it to the poll loop. An
    /// invalid file is reported and the running configuration is kept.
    pub async fn reload_from_disk(&self) -> Result<()> {
        let config = MonitorConfig::load(&self.config_path)?;
        info!(path = %self.config_path.display(), "configuration reload requested");
        self.commands
            .send(Command::Reload(Box::new(config)))
            .await
            .map_err(|_| anyhow!("poll loop is not running"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::state::{IconState, MonitorState};

    fn snapshot() -> StatusSnapshot {
        StatusSnapshot {
            name: "Rundeck Monitor".to_string(),
            project: "Ops".to_string(),
            state: MonitorState::new(),
            icon: IconState::Ok,
            entries: Vec::new(),
            last_success: None,
            last_error: None,
            ticks: 1,
            failed_ticks: 0,
        }
    }

    #[tokio::test]
    async fn test_reset_sends_command() {
        let (tx, mut rx) = mpsc::channel(1);
        let (_status_tx, status_rx) = watch::channel(snapshot());
        let handle = MonitorHandle::new(tx, status_rx, PathBuf::from("unused.toml"));

        handle.reset_alerts().await.unwrap();
        assert!(matches!(rx.recv().await, Some(Command::ResetAlerts)));
    }

    #[tokio::test]
    async fn test_reload_reads_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("rundeckMonitor.toml");
        std::fs::write(&path, "[monitor]\nfailed_job_number = 3\n").unwrap();

        let (tx, mut rx) = mpsc::channel(1);
        let (_status_tx, status_rx) = watch::channel(snapshot());
        let handle = MonitorHandle::new(tx, status_rx, path);

        handle.reload_from_disk().await.unwrap();
        match rx.recv().await {
            Some(Command::Reload(cfg)) => assert_eq!(cfg.monitor.failed_job_number, 3),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_reload_sends_nothing() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("rundeckMonitor.toml");
        std::fs::write(&path, "[monitor]\nfailed_job_number = 0\n").unwrap();

        let (tx, mut rx) = mpsc::channel(1);
        let (_status_tx, status_rx) = watch::channel(snapshot());
        let handle = MonitorHandle::new(tx, status_rx, path);

        assert!(handle.reload_from_disk().await.is_err());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_status_reads_latest() {
        let (tx, _rx) = mpsc::channel(1);
        let (status_tx, status_rx) = watch::channel(snapshot());
        let handle = MonitorHandle::new(tx, status_rx, PathBuf::new());

        let mut next = snapshot();
        next.ticks = 7;
        status_tx.send_replace(next);
        assert_eq!(handle.status().ticks, 7);
    }

    #[tokio::test]
    async fn test_closed_loop_is_error() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let (_status_tx, status_rx) = watch::channel(snapshot());
        let handle = MonitorHandle::new(tx, status_rx, PathBuf::new());
        assert!(handle.reset_alerts().await.is_err());
    }
}
