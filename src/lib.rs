//! RundeckMonitor -- tray-style monitor for failed and late Rundeck executions.
//!
//! This crate provides the Rundeck REST client, the polling/reconciliation
//! engine, the tray presenter and a small local control API.

pub mod api;
pub mod client;
pub mod config;
pub mod monitor;
pub mod tray;

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::client::RundeckClient;
use crate::config::MonitorConfig;
use crate::monitor::{EngineSettings, ExecutionRecord, IconState, Monitor, MonitorHandle, MonitorState, ReconciliationEngine};
use crate::tray::{DesktopNotifier, TrayPresenter};

/// Start the monitor: initial poll, poll loop, control API and signal handlers.
/// Returns when the process is asked to stop.
pub async fn run(config_path: Option<&Path>) -> Result<()> {
    // 1. Configuration (fatal if missing or invalid)
    let (path, config) = MonitorConfig::load_resolved(config_path)?;

    // 2. Collaborators
    let client = RundeckClient::new(&config.rundeck).context("failed to build Rundeck client")?;
    let presenter = TrayPresenter::new(DesktopNotifier::new(), &config);

    // 3. Initial poll (fatal on failure)
    let monitor = Monitor::start(client, presenter, &config).await?;
    let status = monitor.subscribe();

    // 4. Poll loop (background task)
    let (commands_tx, commands_rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let poll = tokio::spawn(monitor.run(commands_rx, cancel.clone()));

    let handle = MonitorHandle::new(commands_tx, status, path);

    // 5. Control API
    if config.api.enabled {
        let addr: std::net::SocketAddr = config
            .api
            .bind
            .parse()
            .with_context(|| format!("invalid api.bind address '{}'", config.api.bind))?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind control API on {}", addr))?;
        let app = api::router(api::state::AppState { monitor: handle.clone() });
        let api_cancel = cancel.clone();
        tracing::info!(%addr, "control API listening");
        tokio::spawn(async move {
            let shutdown = async move { api_cancel.cancelled().await };
            if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
                tracing::error!(error = %e, "control API stopped");
            }
        });
    }

    // 6. Signals
    spawn_control_signals(handle, cancel.clone())?;
    shutdown_signal().await;

    tracing::info!("shutting down");
    cancel.cancel();
    poll.await.context("poll loop panicked")?;
    Ok(())
}

/// Result of a one-shot `check`.
#[derive(Debug, Serialize)]
pub struct CheckReport {
    pub project: String,
    pub state: MonitorState,
    pub icon: IconState,
    pub entries: Vec<ExecutionRecord>,
}

/// Poll the server once, silently, and report what the monitor would show.
pub async fn check(config_path: Option<&Path>) -> Result<CheckReport> {
    let (_, config) = MonitorConfig::load_resolved(config_path)?;
    let client = RundeckClient::new(&config.rundeck).context("failed to build Rundeck client")?;
    let mut engine = ReconciliationEngine::new(client, EngineSettings::from_config(&config));

    let outcome = engine
        .tick(true)
        .await
        .with_context(|| format!("failed to poll project '{}'", config.rundeck.project))?;

    Ok(CheckReport {
        project: config.rundeck.project,
        state: outcome.state,
        icon: outcome.state.icon(),
        entries: outcome.entries,
    })
}

/// SIGHUP reloads the configuration file, SIGUSR1 resets alerts.
#[cfg(unix)]
fn spawn_control_signals(handle: MonitorHandle, cancel: CancellationToken) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("failed to install SIGHUP handler")?;
    let mut user1 = signal(SignalKind::user_defined1()).context("failed to install SIGUSR1 handler")?;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(()) = hangup.recv() => {
                    if let Err(e) = handle.reload_from_disk().await {
                        let reason = format!("{:#}", e);
                        tracing::warn!(error = %reason, "configuration reload rejected");
                    }
                }
                Some(()) = user1.recv() => {
                    if let Err(e) = handle.reset_alerts().await {
                        tracing::warn!(error = %e, "alert reset failed");
                    }
                }
            }
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn spawn_control_signals(_handle: MonitorHandle, _cancel: CancellationToken) -> Result<()> {
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
