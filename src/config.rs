//! TOML configuration for the Rundeck monitor.
//!
//! A single file with four sections (`[rundeck]`, `[monitor]`, `[api]`,
//! `[logging]`). Every field has a compiled-in default so partial files are
//! accepted; [`MonitorConfig::validate`] rejects the combinations the poll
//! loop cannot run with.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Environment variable overriding the configuration file location.
pub const CONFIG_ENV_VAR: &str = "RUNDECK_MONITOR_CONFIG";

/// Configuration file looked up in the working directory by default.
pub const DEFAULT_CONFIG_FILE: &str = "rundeckMonitor.toml";

/// Upper bound for `monitor.refresh_delay_sec` (one day).
pub const MAX_REFRESH_DELAY_SEC: u64 = 24 * 60 * 60;

/// Upper bound for `monitor.late_threshold_sec` (one year).
pub const MAX_LATE_THRESHOLD_SEC: u64 = 365 * 24 * 60 * 60;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for the monitor process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub rundeck: RundeckConfig,
    #[serde(default)]
    pub monitor: DisplayConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl MonitorConfig {
    /// Load and validate configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config file: {}", path.display()))?;
        info!(path = %path.display(), project = %config.rundeck.project, "loaded monitor configuration");
        Ok(config)
    }

    /// Resolve which file to load: the explicit path, then the
    /// `RUNDECK_MONITOR_CONFIG` environment variable, then
    /// `rundeckMonitor.toml` in the working directory.
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(env_path) if !env_path.trim().is_empty() => PathBuf::from(env_path),
            _ => PathBuf::from(DEFAULT_CONFIG_FILE),
        }
    }

    /// Load the file at the resolved location. A missing file is reported
    /// with a hint to generate one.
    pub fn load_resolved(explicit: Option<&Path>) -> Result<(PathBuf, Self)> {
        let path = Self::resolve_path(explicit);
        if !path.exists() {
            bail!(
                "{} is missing: run `rundeckmonitor config init --output {}` and edit it",
                path.display(),
                path.display()
            );
        }
        let config = Self::load(&path)?;
        Ok((path, config))
    }

    /// Check the values the poll loop and presenter depend on.
    pub fn validate(&self) -> Result<()> {
        let url = self.rundeck.url.trim();
        if url.is_empty() {
            bail!("rundeck.url must not be empty");
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            bail!("rundeck.url must start with http:// or https:// (got '{}')", url);
        }
        if self.rundeck.project.trim().is_empty() {
            bail!("rundeck.project must not be empty");
        }
        if self.rundeck.api_token.is_none() && self.rundeck.login.trim().is_empty() {
            bail!("either rundeck.api_token or rundeck.login must be set");
        }
        if self.monitor.refresh_delay_sec == 0 {
            bail!("monitor.refresh_delay_sec must be greater than zero");
        }
        if self.monitor.refresh_delay_sec > MAX_REFRESH_DELAY_SEC {
            bail!(
                "monitor.refresh_delay_sec must be at most {} (got {})",
                MAX_REFRESH_DELAY_SEC,
                self.monitor.refresh_delay_sec
            );
        }
        if self.monitor.late_threshold_sec > MAX_LATE_THRESHOLD_SEC {
            bail!(
                "monitor.late_threshold_sec must be at most {} (got {})",
                MAX_LATE_THRESHOLD_SEC,
                self.monitor.late_threshold_sec
            );
        }
        if self.monitor.failed_job_number == 0 {
            bail!("monitor.failed_job_number must be greater than zero");
        }
        if StrftimeItems::new(&self.monitor.date_format).any(|item| matches!(item, Item::Error)) {
            bail!("monitor.date_format '{}' is not a valid strftime pattern", self.monitor.date_format);
        }
        Ok(())
    }

    /// Render the configuration as TOML with credentials masked.
    pub fn to_masked_toml(&self) -> Result<String> {
        let mut masked = self.clone();
        if !masked.rundeck.password.is_empty() {
            masked.rundeck.password = "********".to_string();
        }
        if masked.rundeck.api_token.is_some() {
            masked.rundeck.api_token = Some("********".to_string());
        }
        toml::to_string_pretty(&masked).context("failed to serialize configuration")
    }

    /// A commented starter file written by `config init`.
    pub fn sample_toml() -> Result<String> {
        let body = toml::to_string_pretty(&Self::default())
            .context("failed to serialize default configuration")?;
        let mut out = String::new();
        let _ = writeln!(out, "# Rundeck monitor configuration.");
        let _ = writeln!(out, "# Set rundeck.api_token to use token authentication instead of login/password.");
        let _ = writeln!(out, "# monitor.job_tab_redirection: summary | output | definition | download");
        out.push('\n');
        out.push_str(&body);
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Rundeck server
// ---------------------------------------------------------------------------

/// Connection settings for the Rundeck server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RundeckConfig {
    /// Base URL, e.g. `http://rundeck.local:4440`.
    pub url: String,
    pub login: String,
    pub password: String,
    /// API token; when set it replaces the login/password session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    /// REST API version used in request paths.
    pub api_version: u32,
    /// Project whose executions are monitored.
    pub project: String,
    /// Per-request timeout (seconds).
    pub request_timeout_sec: u64,
}

impl Default for RundeckConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:4440".to_string(),
            login: "admin".to_string(),
            password: "admin".to_string(),
            api_token: None,
            api_version: 14,
            project: "MyProject".to_string(),
            request_timeout_sec: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// Monitor behaviour
// ---------------------------------------------------------------------------

/// Polling cadence, thresholds and display settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Name shown as the tray tooltip.
    pub name: String,
    /// Delay between the end of a tick and the start of the next (seconds).
    pub refresh_delay_sec: u64,
    /// A running execution older than this is late (seconds).
    pub late_threshold_sec: u64,
    /// How many failure events are requested and how many menu slots exist.
    pub failed_job_number: usize,
    /// chrono strftime pattern for execution start dates.
    pub date_format: String,
    /// Execution page tab opened for failed jobs.
    pub job_tab_redirection: JobTab,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            name: "Rundeck Monitor".to_string(),
            refresh_delay_sec: 60,
            late_threshold_sec: 1800,
            failed_job_number: 10,
            date_format: "%d/%m/%Y %H:%M:%S".to_string(),
            job_tab_redirection: JobTab::Summary,
        }
    }
}

/// Tab of the Rundeck execution page a menu entry points at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobTab {
    #[default]
    Summary,
    Output,
    Definition,
    Download,
}

impl JobTab {
    /// Path segment placed between `/execution/` and the execution id.
    pub fn url_prefix(self) -> &'static str {
        match self {
            JobTab::Download => "downloadOutput",
            _ => "show",
        }
    }

    /// Fragment appended after the execution id.
    pub fn url_suffix(self) -> &'static str {
        match self {
            JobTab::Summary | JobTab::Download => "",
            JobTab::Output => "#output",
            JobTab::Definition => "#definition",
        }
    }
}

// ---------------------------------------------------------------------------
// Control API
// ---------------------------------------------------------------------------

/// Local HTTP control surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub bind: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: "127.0.0.1:8091".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level; `RUST_LOG` takes precedence.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
