//! Tray presenter: icon state, fixed-size job menu and popups.
//!
//! The menu has exactly `failed_job_number` job slots. Each tick replaces
//! their content with the head of the reconciled list; entries past the last
//! slot are not displayed but still raise their popup. A slot is highlighted
//! while its execution id is marked as newly flagged; an alert reset clears
//! the marks.

use std::collections::HashSet;

use chrono::format::{Item, StrftimeItems};
use chrono::Local;
use serde::Serialize;
use tracing::{debug, info};

use super::notify::{NotificationKind, Notifier};
use super::PresentationLayer;
use crate::config::{JobTab, MonitorConfig};
use crate::monitor::{ExecutionRecord, IconState, MonitorState};

const LONG_EXECUTION_MARKER: &str = " - LONG EXECUTION";
const NEW_FAILED_JOB_ALERT: &str = "New failed job";
const NEW_LONG_EXECUTION_ALERT: &str = "New long execution";
const FALLBACK_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One populated job entry of the menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuSlot {
    pub execution_id: i64,
    pub label: String,
    /// Execution page opened when the entry is clicked.
    pub url: String,
    pub is_long_running: bool,
    pub highlighted: bool,
}

pub struct TrayPresenter<N> {
    notifier: N,
    base_url: String,
    tooltip: String,
    date_format: String,
    job_tab: JobTab,
    slots: Vec<Option<MenuSlot>>,
    marked_late: HashSet<i64>,
    marked_failed: HashSet<i64>,
    icon: IconState,
}

impl<N: Notifier> TrayPresenter<N> {
    pub fn new(notifier: N, config: &MonitorConfig) -> Self {
        let mut presenter = Self {
            notifier,
            base_url: String::new(),
            tooltip: String::new(),
            date_format: String::new(),
            job_tab: JobTab::default(),
            slots: Vec::new(),
            marked_late: HashSet::new(),
            marked_failed: HashSet::new(),
            icon: IconState::Ok,
        };
        presenter.apply_config(config);
        presenter
    }

    fn apply_config(&mut self, config: &MonitorConfig) {
        self.base_url = config.rundeck.url.trim_end_matches('/').to_string();
        self.tooltip = config.monitor.name.clone();
        self.date_format = usable_date_format(&config.monitor.date_format);
        self.job_tab = config.monitor.job_tab_redirection;
        self.slots = vec![None; config.monitor.failed_job_number];
    }

    pub fn icon(&self) -> IconState {
        self.icon
    }

    pub fn tooltip(&self) -> &str {
        &self.tooltip
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn slots(&self) -> &[Option<MenuSlot>] {
        &self.slots
    }

    /// Text shown for an entry, without the long-execution marker.
    pub fn message(&self, record: &ExecutionRecord) -> String {
        format_message(record, &self.date_format)
    }

    /// Execution page of `record`. Long executions always open the summary.
    pub fn execution_url(&self, record: &ExecutionRecord) -> String {
        let tab = if record.is_long_running {
            JobTab::Summary
        } else {
            self.job_tab
        };
        format!(
            "{}/execution/{}/{}{}",
            self.base_url,
            tab.url_prefix(),
            record.execution_id,
            tab.url_suffix()
        )
    }

    fn is_marked(&self, record: &ExecutionRecord) -> bool {
        self.marked_failed.contains(&record.execution_id) || self.marked_late.contains(&record.execution_id)
    }

    fn alert(&mut self, record: &ExecutionRecord, message: &str) {
        if record.is_long_running {
            self.notifier
                .notify(NotificationKind::Warning, NEW_LONG_EXECUTION_ALERT, message);
            self.marked_late.insert(record.execution_id);
        } else {
            self.notifier.notify(NotificationKind::Error, NEW_FAILED_JOB_ALERT, message);
            self.marked_failed.insert(record.execution_id);
        }
    }
}

impl<N: Notifier> PresentationLayer for TrayPresenter<N> {
    fn update_execution_list(&mut self, entries: &[ExecutionRecord]) {
        for record in entries.iter().filter(|r| r.is_new) {
            let message = self.message(record);
            self.alert(record, &message);
        }

        let capacity = self.slots.len();
        let mut slots = Vec::with_capacity(capacity);
        for record in entries.iter().take(capacity) {
            let message = self.message(record);
            let label = if record.is_long_running {
                format!("{message}{LONG_EXECUTION_MARKER}")
            } else {
                message
            };
            slots.push(Some(MenuSlot {
                execution_id: record.execution_id,
                label,
                url: self.execution_url(record),
                is_long_running: record.is_long_running,
                highlighted: self.is_marked(record),
            }));
        }
        slots.resize(capacity, None);
        self.slots = slots;

        debug!(
            displayed = entries.len().min(capacity),
            hidden = entries.len().saturating_sub(capacity),
            "job menu updated"
        );
    }

    fn update_icon(&mut self, state: &MonitorState) {
        let icon = state.icon();
        if icon != self.icon {
            info!(from = %self.icon, to = %icon, tooltip = %self.tooltip, "tray icon changed");
            self.icon = icon;
        }
    }

    fn reset_alerts(&mut self) {
        self.marked_late.clear();
        self.marked_failed.clear();
        for slot in self.slots.iter_mut().flatten() {
            slot.highlighted = false;
        }
    }

    fn reload(&mut self, config: &MonitorConfig) {
        self.apply_config(config);
        self.marked_late.clear();
        self.marked_failed.clear();
        info!(slots = self.slots.len(), tooltip = %self.tooltip, "job menu rebuilt");
    }
}

/// `"{start date}: {description}"` with `date_format` applied in local time.
pub fn format_message(record: &ExecutionRecord, date_format: &str) -> String {
    let started = record.started_at.with_timezone(&Local).format(date_format);
    format!("{}: {}", started, record.description)
}

/// chrono panics when displaying an invalid pattern, so fall back early.
fn usable_date_format(pattern: &str) -> String {
    if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
        FALLBACK_DATE_FORMAT.to_string()
    } else {
        pattern.to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
