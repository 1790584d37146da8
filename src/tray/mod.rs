//! Presentation boundary: icon, job menu and popups.

pub mod menu;
pub mod notify;

pub use self::menu::{MenuSlot, TrayPresenter};
pub use self::notify::{DesktopNotifier, NotificationKind, Notifier};

use crate::config::MonitorConfig;
use crate::monitor::{ExecutionRecord, MonitorState};

/// Project page opened by the "About" entry.
pub const ABOUT_URL: &str = "https://github.com/Sylvain-Bugat/RundeckMonitor";

/// What the poll loop drives after each tick.
pub trait PresentationLayer: Send {
    /// Replace the displayed list and pop up every entry flagged new.
    fn update_execution_list(&mut self, entries: &[ExecutionRecord]);

    /// Refresh the indicator from the current flags.
    fn update_icon(&mut self, state: &MonitorState);

    /// Drop the "newly flagged" markers.
    fn reset_alerts(&mut self);

    /// Resize fixed-capacity structures and pick up display settings.
    fn reload(&mut self, config: &MonitorConfig);
}
