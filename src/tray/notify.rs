//! One-shot desktop popups.

/// Severity of a popup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Warning,
    Error,
}

impl NotificationKind {
    /// Freedesktop icon name shown next to the popup.
    pub fn icon_name(self) -> &'static str {
        match self {
            NotificationKind::Warning => "dialog-warning",
            NotificationKind::Error => "dialog-error",
        }
    }

    /// Error popups stay until dismissed.
    pub fn timeout(self) -> notify_rust::Timeout {
        match self {
            NotificationKind::Warning => notify_rust::Timeout::Default,
            NotificationKind::Error => notify_rust::Timeout::Never,
        }
    }
}

pub trait Notifier: Send + Sync {
    /// Fire-and-forget; delivery failures are logged, never returned.
    fn notify(&self, kind: NotificationKind, title: &str, body: &str);
}

/// Popups through the OS notification service (notify-rust).
#[derive(Clone, Copy, Debug, Default)]
pub struct DesktopNotifier;

impl DesktopNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&self, kind: NotificationKind, title: &str, body: &str) {
        let title = title.to_string();
        let body = body.to_string();
        let show = move || {
            tracing::info!(?kind, %title, %body, "sending desktop notification");
            let shown = notify_rust::Notification::new()
                .summary(&title)
                .body(&body)
                .icon(kind.icon_name())
                .timeout(kind.timeout())
                .show();
            if let Err(e) = shown {
                tracing::warn!(%title, error = %e, "desktop notification failed");
            }
        };
        // `show()` can block on the session bus; keep it off the runtime threads.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(show);
            }
            Err(_) => show(),
        }
    }
}


#[cfg(test)]
pub use fake::{Notification, RecordingNotifier};
