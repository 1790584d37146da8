//! Aggregate alert flags and the icon derived from them.

use serde::{Deserialize, Serialize};

/// Three independent flags consumed by the presenter.
///
/// `late_jobs` is recomputed on every tick. `failed_jobs` is sticky and only
/// cleared by an alert reset (or the silent initial tick).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorState {
    disconnected: bool,
    late_jobs: bool,
    failed_jobs: bool,
}

impl MonitorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_disconnected(&mut self, disconnected: bool) {
        self.disconnected = disconnected;
    }

    pub fn set_late_jobs(&mut self, late_jobs: bool) {
        self.late_jobs = late_jobs;
    }

    pub fn set_failed_jobs(&mut self, failed_jobs: bool) {
        self.failed_jobs = failed_jobs;
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    pub fn has_late_jobs(&self) -> bool {
        self.late_jobs
    }

    pub fn has_failed_jobs(&self) -> bool {
        self.failed_jobs
    }

    /// Icon to display, highest priority first:
    /// disconnected > failed+late > failed > late > ok.
    pub fn icon(&self) -> IconState {
        if self.disconnected {
            IconState::Disconnected
        } else if self.failed_jobs && self.late_jobs {
            IconState::FailedAndLate
        } else if self.failed_jobs {
            IconState::Failed
        } else if self.late_jobs {
            IconState::Late
        } else {
            IconState::Ok
        }
    }
}

/// Visual indicator selected from a [`MonitorState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IconState {
    Ok,
    Late,
    Failed,
    FailedAndLate,
    Disconnected,
}

impl std::fmt::Display for IconState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IconState::Ok => write!(f, "OK"),
            IconState::Late => write!(f, "LATE"),
            IconState::Failed => write!(f, "KO"),
            IconState::FailedAndLate => write!(f, "KO_LATE"),
            IconState::Disconnected => write!(f, "DISCONNECTED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(disconnected: bool, failed: bool, late: bool) -> MonitorState {
        let mut s = MonitorState::new();
        s.set_disconnected(disconnected);
        s.set_failed_jobs(failed);
        s.set_late_jobs(late);
        s
    }

    #[test]
    fn test_new_state_is_nominal() {
        let s = MonitorState::new();
        assert!(!s.is_disconnected());
        assert!(!s.has_late_jobs());
        assert!(!s.has_failed_jobs());
        assert_eq!(s.icon(), IconState::Ok);
    }

    #[test]
    fn test_icon_priority() {
        assert_eq!(state(true, true, true).icon(), IconState::Disconnected);
        assert_eq!(state(true, false, false).icon(), IconState::Disconnected);
        assert_eq!(state(false, true, true).icon(), IconState::FailedAndLate);
        assert_eq!(state(false, true, false).icon(), IconState::Failed);
        assert_eq!(state(false, false, true).icon(), IconState::Late);
        assert_eq!(state(false, false, false).icon(), IconState::Ok);
    }

    #[test]
    fn test_icon_names() {
        assert_eq!(IconState::FailedAndLate.to_string(), "KO_LATE");
        assert_eq!(IconState::Disconnected.to_string(), "DISCONNECTED");
    }
}
