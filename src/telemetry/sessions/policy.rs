//! Session policy: end state and lifecycle.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome reported when a session ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EndState {
    Success,
    Fail,
    #[default]
    Indeterminate,
}

impl EndState {
    pub fn as_str(self) -> &'static str {
        match self {
            EndState::Success => "Success",
            EndState::Fail => "Fail",
            EndState::Indeterminate => "Indeterminate",
        }
    }
}

impl fmt::Display for EndState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `Pending -> Active -> Ending -> Ended`. Only `Active` sessions record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionLifecycle {
    Pending,
    Active,
    Ending,
    Ended,
}

impl SessionLifecycle {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionLifecycle::Pending => "pending",
            SessionLifecycle::Active => "active",
            SessionLifecycle::Ending => "ending",
            SessionLifecycle::Ended => "ended",
        }
    }

    pub fn accepts_events(self) -> bool {
        self == SessionLifecycle::Active
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionLifecycle::Ending | SessionLifecycle::Ended)
    }
}
