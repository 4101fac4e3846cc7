use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Position of a session in its lifecycle
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Active,
    Warning,
    /// Terminal: the logout callback has been invoked
    Expired,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Active => write!(f, "active"),
            Phase::Warning => write!(f, "warning"),
            Phase::Expired => write!(f, "expired"),
        }
    }
}

/// What drove a session into the Expired phase
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryCause {
    /// The hard-logout timer fired
    HardDeadline,
    /// The real-time countdown reached zero
    CountdownElapsed,
    /// The warning countdown reached zero
    WarningElapsed,
    /// The user chose "Logout Now"
    UserLogout,
}

impl fmt::Display for ExpiryCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpiryCause::HardDeadline => write!(f, "inactivity deadline reached"),
            ExpiryCause::CountdownElapsed => write!(f, "session countdown elapsed"),
            ExpiryCause::WarningElapsed => write!(f, "warning countdown elapsed"),
            ExpiryCause::UserLogout => write!(f, "logged out by user"),
        }
    }
}

/// How the session was started.
///
/// Both modes initialize the timers identically from the start instant;
/// the mode is only reported to the host.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StartMode {
    /// New login
    #[default]
    Fresh,
    /// Same session after a page reload; timers are re-initialized
    Resume,
}

impl StartMode {
    /// Map the host's "was this a refresh" flag
    pub fn from_refresh_flag(is_refresh: bool) -> Self {
        if is_refresh { StartMode::Resume } else { StartMode::Fresh }
    }
}

/// Host-visible session state, recomputed on every tick
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct SessionState {
    pub session_id: Uuid,
    pub phase: Phase,
    /// Controls the warning modal
    pub show_warning: bool,
    /// Always-visible badge countdown
    pub remaining_seconds: u64,
    /// Milliseconds until the hard deadline
    pub remaining_time_ms: u64,
    /// Modal countdown; zero outside the Warning phase
    pub warning_remaining_seconds: u64,
    /// Transient activity-burst indicator
    pub is_active: bool,
    pub last_activity: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub start_mode: StartMode,
    pub expiry_cause: Option<ExpiryCause>,
}

impl SessionState {
    /// Seconds shown in the warning modal
    pub fn time_left(&self) -> u64 {
        self.warning_remaining_seconds
    }

    pub fn is_expired(&self) -> bool {
        self.phase == Phase::Expired
    }
}

/// Summary returned when a supervised session finishes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Expired and the logout callback succeeded
    LoggedOut(ExpiryCause),
    /// Torn down by the host before expiring
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Phase::Warning).unwrap(), "\"warning\"");
        assert_eq!(Phase::Expired.to_string(), "expired");
    }

    #[test]
    fn test_start_mode_from_refresh_flag() {
        assert_eq!(StartMode::from_refresh_flag(true), StartMode::Resume);
        assert_eq!(StartMode::from_refresh_flag(false), StartMode::Fresh);
    }
}
