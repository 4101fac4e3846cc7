use std::time::Duration;
use tokio::time::Instant;

use crate::session::config::TimeoutConfig;
use crate::session::state::Phase;

/// Absolute deadlines of one session, derived from the last activity.
///
/// A clock is never edited field by field: every reset builds a new one, so
/// `warning_at < deadline_at` holds for the whole life of the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionClock {
    last_activity_at: Instant,
    warning_at: Instant,
    deadline_at: Instant,
}

impl SessionClock {
    /// Build the deadlines for a session whose last activity was `last_activity_at`
    pub fn starting_at(last_activity_at: Instant, timeouts: &TimeoutConfig) -> Self {
        Self {
            last_activity_at,
            warning_at: last_activity_at + timeouts.warning_offset(),
            deadline_at: last_activity_at + timeouts.inactivity_timeout(),
        }
    }

    pub fn last_activity_at(&self) -> Instant {
        self.last_activity_at
    }

    pub fn warning_at(&self) -> Instant {
        self.warning_at
    }

    pub fn deadline_at(&self) -> Instant {
        self.deadline_at
    }

    /// Phase implied by the deadlines alone
    pub fn phase_at(&self, now: Instant) -> Phase {
        if now >= self.deadline_at {
            Phase::Expired
        } else if now >= self.warning_at {
            Phase::Warning
        } else {
            Phase::Active
        }
    }

    /// Time left until the hard deadline
    pub fn remaining(&self, now: Instant) -> Duration {
        self.deadline_at.saturating_duration_since(now)
    }

    /// Whole seconds until the hard deadline, recomputed from the absolute
    /// deadline so skipped ticks never accumulate drift
    pub fn remaining_seconds(&self, now: Instant) -> u64 {
        round_secs(self.remaining(now))
    }
}

/// Round a duration to the nearest whole second
pub fn round_secs(duration: Duration) -> u64 {
    duration.as_secs_f64().round() as u64
}

/// Format seconds as `M:SS`
pub fn format_mmss(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_deadlines_follow_last_activity() {
        let t0 = Instant::now();
        let clock = SessionClock::starting_at(t0, &TimeoutConfig::default());

        assert_eq!(clock.last_activity_at(), t0);
        assert_eq!(clock.warning_at(), t0 + secs(240));
        assert_eq!(clock.deadline_at(), t0 + secs(300));
        assert!(clock.warning_at() < clock.deadline_at());
    }

    #[test]
    fn test_phase_boundaries() {
        let t0 = Instant::now();
        let clock = SessionClock::starting_at(t0, &TimeoutConfig::default());

        assert_eq!(clock.phase_at(t0), Phase::Active);
        assert_eq!(clock.phase_at(t0 + secs(239)), Phase::Active);
        assert_eq!(clock.phase_at(t0 + secs(240)), Phase::Warning);
        assert_eq!(clock.phase_at(t0 + secs(299)), Phase::Warning);
        assert_eq!(clock.phase_at(t0 + secs(300)), Phase::Expired);
    }

    #[test]
    fn test_remaining_seconds_rounds_and_saturates() {
        let t0 = Instant::now();
        let clock = SessionClock::starting_at(t0, &TimeoutConfig::default());

        assert_eq!(clock.remaining_seconds(t0), 300);
        assert_eq!(clock.remaining_seconds(t0 + Duration::from_millis(400)), 300);
        assert_eq!(clock.remaining_seconds(t0 + Duration::from_millis(1600)), 298);
        assert_eq!(clock.remaining_seconds(t0 + secs(301)), 0);
    }

    #[test]
    fn test_format_mmss() {
        assert_eq!(format_mmss(0), "0:00");
        assert_eq!(format_mmss(9), "0:09");
        assert_eq!(format_mmss(60), "1:00");
        assert_eq!(format_mmss(299), "4:59");
        assert_eq!(format_mmss(3600), "60:00");
    }

    #[test]
    fn test_skipped_ticks_do_not_drift() {
        let t0 = Instant::now();
        let clock = SessionClock::starting_at(t0, &TimeoutConfig::default());

        // A throttled tab may only observe the clock every 37 seconds
        assert_eq!(clock.remaining_seconds(t0 + secs(37)), 263);
        assert_eq!(clock.remaining_seconds(t0 + secs(74)), 226);
    }
}
