use chrono::{DateTime, Utc};
use tokio::time::Instant;
use uuid::Uuid;

use crate::session::clock::{SessionClock, round_secs};
use crate::session::config::TimeoutConfig;
use crate::session::state::{ExpiryCause, Phase, SessionState, StartMode};

/// A phase change produced by the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Active -> Warning
    EnteredWarning,
    /// The clock was rebuilt from a reset or activity
    Extended { from: Phase },
    /// Terminal transition; emitted once per machine
    Expired(ExpiryCause),
}

/// Inactivity state machine.
///
/// Owns the session clock and decides phase transitions. It never schedules
/// anything itself: the timer coordinator and the supervisor feed it `now`.
#[derive(Debug, Clone)]
pub struct SessionMachine {
    timeouts: TimeoutConfig,
    session_id: Uuid,
    start_mode: StartMode,
    clock: SessionClock,
    phase: Phase,
    warning_started_at: Option<Instant>,
    expiry_cause: Option<ExpiryCause>,
    anchor_instant: Instant,
    anchor_wall: DateTime<Utc>,
}

impl SessionMachine {
    /// Create a machine in the Active phase with a full countdown
    pub fn new(timeouts: TimeoutConfig, start_mode: StartMode, now: Instant) -> Self {
        Self {
            timeouts,
            session_id: Uuid::new_v4(),
            start_mode,
            clock: SessionClock::starting_at(now, &timeouts),
            phase: Phase::Active,
            warning_started_at: None,
            expiry_cause: None,
            anchor_instant: now,
            anchor_wall: Utc::now(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn start_mode(&self) -> StartMode {
        self.start_mode
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn clock(&self) -> &SessionClock {
        &self.clock
    }

    pub fn timeouts(&self) -> &TimeoutConfig {
        &self.timeouts
    }

    pub fn expiry_cause(&self) -> Option<ExpiryCause> {
        self.expiry_cause
    }

    pub fn is_expired(&self) -> bool {
        self.phase == Phase::Expired
    }

    /// Rebuild the clock from `now` and return to Active.
    ///
    /// This is the only way a session is extended. Has no effect once expired.
    pub fn reset(&mut self, now: Instant) -> Option<Transition> {
        if self.is_expired() {
            return None;
        }

        let from = self.phase;
        self.clock = SessionClock::starting_at(now, &self.timeouts);
        self.phase = Phase::Active;
        self.warning_started_at = None;

        Some(Transition::Extended { from })
    }

    /// Record user activity observed at `at`.
    ///
    /// Activity older than the current clock anchor is ignored.
    pub fn record_activity(&mut self, at: Instant) -> Option<Transition> {
        if at <= self.clock.last_activity_at() {
            return None;
        }
        self.reset(at)
    }

    /// Enter the Warning phase (warning-trigger timer fired)
    pub fn begin_warning(&mut self, now: Instant) -> Option<Transition> {
        if self.phase != Phase::Active || now < self.clock.warning_at() {
            return None;
        }

        self.phase = Phase::Warning;
        self.warning_started_at = Some(now);
        Some(Transition::EnteredWarning)
    }

    /// Re-evaluate the session at `now` (countdown interval fired).
    ///
    /// Reaching zero on either countdown expires the session; a missed
    /// warning trigger is caught up here as well.
    pub fn tick(&mut self, now: Instant) -> Option<Transition> {
        match self.phase {
            Phase::Expired => None,
            _ if self.clock.remaining_seconds(now) == 0 => {
                self.force_expire(ExpiryCause::CountdownElapsed)
            }
            Phase::Warning if self.warning_remaining_seconds(now) == 0 => {
                self.force_expire(ExpiryCause::WarningElapsed)
            }
            Phase::Active if now >= self.clock.warning_at() => self.begin_warning(now),
            _ => None,
        }
    }

    /// Move to Expired regardless of the clock.
    ///
    /// Returns the transition only the first time; later calls are no-ops.
    pub fn force_expire(&mut self, cause: ExpiryCause) -> Option<Transition> {
        if self.is_expired() {
            return None;
        }

        self.phase = Phase::Expired;
        self.warning_started_at = None;
        self.expiry_cause = Some(cause);
        Some(Transition::Expired(cause))
    }

    /// Seconds left on the warning countdown; zero outside Warning.
    ///
    /// Never exceeds the time left until the hard deadline, even when the
    /// warning was raised late.
    pub fn warning_remaining_seconds(&self, now: Instant) -> u64 {
        match (self.phase, self.warning_started_at) {
            (Phase::Warning, Some(started)) => {
                let ends_at = (started + self.timeouts.warning_lead()).min(self.clock.deadline_at());
                round_secs(ends_at.saturating_duration_since(now))
            }
            _ => 0,
        }
    }

    /// Host-visible state at `now`
    pub fn snapshot(&self, now: Instant, is_active: bool) -> SessionState {
        let expired = self.is_expired();

        SessionState {
            session_id: self.session_id,
            phase: self.phase,
            show_warning: self.phase == Phase::Warning,
            remaining_seconds: if expired { 0 } else { self.clock.remaining_seconds(now) },
            remaining_time_ms: if expired {
                0
            } else {
                self.clock.remaining(now).as_millis() as u64
            },
            warning_remaining_seconds: self.warning_remaining_seconds(now),
            is_active,
            last_activity: self.wall_time(self.clock.last_activity_at()),
            started_at: self.anchor_wall,
            start_mode: self.start_mode,
            expiry_cause: self.expiry_cause,
        }
    }

    fn wall_time(&self, at: Instant) -> DateTime<Utc> {
        let offset = at.saturating_duration_since(self.anchor_instant);
        chrono::Duration::from_std(offset)
            .map(|offset| self.anchor_wall + offset)
            .unwrap_or(self.anchor_wall)
    }
}
