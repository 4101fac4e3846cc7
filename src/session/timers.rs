use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

use crate::session::clock::SessionClock;

/// The four timers owned by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Fires once at `warning_at`
    WarningTrigger,
    /// Fires once at `deadline_at`
    HardLogout,
    /// Ticks every interval from the last activity
    Countdown,
    /// Ticks every interval once the warning is raised
    WarningCountdown,
}

/// Message sent by a timer task.
///
/// `generation` identifies the clock the timer was scheduled for; messages
/// from an older generation may still be queued after a reset and must be
/// dropped by the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub generation: u64,
    pub kind: TimerKind,
    pub at: Instant,
}

/// Owns the session timers and keeps them consistent with one clock
pub struct TimerCoordinator<M> {
    tx: mpsc::UnboundedSender<M>,
    tick_interval: Duration,
    generation: u64,
    warning_trigger: Option<JoinHandle<()>>,
    hard_logout: Option<JoinHandle<()>>,
    countdown: Option<JoinHandle<()>>,
    warning_countdown: Option<JoinHandle<()>>,
}

impl<M> TimerCoordinator<M>
where
    M: From<TimerFired> + Send + 'static,
{
    pub fn new(tx: mpsc::UnboundedSender<M>, tick_interval: Duration) -> Self {
        Self {
            tx,
            tick_interval,
            generation: 0,
            warning_trigger: None,
            hard_logout: None,
            countdown: None,
            warning_countdown: None,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Cancel every timer, then schedule the warning trigger, the hard
    /// logout and the real-time countdown for `clock`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn reset(&mut self, clock: &SessionClock) -> u64 {
        self.cancel_all();
        self.generation += 1;

        self.warning_trigger = Some(self.spawn_deadline(TimerKind::WarningTrigger, clock.warning_at()));
        self.hard_logout = Some(self.spawn_deadline(TimerKind::HardLogout, clock.deadline_at()));
        self.countdown = Some(self.spawn_interval(TimerKind::Countdown, clock.last_activity_at()));

        debug!("Timers scheduled (generation {})", self.generation);
        self.generation
    }

    /// Start the warning countdown, replacing any running one
    pub fn start_warning_countdown(&mut self, started_at: Instant) {
        if let Some(handle) = self.warning_countdown.take() {
            handle.abort();
        }
        self.warning_countdown = Some(self.spawn_interval(TimerKind::WarningCountdown, started_at));
    }

    /// Abort all timers. Safe to call when none are running.
    pub fn cancel_all(&mut self) -> usize {
        let mut cancelled = 0;
        for slot in [
            &mut self.warning_trigger,
            &mut self.hard_logout,
            &mut self.countdown,
            &mut self.warning_countdown,
        ] {
            if let Some(handle) = slot.take() {
                if !handle.is_finished() {
                    cancelled += 1;
                }
                handle.abort();
            }
        }
        cancelled
    }

    /// Whether a message belongs to the current schedule
    pub fn is_current(&self, fired: &TimerFired) -> bool {
        fired.generation == self.generation
    }

    /// Number of timers that have not yet completed
    pub fn active_timers(&self) -> usize {
        [
            &self.warning_trigger,
            &self.hard_logout,
            &self.countdown,
            &self.warning_countdown,
        ]
        .into_iter()
        .flatten()
        .filter(|handle| !handle.is_finished())
        .count()
    }

    fn spawn_deadline(&self, kind: TimerKind, at: Instant) -> JoinHandle<()> {
        let tx = self.tx.clone();
        let generation = self.generation;

        tokio::spawn(async move {
            time::sleep_until(at).await;
            // The receiver may already be gone after teardown
            let _ = tx.send(M::from(TimerFired {
                generation,
                kind,
                at: Instant::now(),
            }));
        })
    }

    fn spawn_interval(&self, kind: TimerKind, start: Instant) -> JoinHandle<()> {
        let tx = self.tx.clone();
        let generation = self.generation;
        let period = self.tick_interval;

        tokio::spawn(async move {
            let mut interval = time::interval_at(start + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                let at = interval.tick().await;
                if tx.send(M::from(TimerFired { generation, kind, at })).is_err() {
                    break;
                }
            }
        })
    }
}

impl<M> Drop for TimerCoordinator<M> {
    fn drop(&mut self) {
        for handle in [
            self.warning_trigger.take(),
            self.hard_logout.take(),
            self.countdown.take(),
            self.warning_countdown.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::config::TimeoutConfig;

    fn coordinator() -> (TimerCoordinator<TimerFired>, mpsc::UnboundedReceiver<TimerFired>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (TimerCoordinator::new(tx, Duration::from_secs(1)), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<TimerFired>) -> Vec<TimerFired> {
        let mut fired = Vec::new();
        while let Ok(message) = rx.try_recv() {
            fired.push(message);
        }
        fired
    }

    fn count(fired: &[TimerFired], kind: TimerKind) -> usize {
        fired.iter().filter(|f| f.kind == kind).count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_schedules_three_timers() {
        let (mut timers, mut rx) = coordinator();
        let clock = SessionClock::starting_at(Instant::now(), &TimeoutConfig::default());

        assert_eq!(timers.reset(&clock), 1);
        tokio::task::yield_now().await;
        assert_eq!(timers.active_timers(), 3);

        time::sleep(Duration::from_millis(240_500)).await;
        let fired = drain(&mut rx);
        assert_eq!(count(&fired, TimerKind::WarningTrigger), 1);
        assert_eq!(count(&fired, TimerKind::HardLogout), 0);
        assert_eq!(count(&fired, TimerKind::Countdown), 240);
        assert!(fired.iter().all(|f| f.generation == 1));

        time::sleep(Duration::from_secs(60)).await;
        let fired = drain(&mut rx);
        assert_eq!(count(&fired, TimerKind::HardLogout), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_cancels_previous_schedule() {
        let (mut timers, mut rx) = coordinator();
        let timeouts = TimeoutConfig::default();

        timers.reset(&SessionClock::starting_at(Instant::now(), &timeouts));
        time::sleep(Duration::from_millis(100_500)).await;
        drain(&mut rx);

        let generation = timers.reset(&SessionClock::starting_at(Instant::now(), &timeouts));
        assert_eq!(generation, 2);

        // Past the first schedule's deadlines but before the second's
        time::sleep(Duration::from_secs(200)).await;
        let fired = drain(&mut rx);
        assert_eq!(count(&fired, TimerKind::WarningTrigger), 0);
        assert_eq!(count(&fired, TimerKind::HardLogout), 0);
        assert!(fired.iter().all(|f| timers.is_current(f)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_warning_countdown_is_cancelled_by_reset() {
        let (mut timers, mut rx) = coordinator();
        let timeouts = TimeoutConfig::default();
        timers.reset(&SessionClock::starting_at(Instant::now(), &timeouts));

        timers.start_warning_countdown(Instant::now());
        time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(count(&drain(&mut rx), TimerKind::WarningCountdown), 3);

        timers.reset(&SessionClock::starting_at(Instant::now(), &timeouts));
        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count(&drain(&mut rx), TimerKind::WarningCountdown), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_is_idempotent() {
        let (mut timers, mut rx) = coordinator();
        assert_eq!(timers.cancel_all(), 0);

        timers.reset(&SessionClock::starting_at(Instant::now(), &TimeoutConfig::default()));
        tokio::task::yield_now().await;
        assert_eq!(timers.cancel_all(), 3);
        assert_eq!(timers.cancel_all(), 0);

        time::sleep(Duration::from_secs(400)).await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_aborts_timers() {
        let (mut timers, mut rx) = coordinator();
        timers.reset(&SessionClock::starting_at(Instant::now(), &TimeoutConfig::default()));
        drop(timers);

        time::sleep(Duration::from_secs(400)).await;
        assert!(drain(&mut rx).is_empty());
    }
}
