use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::session::clock::format_mmss;
use crate::session::config::{ActivityKind, SessionConfig};
use crate::session::machine::{SessionMachine, Transition};
use crate::session::monitor::{ActivityListener, ActivityMonitor, ActivitySignal};
use crate::session::notify::Notifier;
use crate::session::state::{ExpiryCause, Phase, SessionEnd, SessionState, StartMode};
use crate::session::timers::{TimerCoordinator, TimerFired, TimerKind};

/// Host-supplied logout callback.
///
/// Must clear the auth token and send the user to the login route. It is
/// invoked once per expired session but should tolerate repeated calls.
pub trait LogoutHandler: Send + Sync {
    fn logout(&self, cause: ExpiryCause) -> Result<()>;
}

impl<F> LogoutHandler for F
where
    F: Fn(ExpiryCause) -> Result<()> + Send + Sync,
{
    fn logout(&self, cause: ExpiryCause) -> Result<()> {
        self(cause)
    }
}

/// Anything that can extend a session the way passive activity does
pub trait SessionExtender {
    /// Returns false if the session is no longer running
    fn reset_session(&self) -> bool;
}

/// Commands the host can send to a running session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// Extend the session ("Stay Logged In", refresh, host activity)
    Extend,
    /// Log out immediately ("Logout Now")
    LogoutNow,
    /// Tear down without logging out
    Shutdown,
}

/// Everything the session loop reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionInput {
    Activity(ActivitySignal),
    Timer(TimerFired),
    Command(SessionCommand),
}

impl From<ActivitySignal> for SessionInput {
    fn from(signal: ActivitySignal) -> Self {
        SessionInput::Activity(signal)
    }
}

impl From<TimerFired> for SessionInput {
    fn from(fired: TimerFired) -> Self {
        SessionInput::Timer(fired)
    }
}

/// Start a supervised session.
///
/// Spawns the session loop on the current tokio runtime; the returned
/// handle is the host's only way to interact with it.
pub fn start_session(
    config: &SessionConfig,
    start_mode: StartMode,
    logout: Arc<dyn LogoutHandler>,
    notifier: Arc<dyn Notifier>,
) -> SessionHandle {
    let now = Instant::now();
    let (input_tx, input_rx) = mpsc::unbounded_channel();

    let machine = SessionMachine::new(config.timeouts, start_mode, now);
    let timers = TimerCoordinator::new(input_tx.clone(), config.timeouts.tick_interval());
    let mut monitor = ActivityMonitor::new(
        &config.activity.events,
        config.timeouts.activity_window(),
        input_tx.clone(),
    );
    monitor.start();
    let listeners = monitor.listeners();

    let (state_tx, state_rx) = watch::channel(machine.snapshot(now, false));

    let runner = SessionRunner {
        machine,
        timers,
        monitor,
        state_tx,
        input_rx,
        logout,
        notifier,
    };
    let task = tokio::spawn(runner.run());

    SessionHandle {
        input_tx,
        state_rx,
        listeners,
        task: Some(task),
    }
}

/// Host-side handle to a running session
pub struct SessionHandle {
    input_tx: mpsc::UnboundedSender<SessionInput>,
    state_rx: watch::Receiver<SessionState>,
    listeners: Vec<ActivityListener<SessionInput>>,
    task: Option<JoinHandle<Result<SessionEnd>>>,
}

impl SessionHandle {
    /// Extend the session exactly like passive activity would
    pub fn reset_session(&self) -> bool {
        self.send(SessionCommand::Extend)
    }

    /// Log out now, bypassing the timers
    pub fn logout_now(&self) -> bool {
        self.send(SessionCommand::LogoutNow)
    }

    /// Listener for an interaction category, if configured
    pub fn listener(&self, kind: ActivityKind) -> Option<ActivityListener<SessionInput>> {
        self.listeners.iter().find(|l| l.kind() == kind).cloned()
    }

    pub fn listeners(&self) -> &[ActivityListener<SessionInput>] {
        &self.listeners
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Latest published state
    pub fn state(&self) -> SessionState {
        self.state_rx.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|task| task.is_finished())
    }

    /// Tear the session down: cancel every timer and detach all listeners
    pub async fn stop(self) -> Result<SessionEnd> {
        self.send(SessionCommand::Shutdown);
        self.join().await
    }

    /// Wait for the session to end on its own
    pub async fn join(mut self) -> Result<SessionEnd> {
        match self.task.take() {
            Some(task) => task.await.context("Session task failed")?,
            None => Ok(SessionEnd::Stopped),
        }
    }

    fn send(&self, command: SessionCommand) -> bool {
        self.input_tx.send(SessionInput::Command(command)).is_ok()
    }
}

impl SessionExtender for SessionHandle {
    fn reset_session(&self) -> bool {
        SessionHandle::reset_session(self)
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// The session loop: sole owner of the machine, timers and monitor
struct SessionRunner {
    machine: SessionMachine,
    timers: TimerCoordinator<SessionInput>,
    monitor: ActivityMonitor<SessionInput>,
    state_tx: watch::Sender<SessionState>,
    input_rx: mpsc::UnboundedReceiver<SessionInput>,
    logout: Arc<dyn LogoutHandler>,
    notifier: Arc<dyn Notifier>,
}

impl SessionRunner {
    async fn run(mut self) -> Result<SessionEnd> {
        let session_id = self.machine.session_id();
        match self.machine.start_mode() {
            StartMode::Fresh => info!("Session {} started", session_id),
            StartMode::Resume => info!("Session {} resumed after reload", session_id),
        }

        self.timers.reset(self.machine.clock());
        self.publish(Instant::now());

        while let Some(input) = self.input_rx.recv().await {
            let now = Instant::now();

            let transition = match input {
                SessionInput::Activity(signal) => {
                    debug!("Activity: {:?}", signal.kind);
                    self.machine.record_activity(signal.at)
                }
                SessionInput::Timer(fired) => {
                    if !self.timers.is_current(&fired) {
                        debug!("Dropping stale {:?} timer (generation {})", fired.kind, fired.generation);
                        continue;
                    }
                    self.on_timer(fired.kind, now)
                }
                SessionInput::Command(SessionCommand::Extend) => {
                    debug!("Session extended by host");
                    self.machine.reset(now)
                }
                SessionInput::Command(SessionCommand::LogoutNow) => {
                    self.machine.force_expire(ExpiryCause::UserLogout)
                }
                SessionInput::Command(SessionCommand::Shutdown) => {
                    self.teardown();
                    return Ok(SessionEnd::Stopped);
                }
            };

            if let Some(transition) = transition {
                if let Some(end) = self.apply(transition, now)? {
                    return Ok(end);
                }
            }
            self.publish(now);
        }

        self.teardown();
        Ok(SessionEnd::Stopped)
    }

    fn on_timer(&mut self, kind: TimerKind, now: Instant) -> Option<Transition> {
        match kind {
            TimerKind::WarningTrigger => {
                // A burst still in progress is activity, not idleness
                let in_burst = self
                    .monitor
                    .is_active(now)
                    .then(|| self.monitor.last_event_at())
                    .flatten()
                    .and_then(|at| self.machine.record_activity(at));
                in_burst.or_else(|| self.machine.begin_warning(now))
            }
            TimerKind::HardLogout => self.machine.force_expire(ExpiryCause::HardDeadline),
            TimerKind::Countdown => self
                .monitor
                .settle(now)
                .and_then(|at| self.machine.record_activity(at))
                .or_else(|| self.machine.tick(now)),
            TimerKind::WarningCountdown => self.machine.tick(now),
        }
    }

    /// Carry out the side effects of a transition. Returns the session
    /// outcome once the session is over.
    fn apply(&mut self, transition: Transition, now: Instant) -> Result<Option<SessionEnd>> {
        match transition {
            Transition::Extended { from } => {
                self.timers.reset(self.machine.clock());
                if from == Phase::Warning {
                    info!("Session extended from warning");
                    self.notifier.success("Session extended");
                }
                Ok(None)
            }
            Transition::EnteredWarning => {
                self.timers.start_warning_countdown(now);
                let lead = self.machine.warning_remaining_seconds(now);
                info!("Session entering warning phase ({}s left)", lead);
                self.notifier.warning(&format!(
                    "Your session will expire in {} due to inactivity",
                    format_mmss(lead)
                ));
                Ok(None)
            }
            Transition::Expired(cause) => {
                self.timers.cancel_all();
                self.monitor.stop();
                self.publish(now);

                info!("Session expired: {}", cause);
                match cause {
                    ExpiryCause::UserLogout => self.notifier.success("You have been logged out"),
                    _ => self
                        .notifier
                        .error("Your session has expired due to inactivity. Please log in again."),
                }

                if let Err(e) = self.logout.logout(cause) {
                    error!("Logout handler failed: {:#}", e);
                    return Err(e.context("Logout handler failed"));
                }
                Ok(Some(SessionEnd::LoggedOut(cause)))
            }
        }
    }

    fn publish(&self, now: Instant) {
        let is_active = self.monitor.is_active(now);
        self.state_tx.send_replace(self.machine.snapshot(now, is_active));
    }

    fn teardown(&mut self) {
        let cancelled = self.timers.cancel_all();
        self.monitor.stop();
        info!(
            "Session {} stopped ({} timer(s) cancelled)",
            self.machine.session_id(),
            cancelled
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::notify::testing::{Level, RecordingNotifier};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::sleep;

    #[derive(Default)]
    struct CountingLogout {
        calls: AtomicUsize,
        causes: Mutex<Vec<ExpiryCause>>,
        fail: bool,
    }

    impl LogoutHandler for CountingLogout {
        fn logout(&self, cause: ExpiryCause) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.causes.lock().unwrap().push(cause);
            if self.fail {
                anyhow::bail!("token store unavailable");
            }
            Ok(())
        }
    }

    impl CountingLogout {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    struct Fixture {
        handle: SessionHandle,
        logout: Arc<CountingLogout>,
        notifier: Arc<RecordingNotifier>,
        started: Instant,
    }

    fn start(logout: CountingLogout) -> Fixture {
        let logout = Arc::new(logout);
        let notifier = Arc::new(RecordingNotifier::default());
        let started = Instant::now();
        let handle = start_session(
            &SessionConfig::default(),
            StartMode::Fresh,
            logout.clone(),
            notifier.clone(),
        );
        Fixture {
            handle,
            logout,
            notifier,
            started,
        }
    }

    /// Sleep until `millis` after session start (simulated time).
    ///
    /// Actions are taken on whole seconds and state is read on half seconds,
    /// so a read never races a countdown tick.
    async fn at(fixture: &Fixture, millis: u64) {
        tokio::time::sleep_until(fixture.started + Duration::from_millis(millis)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_state_is_active() {
        let fixture = start(CountingLogout::default());

        let state = fixture.handle.state();
        assert_eq!(state.phase, Phase::Active);
        assert_eq!(state.remaining_seconds, 300);
        assert!(!state.show_warning);
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_updates_every_second() {
        let fixture = start(CountingLogout::default());
        at(&fixture, 10_500).await;
        assert_eq!(fixture.handle.state().remaining_seconds, 290);
    }

    #[tokio::test(start_paused = true)]
    async fn test_warning_then_single_logout() {
        let fixture = start(CountingLogout::default());

        at(&fixture, 239_500).await;
        assert!(!fixture.handle.state().show_warning);

        at(&fixture, 241_500).await;
        let state = fixture.handle.state();
        assert!(state.show_warning);
        assert_eq!(state.warning_remaining_seconds, 59);
        assert_eq!(fixture.notifier.count(Level::Warning), 1);

        at(&fixture, 300_500).await;
        assert_eq!(fixture.logout.calls(), 1);
        assert!(fixture.handle.state().is_expired());

        // Nothing fires after expiry
        at(&fixture, 900_500).await;
        assert_eq!(fixture.logout.calls(), 1);

        let end = fixture.handle.join().await.unwrap();
        assert!(matches!(end, SessionEnd::LoggedOut(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_during_warning_restores_full_countdown() {
        let fixture = start(CountingLogout::default());
        at(&fixture, 250_000).await;
        assert!(fixture.handle.state().show_warning);

        assert!(fixture.handle.reset_session());
        at(&fixture, 250_500).await;

        let state = fixture.handle.state();
        assert!(!state.show_warning);
        assert_eq!(state.remaining_seconds, 300);
        assert_eq!(fixture.notifier.count(Level::Success), 1);

        // The old deadline at 300s no longer applies
        at(&fixture, 400_500).await;
        assert_eq!(fixture.logout.calls(), 0);
        assert_eq!(fixture.handle.state().phase, Phase::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_reset_never_logs_out() {
        let fixture = start(CountingLogout::default());

        for i in 1..=30u64 {
            at(&fixture, i * 100_000).await;
            assert!(fixture.handle.reset_session());
        }
        at(&fixture, 3_100_500).await;

        assert_eq!(fixture.logout.calls(), 0);
        assert!(!fixture.handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_now_fires_before_deadline() {
        let fixture = start(CountingLogout::default());
        at(&fixture, 280_000).await;

        assert!(fixture.handle.logout_now());
        at(&fixture, 280_500).await;

        assert_eq!(fixture.logout.calls(), 1);
        assert_eq!(
            *fixture.logout.causes.lock().unwrap(),
            vec![ExpiryCause::UserLogout]
        );
        assert!(Instant::now() < fixture.started + Duration::from_secs(300));

        at(&fixture, 400_500).await;
        assert_eq!(fixture.logout.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_leaks_no_timers_or_listeners() {
        let fixture = start(CountingLogout::default());
        let listener = fixture.handle.listener(ActivityKind::Click).unwrap();
        let logout = fixture.logout.clone();
        at(&fixture, 10_000).await;

        let end = fixture.handle.stop().await.unwrap();
        assert_eq!(end, SessionEnd::Stopped);
        assert!(!listener.is_attached());
        assert!(!listener.notify());

        sleep(Duration::from_secs(600)).await;
        assert_eq!(logout.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_cancels_session() {
        let fixture = start(CountingLogout::default());
        let logout = fixture.logout.clone();
        drop(fixture.handle);

        sleep(Duration::from_secs(600)).await;
        assert_eq!(logout.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_extends_session() {
        let fixture = start(CountingLogout::default());
        let keys = fixture.handle.listener(ActivityKind::KeyPress).unwrap();

        at(&fixture, 200_000).await;
        assert!(keys.notify());
        at(&fixture, 400_500).await;
        assert_eq!(fixture.logout.calls(), 0);
        assert_eq!(fixture.handle.state().remaining_seconds, 100);

        at(&fixture, 500_500).await;
        assert_eq!(fixture.logout.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_burst_keeps_session_alive() {
        let fixture = start(CountingLogout::default());
        let mouse = fixture.handle.listener(ActivityKind::PointerMove).unwrap();

        // Continuous movement, never pausing for the activity window
        for s in 0..=250u64 {
            at(&fixture, s * 1_000 + 500).await;
            assert!(mouse.notify());
        }
        assert!(!fixture.handle.state().show_warning);

        at(&fixture, 500_000).await;
        assert_eq!(fixture.logout.calls(), 0);

        at(&fixture, 560_000).await;
        assert_eq!(fixture.logout.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_is_active_decays_after_window() {
        let fixture = start(CountingLogout::default());
        let keys = fixture.handle.listener(ActivityKind::KeyPress).unwrap();

        at(&fixture, 5_000).await;
        keys.notify();
        at(&fixture, 6_500).await;
        assert!(fixture.handle.state().is_active);

        at(&fixture, 9_500).await;
        assert!(!fixture.handle.state().is_active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_logout_surfaces_error() {
        let fixture = start(CountingLogout {
            fail: true,
            ..Default::default()
        });
        at(&fixture, 300_500).await;

        assert_eq!(fixture.logout.calls(), 1);
        assert!(fixture.handle.state().is_expired());

        let err = fixture.handle.join().await.unwrap_err();
        assert!(format!("{:#}", err).contains("token store unavailable"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_after_expiry_are_ignored() {
        let fixture = start(CountingLogout::default());
        assert!(fixture.handle.logout_now());
        at(&fixture, 500).await;

        // The loop is gone; further commands are refused, not re-scheduled
        assert!(!fixture.handle.reset_session());
        assert!(!fixture.handle.logout_now());
        assert_eq!(fixture.logout.calls(), 1);
    }
}
