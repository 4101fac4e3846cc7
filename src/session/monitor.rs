use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

use crate::session::config::ActivityKind;

/// Leading edge of an activity burst
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivitySignal {
    pub kind: ActivityKind,
    pub at: Instant,
}

/// Groups interaction events into bursts.
///
/// Events closer together than `window` belong to the same burst. Only the
/// first event of a burst is reported; the burst counts as active until
/// `window` has passed without an event.
#[derive(Debug, Clone)]
pub struct BurstTracker {
    window: Duration,
    last_event_at: Option<Instant>,
    unsettled: bool,
    bursts: u64,
}

impl BurstTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_event_at: None,
            unsettled: false,
            bursts: 0,
        }
    }

    /// Record an event; returns true when it starts a new burst
    pub fn observe(&mut self, at: Instant) -> bool {
        let new_burst = match self.last_event_at {
            Some(last) => at.saturating_duration_since(last) >= self.window,
            None => true,
        };

        if new_burst {
            self.bursts += 1;
            self.unsettled = false;
        } else {
            self.unsettled = true;
        }
        self.last_event_at = Some(self.last_event_at.map_or(at, |last| last.max(at)));
        new_burst
    }

    pub fn is_active(&self, now: Instant) -> bool {
        self.last_event_at
            .is_some_and(|last| now.saturating_duration_since(last) < self.window)
    }

    /// Once a burst with trailing events has ended, return its last event
    /// time (once). Lets the session re-anchor on the end of a long burst.
    pub fn settle(&mut self, now: Instant) -> Option<Instant> {
        if !self.unsettled || self.is_active(now) {
            return None;
        }
        self.unsettled = false;
        self.last_event_at
    }

    pub fn bursts(&self) -> u64 {
        self.bursts
    }

    pub fn last_event_at(&self) -> Option<Instant> {
        self.last_event_at
    }
}

struct MonitorShared<M> {
    tx: mpsc::UnboundedSender<M>,
    tracker: Mutex<BurstTracker>,
}

impl<M> MonitorShared<M> {
    fn tracker(&self) -> MutexGuard<'_, BurstTracker> {
        self.tracker.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Turns interaction events into debounced activity signals.
///
/// Listeners handed out while the monitor is started hold only a weak
/// reference; `stop` (or drop) detaches every one of them at once.
pub struct ActivityMonitor<M> {
    kinds: HashSet<ActivityKind>,
    window: Duration,
    tx: mpsc::UnboundedSender<M>,
    shared: Option<Arc<MonitorShared<M>>>,
}

impl<M> ActivityMonitor<M>
where
    M: From<ActivitySignal> + Send + 'static,
{
    pub fn new(kinds: &[ActivityKind], window: Duration, tx: mpsc::UnboundedSender<M>) -> Self {
        Self {
            kinds: kinds.iter().copied().collect(),
            window,
            tx,
            shared: None,
        }
    }

    /// Attach listeners. Restarting a running monitor detaches the old ones.
    pub fn start(&mut self) {
        self.stop();
        self.shared = Some(Arc::new(MonitorShared {
            tx: self.tx.clone(),
            tracker: Mutex::new(BurstTracker::new(self.window)),
        }));
        debug!("Activity monitor started ({} event categories)", self.kinds.len());
    }

    /// Detach every listener. Safe to call when not started.
    pub fn stop(&mut self) {
        if let Some(shared) = self.shared.take() {
            debug!(
                "Activity monitor stopped, detaching {} listener(s)",
                Arc::weak_count(&shared)
            );
        }
    }

    pub fn is_started(&self) -> bool {
        self.shared.is_some()
    }

    /// A listener for `kind`, if the monitor is started and listens for it
    pub fn listener(&self, kind: ActivityKind) -> Option<ActivityListener<M>> {
        if !self.kinds.contains(&kind) {
            return None;
        }
        self.shared.as_ref().map(|shared| ActivityListener {
            kind,
            shared: Arc::downgrade(shared),
        })
    }

    /// Listeners for every configured category
    pub fn listeners(&self) -> Vec<ActivityListener<M>> {
        let mut kinds: Vec<_> = self.kinds.iter().copied().collect();
        kinds.sort_by_key(|kind| ActivityKind::ALL.iter().position(|k| k == kind));
        kinds.into_iter().filter_map(|kind| self.listener(kind)).collect()
    }

    /// Number of listeners still attached
    pub fn listener_count(&self) -> usize {
        self.shared.as_ref().map_or(0, Arc::weak_count)
    }

    pub fn is_active(&self, now: Instant) -> bool {
        self.shared
            .as_ref()
            .is_some_and(|shared| shared.tracker().is_active(now))
    }

    /// Time of the most recent interaction seen by any listener
    pub fn last_event_at(&self) -> Option<Instant> {
        self.shared
            .as_ref()
            .and_then(|shared| shared.tracker().last_event_at())
    }

    pub fn settle(&self, now: Instant) -> Option<Instant> {
        self.shared.as_ref().and_then(|shared| shared.tracker().settle(now))
    }
}

impl<M> Drop for ActivityMonitor<M> {
    fn drop(&mut self) {
        self.shared.take();
    }
}

/// Handle given to an event source for one interaction category
pub struct ActivityListener<M> {
    kind: ActivityKind,
    shared: Weak<MonitorShared<M>>,
}

impl<M> Clone for ActivityListener<M> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            shared: self.shared.clone(),
        }
    }
}

impl<M> ActivityListener<M>
where
    M: From<ActivitySignal>,
{
    pub fn kind(&self) -> ActivityKind {
        self.kind
    }

    /// Whether the owning monitor is still running
    pub fn is_attached(&self) -> bool {
        self.shared.strong_count() > 0
    }

    /// Report an interaction now. Returns false once detached.
    pub fn notify(&self) -> bool {
        self.notify_at(Instant::now())
    }

    pub fn notify_at(&self, at: Instant) -> bool {
        let Some(shared) = self.shared.upgrade() else {
            return false;
        };

        let new_burst = shared.tracker().observe(at);
        if new_burst {
            return shared
                .tx
                .send(M::from(ActivitySignal { kind: self.kind, at }))
                .is_ok();
        }
        true
    }
}
