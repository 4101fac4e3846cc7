use anyhow::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use crate::session::notify::Notifier;
use crate::session::supervisor::SessionExtender;

/// External data source behind the dashboard's refresh button
#[allow(async_fn_in_trait)]
pub trait DataReloader {
    /// Reload the dashboard data, returning a short summary for the user
    async fn reload(&self) -> Result<String>;
}

/// What a refresh click did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Reloaded { summary: String, extended: bool },
    Failed { error: String, extended: bool },
    /// A refresh was already running; nothing was done
    Busy,
}

impl RefreshOutcome {
    pub fn extended(&self) -> bool {
        match self {
            RefreshOutcome::Reloaded { extended, .. } | RefreshOutcome::Failed { extended, .. } => {
                *extended
            }
            RefreshOutcome::Busy => false,
        }
    }
}

/// "Refresh data + extend session" button.
///
/// A click is explicit user activity, so the session is extended whether or
/// not the reload succeeds.
pub struct AdminRefreshButton {
    notifier: Arc<dyn Notifier>,
    busy: AtomicBool,
}

impl AdminRefreshButton {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            busy: AtomicBool::new(false),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn label(&self) -> &'static str {
        if self.is_busy() { "Refreshing..." } else { "Refresh" }
    }

    pub async fn refresh<R, S>(&self, reloader: &R, session: &S) -> RefreshOutcome
    where
        R: DataReloader,
        S: SessionExtender + ?Sized,
    {
        if self.busy.swap(true, Ordering::SeqCst) {
            return RefreshOutcome::Busy;
        }

        let busy = BusyGuard(&self.busy);
        let result = reloader.reload().await;
        let extended = session.reset_session();
        drop(busy);

        if !extended {
            warn!("Refresh could not extend the session: it has already ended");
        }

        match result {
            Ok(summary) => {
                info!("Dashboard refreshed: {}", summary);
                self.notifier.success(&format!("{} - session extended", summary));
                RefreshOutcome::Reloaded { summary, extended }
            }
            Err(e) => {
                let error = format!("{:#}", e);
                warn!("Dashboard refresh failed: {}", error);
                self.notifier.error(&format!("Failed to refresh data: {}", error));
                RefreshOutcome::Failed { error, extended }
            }
        }
    }
}

/// Clears the busy flag even if the refresh future is dropped mid-reload
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
