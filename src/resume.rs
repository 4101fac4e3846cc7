use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::platform::common::{atomic_write, remove_if_exists, set_owner_only};
use crate::session::state::StartMode;

const MARKER_VERSION: &str = "1";

/// Contents of the refresh marker file
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct MarkerRecord {
    pub version: String,
    pub marked_at: DateTime<Utc>,
    pub session_id: Uuid,
}

/// One-shot "this start is a page reload" flag.
///
/// Written just before the shell reloads and consumed by the next start.
/// The session itself never reads it: it only selects the start mode.
#[derive(Debug, Clone)]
pub struct RefreshMarker {
    path: PathBuf,
    max_age: Duration,
}

impl RefreshMarker {
    pub fn new(path: impl Into<PathBuf>, resume_window_secs: u64) -> Self {
        Self {
            path: path.into(),
            max_age: Duration::from_secs(resume_window_secs),
        }
    }

    /// Get the per-user marker path
    pub fn default_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "", "admin-session")
            .context("Could not determine data directory")?;

        Ok(dirs.data_local_dir().join("refresh-marker.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record that `session_id` is about to reload
    pub fn mark(&self, session_id: Uuid) -> Result<()> {
        let record = MarkerRecord {
            version: MARKER_VERSION.to_string(),
            marked_at: Utc::now(),
            session_id,
        };
        let content =
            serde_json::to_string_pretty(&record).context("Failed to serialize refresh marker")?;

        atomic_write(&self.path, content.as_bytes())
            .with_context(|| format!("Failed to write refresh marker: {}", self.path.display()))?;
        set_owner_only(&self.path)?;

        debug!("Refresh marker written for session {}", session_id);
        Ok(())
    }

    /// Consume the marker and decide the start mode
    pub fn take(&self) -> Result<StartMode> {
        self.take_at(Utc::now())
    }

    /// Consume the marker as of `now`.
    ///
    /// The marker is always removed. A missing, stale or unreadable marker
    /// means a fresh login.
    pub fn take_at(&self, now: DateTime<Utc>) -> Result<StartMode> {
        let record = match self.peek() {
            Ok(record) => record,
            Err(e) => {
                warn!("Ignoring unreadable refresh marker: {:#}", e);
                None
            }
        };
        remove_if_exists(&self.path)?;

        let Some(record) = record else {
            return Ok(StartMode::Fresh);
        };

        let age = now.signed_duration_since(record.marked_at);
        let fresh_enough = age
            .to_std()
            .map(|age| age <= self.max_age)
            .unwrap_or(false);

        if fresh_enough {
            debug!(
                "Resuming after reload of session {} ({}s ago)",
                record.session_id,
                age.num_seconds()
            );
            Ok(StartMode::Resume)
        } else {
            debug!("Refresh marker too old ({}s), starting fresh", age.num_seconds());
            Ok(StartMode::Fresh)
        }
    }

    /// Read the marker without consuming it
    pub fn peek(&self) -> Result<Option<MarkerRecord>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read refresh marker: {}", self.path.display()))?;

        let record: MarkerRecord = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse refresh marker: {}", self.path.display()))?;

        if record.version != MARKER_VERSION {
            warn!(
                "Refresh marker version mismatch (expected {}, got {})",
                MARKER_VERSION, record.version
            );
            return Ok(None);
        }

        Ok(Some(record))
    }

    /// Delete the marker if present
    pub fn clear(&self) -> Result<bool> {
        remove_if_exists(&self.path)
    }
}
