use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main session guard configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Inactivity and warning timing
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Which interaction categories count as activity
    #[serde(default)]
    pub activity: ActivityConfig,

    /// Notification sinks
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Settings owned by the hosting admin shell
    #[serde(default)]
    pub host: HostConfig,
}

/// Inactivity timing configuration
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Seconds of inactivity before the session is logged out
    #[serde(default = "default_inactivity_timeout")]
    pub inactivity_timeout_secs: u64,

    /// Seconds before logout at which the warning is raised
    #[serde(default = "default_warning_lead")]
    pub warning_lead_secs: u64,

    /// Maximum gap between events of one activity burst
    #[serde(default = "default_activity_window")]
    pub activity_window_secs: u64,

    /// Period of the visible countdowns (milliseconds)
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
}

fn default_inactivity_timeout() -> u64 {
    300
}

fn default_warning_lead() -> u64 {
    60
}

fn default_activity_window() -> u64 {
    2
}

fn default_tick_interval() -> u64 {
    1000
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout_secs: default_inactivity_timeout(),
            warning_lead_secs: default_warning_lead(),
            activity_window_secs: default_activity_window(),
            tick_interval_ms: default_tick_interval(),
        }
    }
}

impl TimeoutConfig {
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }

    pub fn warning_lead(&self) -> Duration {
        Duration::from_secs(self.warning_lead_secs)
    }

    /// Offset from last activity at which the warning fires
    pub fn warning_offset(&self) -> Duration {
        self.inactivity_timeout().saturating_sub(self.warning_lead())
    }

    pub fn activity_window(&self) -> Duration {
        Duration::from_secs(self.activity_window_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Interaction categories that the activity monitor listens for
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    PointerDown,
    PointerMove,
    KeyPress,
    Scroll,
    Touch,
    Click,
    Focus,
    Input,
    Change,
    Submit,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 10] = [
        ActivityKind::PointerDown,
        ActivityKind::PointerMove,
        ActivityKind::KeyPress,
        ActivityKind::Scroll,
        ActivityKind::Touch,
        ActivityKind::Click,
        ActivityKind::Focus,
        ActivityKind::Input,
        ActivityKind::Change,
        ActivityKind::Submit,
    ];
}

/// Activity monitor configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ActivityConfig {
    #[serde(default = "default_activity_events")]
    pub events: Vec<ActivityKind>,
}

fn default_activity_events() -> Vec<ActivityKind> {
    ActivityKind::ALL.to_vec()
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            events: default_activity_events(),
        }
    }
}

/// Notification configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NotificationConfig {
    /// Also raise OS desktop notifications
    #[serde(default)]
    pub desktop: bool,
}

/// Host shell configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostConfig {
    /// Auth token file removed on logout
    #[serde(default)]
    pub token_path: Option<PathBuf>,

    /// Route the shell redirects to after logout
    #[serde(default = "default_login_route")]
    pub login_route: String,

    /// Maximum age of a refresh marker that still counts as a reload
    #[serde(default = "default_resume_window")]
    pub resume_window_secs: u64,
}

fn default_login_route() -> String {
    "/login".to_string()
}

fn default_resume_window() -> u64 {
    30
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            token_path: None,
            login_route: default_login_route(),
            resume_window_secs: default_resume_window(),
        }
    }
}

/// Get the per-user config file path
pub fn get_config_path() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "admin-session")
        .context("Could not determine config directory")?;

    Ok(dirs.config_dir().join("session-config.yaml"))
}

/// Load configuration from YAML file
pub fn load_config(path: &Path) -> Result<SessionConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: SessionConfig = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse YAML config file: {}", path.display()))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load configuration, falling back to defaults when the file is absent
pub fn load_or_default(path: &Path) -> Result<SessionConfig> {
    if !path.exists() {
        tracing::debug!("No config at {}, using defaults", path.display());
        return Ok(SessionConfig::default());
    }
    load_config(path)
}

/// Save configuration to YAML file
pub fn save_config(path: &Path, config: &SessionConfig) -> Result<()> {
    validate_config(config)?;

    let content = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;

    crate::platform::common::atomic_write(path, content.as_bytes())
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;

    Ok(())
}

/// Validate configuration
pub fn validate_config(config: &SessionConfig) -> Result<()> {
    validate_timeouts(&config.timeouts)?;

    if config.activity.events.is_empty() {
        anyhow::bail!("At least one activity event category must be configured");
    }

    let mut seen = std::collections::HashSet::new();
    for kind in &config.activity.events {
        if !seen.insert(kind) {
            anyhow::bail!("Duplicate activity event category: {:?}", kind);
        }
    }

    if !config.host.login_route.starts_with('/') {
        anyhow::bail!(
            "Login route must be an absolute path, got: {}",
            config.host.login_route
        );
    }

    Ok(())
}

fn validate_timeouts(timeouts: &TimeoutConfig) -> Result<()> {
    if timeouts.inactivity_timeout_secs == 0 {
        anyhow::bail!("Inactivity timeout must be greater than zero");
    }

    if timeouts.warning_lead_secs == 0 {
        anyhow::bail!("Warning lead time must be greater than zero");
    }

    // warning_at < deadline_at, and warning_at strictly after the last activity
    if timeouts.warning_lead_secs >= timeouts.inactivity_timeout_secs {
        anyhow::bail!(
            "Warning lead time ({}s) must be shorter than the inactivity timeout ({}s)",
            timeouts.warning_lead_secs,
            timeouts.inactivity_timeout_secs
        );
    }

    if timeouts.activity_window_secs == 0 {
        anyhow::bail!("Activity window must be greater than zero");
    }

    if timeouts.tick_interval_ms == 0 {
        anyhow::bail!("Tick interval must be greater than zero");
    }

    Ok(())
}

/// Example configuration file content
pub const EXAMPLE_CONFIG: &str = include_str!("../../example-session-config.yaml");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_session_constants() {
        let config = SessionConfig::default();
        assert_eq!(config.timeouts.inactivity_timeout(), Duration::from_secs(300));
        assert_eq!(config.timeouts.warning_lead(), Duration::from_secs(60));
        assert_eq!(config.timeouts.warning_offset(), Duration::from_secs(240));
        assert_eq!(config.timeouts.tick_interval(), Duration::from_secs(1));
        assert_eq!(config.activity.events.len(), 10);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "timeouts:\n  inactivity_timeout_secs: 120\n";
        let config: SessionConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.timeouts.inactivity_timeout_secs, 120);
        assert_eq!(config.timeouts.warning_lead_secs, 60);
        assert_eq!(config.host.login_route, "/login");
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_rejects_lead_not_shorter_than_timeout() {
        let mut config = SessionConfig::default();
        config.timeouts.warning_lead_secs = 300;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_durations() {
        let mut config = SessionConfig::default();
        config.timeouts.tick_interval_ms = 0;
        assert!(validate_config(&config).is_err());

        let mut config = SessionConfig::default();
        config.timeouts.activity_window_secs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_rejects_empty_or_duplicate_events() {
        let mut config = SessionConfig::default();
        config.activity.events.clear();
        assert!(validate_config(&config).is_err());

        let mut config = SessionConfig::default();
        config.activity.events = vec![ActivityKind::Click, ActivityKind::Click];
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_rejects_relative_login_route() {
        let mut config = SessionConfig::default();
        config.host.login_route = "login".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_example_config_parses() {
        let config: SessionConfig = serde_yaml::from_str(EXAMPLE_CONFIG).unwrap();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_save_and_load_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session-config.yaml");

        let mut config = SessionConfig::default();
        config.timeouts.inactivity_timeout_secs = 600;
        save_config(&path, &config).unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.timeouts.inactivity_timeout_secs, 600);
    }

    #[test]
    fn test_load_or_default_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_or_default(&dir.path().join("missing.yaml")).unwrap();
        assert_eq!(config.timeouts, TimeoutConfig::default());
    }
}
