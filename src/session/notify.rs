use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use crate::session::config::NotificationConfig;

/// Fire-and-forget sink for user-facing session messages
pub trait Notifier: Send + Sync {
    fn success(&self, message: &str);

    fn error(&self, message: &str);

    /// Defaults to `error`; sinks without a distinct warning style need not override it
    fn warning(&self, message: &str) {
        self.error(message);
    }
}

/// Notifier that only writes to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn success(&self, message: &str) {
        info!("{}", message);
    }

    fn error(&self, message: &str) {
        warn!("{}", message);
    }

    fn warning(&self, message: &str) {
        warn!("{}", message);
    }
}

/// Raises OS desktop notifications
#[derive(Debug, Clone)]
pub struct DesktopNotifier {
    title: String,
}

impl DesktopNotifier {
    pub fn new(title: impl Into<String>) -> Self {
        Self { title: title.into() }
    }

    fn notify(&self, message: &str, critical: bool) {
        if let Err(e) = send_system_notification(&self.title, message, critical) {
            warn!("Failed to show desktop notification: {:#}", e);
        }
    }
}

impl Notifier for DesktopNotifier {
    fn success(&self, message: &str) {
        self.notify(message, false);
    }

    fn error(&self, message: &str) {
        self.notify(message, true);
    }
}

/// Forwards every message to several notifiers
#[derive(Clone, Default)]
pub struct FanoutNotifier {
    sinks: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new(sinks: Vec<Arc<dyn Notifier>>) -> Self {
        Self { sinks }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl Notifier for FanoutNotifier {
    fn success(&self, message: &str) {
        self.sinks.iter().for_each(|sink| sink.success(message));
    }

    fn error(&self, message: &str) {
        self.sinks.iter().for_each(|sink| sink.error(message));
    }

    fn warning(&self, message: &str) {
        self.sinks.iter().for_each(|sink| sink.warning(message));
    }
}

/// Build the notifier described by the configuration
pub fn build_notifier(config: &NotificationConfig) -> Arc<dyn Notifier> {
    if config.desktop {
        Arc::new(FanoutNotifier::new(vec![
            Arc::new(TracingNotifier),
            Arc::new(DesktopNotifier::new("Admin Session")),
        ]))
    } else {
        Arc::new(TracingNotifier)
    }
}

/// Send a system notification (platform-specific).
///
/// Spawns the helper without waiting for it so the session loop never blocks.
fn send_system_notification(title: &str, message: &str, critical: bool) -> Result<()> {
    #[cfg(target_os = "linux")]
    {
        use std::process::Command;
        let urgency = if critical { "--urgency=critical" } else { "--urgency=normal" };
        let mut command = Command::new("notify-send");
        command
            .arg(title)
            .arg(message)
            .arg(urgency)
            .arg("--icon=dialog-warning");
        spawn_reaped(command)?;
    }

    #[cfg(target_os = "macos")]
    {
        use std::process::Command;
        let sound = if critical { " sound name \"Glass\"" } else { "" };
        let script = format!(
            "display notification \"{}\" with title \"{}\"{}",
            message.replace('"', "'"),
            title.replace('"', "'"),
            sound
        );
        let mut command = Command::new("osascript");
        command.arg("-e").arg(&script);
        spawn_reaped(command)?;
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        let _ = critical;
        warn!("Notification: {} - {}", title, message);
    }

    Ok(())
}

/// Start `command` detached from stdio and wait for it on a helper thread,
/// so the exited child is reaped instead of lingering as a zombie.
#[cfg(any(target_os = "linux", target_os = "macos"))]
fn spawn_reaped(mut command: std::process::Command) -> Result<()> {
    use anyhow::Context;
    use std::process::Stdio;

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .context("Failed to start notification helper")?;

    std::thread::Builder::new()
        .name("notify-reaper".to_string())
        .spawn(move || match child.wait() {
            Ok(status) if !status.success() => {
                warn!("Notification helper exited with {}", status)
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to wait for notification helper: {}", e),
        })
        .context("Failed to start notification reaper thread")?;

    Ok(())
}
