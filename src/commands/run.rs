use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use admin_session::platform::common::remove_if_exists;
use admin_session::resume::RefreshMarker;
use admin_session::session::config::{ActivityKind, HostConfig, SessionConfig, load_or_default};
use admin_session::session::{
    ExpiryCause, LogoutHandler, SessionEnd, SessionState, StartMode, build_notifier, format_mmss,
    start_session,
};
use admin_session::ui::{
    AdminRefreshButton, DataReloader, RefreshOutcome, SessionTimerView, TimerTone, WarningAction,
    WarningModalView, WarningUrgency,
};

/// Logout callback of the terminal shell.
///
/// Clears the auth token file and "redirects" to the login route. Later
/// calls after the first are no-ops.
pub struct ShellLogout {
    host: HostConfig,
    logged_out: AtomicBool,
}

impl ShellLogout {
    pub fn new(host: HostConfig) -> Self {
        Self {
            host,
            logged_out: AtomicBool::new(false),
        }
    }
}

impl LogoutHandler for ShellLogout {
    fn logout(&self, cause: ExpiryCause) -> Result<()> {
        if self.logged_out.swap(true, Ordering::SeqCst) {
            debug!("Logout already performed, ignoring repeat ({})", cause);
            return Ok(());
        }

        if let Some(token_path) = &self.host.token_path {
            if remove_if_exists(token_path)
                .with_context(|| format!("Failed to clear auth token: {}", token_path.display()))?
            {
                info!("Auth token cleared: {}", token_path.display());
            }
        }

        println!("Logged out ({}). Redirecting to {}", cause, self.host.login_route);
        Ok(())
    }
}

/// Reloads the session configuration file as the shell's "dashboard data"
pub struct ConfigReloader {
    path: PathBuf,
}

impl ConfigReloader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DataReloader for ConfigReloader {
    async fn reload(&self) -> Result<String> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read config file: {}", self.path.display()))?;

        let config: SessionConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML config file: {}", self.path.display()))?;
        admin_session::session::config::validate_config(&config)?;

        Ok(format!(
            "Configuration reloaded ({} tracked events)",
            config.activity.events.len()
        ))
    }
}

/// A line typed into the shell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShellCommand {
    /// Anything unrecognised is plain activity
    Activity,
    Modal(WarningAction),
    Refresh,
    Status,
    Reload,
    Quit,
}

impl ShellCommand {
    fn parse(line: &str) -> Self {
        if let Some(action) = WarningAction::parse(line) {
            return ShellCommand::Modal(action);
        }
        match line.trim().to_lowercase().as_str() {
            "refresh" | "r" => ShellCommand::Refresh,
            "status" | "?" => ShellCommand::Status,
            "reload" => ShellCommand::Reload,
            "quit" | "exit" | "q" => ShellCommand::Quit,
            _ => ShellCommand::Activity,
        }
    }
}

enum ShellExit {
    Quit,
    Reload,
    Ended,
}

/// Tracks what has been printed so only visible changes are printed again
#[derive(Debug, Default)]
struct Screen {
    tone: Option<TimerTone>,
    urgency: Option<WarningUrgency>,
    countdown: Option<String>,
}

impl Screen {
    /// Lines to print for `state`, given what is already on screen
    fn update(&mut self, state: &SessionState) -> Vec<String> {
        let mut lines = Vec::new();
        let badge = SessionTimerView::from_state(state);
        let modal = WarningModalView::from_state(state);
        let urgency = modal.as_ref().map(|modal| modal.urgency);
        let countdown = modal.as_ref().map(|modal| modal.countdown.clone());

        if urgency != self.urgency {
            match &modal {
                Some(modal) => lines.extend(modal.render()),
                None if self.urgency.is_some() && !state.is_expired() => {
                    lines.push("Warning dismissed".to_string())
                }
                None => {}
            }
            self.urgency = urgency;
        } else if let Some(countdown) = &countdown {
            if self.countdown.as_ref() != Some(countdown) {
                lines.push(format!("  Logging out in {}", countdown));
            }
        }
        self.countdown = countdown;

        if self.tone != Some(badge.tone) {
            lines.push(badge.render());
            self.tone = Some(badge.tone);
        }

        lines
    }
}

/// Run an interactive session until logout, quit or reload
pub fn run(config_path: &Path, fresh: bool) -> Result<()> {
    let config = load_or_default(config_path)?;
    let marker = RefreshMarker::new(
        RefreshMarker::default_path()?,
        config.host.resume_window_secs,
    );

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(run_shell(config, config_path, marker, fresh))
}

async fn run_shell(
    config: SessionConfig,
    config_path: &Path,
    marker: RefreshMarker,
    fresh: bool,
) -> Result<()> {
    let start_mode = if fresh {
        marker.clear()?;
        StartMode::Fresh
    } else {
        marker.take()?
    };

    let notifier = build_notifier(&config.notifications);
    let logout = Arc::new(ShellLogout::new(config.host.clone()));
    let handle = start_session(&config, start_mode, logout, notifier.clone());

    print_banner(&config, start_mode);

    let keys = handle.listener(ActivityKind::KeyPress);
    if keys.is_none() {
        warn!("key_press is not a tracked event; typing will not extend the session");
    }
    let button = AdminRefreshButton::new(notifier);
    let reloader = ConfigReloader::new(config_path);

    let mut screen = Screen::default();
    let mut state_rx = handle.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let exit = loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read from stdin")? else {
                    break ShellExit::Quit;
                };
                if let Some(keys) = &keys {
                    keys.notify();
                }

                match ShellCommand::parse(&line) {
                    ShellCommand::Activity => {}
                    ShellCommand::Modal(action) => {
                        if !action.dispatch(&handle) {
                            debug!("Session already ended, ignoring {:?}", action);
                        }
                    }
                    ShellCommand::Refresh => {
                        let outcome = button.refresh(&reloader, &handle).await;
                        print_refresh(&outcome);
                    }
                    ShellCommand::Status => print_state(&handle.state()),
                    ShellCommand::Reload => break ShellExit::Reload,
                    ShellCommand::Quit => break ShellExit::Quit,
                }
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break ShellExit::Ended;
                }
                let state = state_rx.borrow_and_update().clone();
                for line in screen.update(&state) {
                    println!("{}", line);
                }
            }
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break ShellExit::Quit;
            }
        }
    };

    match exit {
        ShellExit::Reload => {
            marker.mark(handle.state().session_id)?;
            handle.stop().await?;
            println!(
                "Reloading... start again within {}s to resume this session",
                config.host.resume_window_secs
            );
        }
        ShellExit::Quit => {
            handle.stop().await?;
            println!("Session closed");
        }
        ShellExit::Ended => match handle.join().await? {
            SessionEnd::LoggedOut(cause) => info!("Session finished: {}", cause),
            SessionEnd::Stopped => info!("Session stopped"),
        },
    }

    Ok(())
}

fn print_banner(config: &SessionConfig, start_mode: StartMode) {
    println!("Admin Session");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    match start_mode {
        StartMode::Fresh => println!("Fresh login"),
        StartMode::Resume => println!("Resumed after reload"),
    }
    println!(
        "Idle logout after {}, warning {} before",
        format_mmss(config.timeouts.inactivity_timeout_secs),
        format_mmss(config.timeouts.warning_lead_secs)
    );
    println!("Commands: stay, logout, refresh, status, reload, quit");
    println!();
}

fn print_state(state: &SessionState) {
    println!("{}", SessionTimerView::from_state(state).render());
    println!("  Session:       {}", state.session_id);
    println!("  Phase:         {}", state.phase);
    println!(
        "  Last activity: {}",
        state.last_activity.format("%Y-%m-%d %H:%M:%S %Z")
    );
    if state.show_warning {
        println!("  Logout in:     {}", format_mmss(state.time_left()));
    }
}

fn print_refresh(outcome: &RefreshOutcome) {
    match outcome {
        RefreshOutcome::Reloaded { summary, extended } => {
            println!("✓ {}{}", summary, if *extended { ", session extended" } else { "" });
        }
        RefreshOutcome::Failed { error, extended } => {
            println!(
                "✗ Refresh failed: {}{}",
                error,
                if *extended { " (session extended)" } else { "" }
            );
        }
        RefreshOutcome::Busy => println!("Refresh already in progress"),
    }
}
