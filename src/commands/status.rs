use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};

use admin_session::resume::{MarkerRecord, RefreshMarker};
use admin_session::session::config::{ActivityKind, TimeoutConfig, load_or_default};
use admin_session::session::format_mmss;

use super::utils::format_duration;

#[derive(Debug, Serialize)]
struct StatusReport {
    config_path: PathBuf,
    config_exists: bool,
    timeouts: TimeoutConfig,
    activity_events: Vec<ActivityKind>,
    desktop_notifications: bool,
    login_route: String,
    resume_window_secs: u64,
    marker: Option<MarkerRecord>,
    resumable: bool,
}

/// Show the effective configuration and refresh-marker state
pub fn status(config_path: &Path, json: bool) -> Result<()> {
    let marker = RefreshMarker::new(RefreshMarker::default_path()?, 0);
    let report = build_report(config_path, &marker)?;

    if json {
        let output =
            serde_json::to_string_pretty(&report).context("Failed to serialize status")?;
        println!("{}", output);
        return Ok(());
    }

    println!("Admin Session Status");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!(
        "Config:          {}{}",
        report.config_path.display(),
        if report.config_exists { "" } else { " (not found, using defaults)" }
    );
    println!(
        "Logout after:    {} idle",
        format_mmss(report.timeouts.inactivity_timeout_secs)
    );
    println!(
        "Warning at:      {} before logout",
        format_mmss(report.timeouts.warning_lead_secs)
    );
    println!("Activity window: {}s", report.timeouts.activity_window_secs);
    println!("Tracked events:  {}", report.activity_events.len());
    println!(
        "Desktop alerts:  {}",
        if report.desktop_notifications { "on" } else { "off" }
    );
    println!("Login route:     {}", report.login_route);

    println!();
    match &report.marker {
        Some(record) => {
            let ago = Utc::now() - record.marked_at;
            println!(
                "Refresh marker:  session {} ({} ago, {})",
                record.session_id,
                format_duration(ago),
                if report.resumable { "resumable" } else { "expired" }
            );
        }
        None => println!("Refresh marker:  none (next run is a fresh login)"),
    }

    Ok(())
}

fn build_report(config_path: &Path, marker: &RefreshMarker) -> Result<StatusReport> {
    let config = load_or_default(config_path)?;

    // Peek only; consuming the marker is reserved for `run`
    let record = marker.peek().unwrap_or_else(|e| {
        tracing::warn!("Ignoring unreadable refresh marker: {:#}", e);
        None
    });
    let resumable = record.as_ref().is_some_and(|record| {
        (Utc::now() - record.marked_at).num_seconds() <= config.host.resume_window_secs as i64
    });

    Ok(StatusReport {
        config_path: config_path.to_path_buf(),
        config_exists: config_path.exists(),
        timeouts: config.timeouts,
        activity_events: config.activity.events,
        desktop_notifications: config.notifications.desktop,
        login_route: config.host.login_route,
        resume_window_secs: config.host.resume_window_secs,
        marker: record,
        resumable,
    })
}
