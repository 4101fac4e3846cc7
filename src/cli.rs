use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Admin Session Guard
///
/// Inactivity auto-logout for the admin dashboard: tracks activity, warns
/// before the session expires and logs the user out when it does.
#[derive(Parser, Debug)]
#[command(name = "admin-session")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file (defaults to the per-user config)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run an interactive admin session; every input line counts as activity
    Run {
        /// Ignore any refresh marker and start as a fresh login
        #[arg(long)]
        fresh: bool,
    },
    /// Show configuration and whether a reload can be resumed
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write an example configuration file
    Init {
        /// Output path (defaults to the config path)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },
}
