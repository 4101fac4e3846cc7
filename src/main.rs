use anyhow::Result;
use clap::Parser;

use admin_session::session::config::get_config_path;

mod cli;
mod commands;

use cli::{Args, Commands};
use commands::utils::init_logging;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose);

    let config_path = match args.config {
        Some(path) => path,
        None => get_config_path()?,
    };

    match args.command {
        Commands::Run { fresh } => commands::run::run(&config_path, fresh),
        Commands::Status { json } => commands::status::status(&config_path, json),
        Commands::Init { output, force } => {
            commands::init::init(output.as_deref().unwrap_or(config_path.as_path()), force)
        }
    }
}
