use anyhow::{Context, Result};
use std::path::Path;

use admin_session::platform::common::atomic_write;
use admin_session::session::config::EXAMPLE_CONFIG;

/// Initialize a new session configuration file
pub fn init(output_path: &Path, force: bool) -> Result<()> {
    if output_path.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists: {}\nUse --force to overwrite",
            output_path.display()
        );
    }

    atomic_write(output_path, EXAMPLE_CONFIG.as_bytes())
        .with_context(|| format!("Failed to write config file: {}", output_path.display()))?;

    println!("✓ Created session configuration file: {}", output_path.display());
    println!("\nEdit this file to change the inactivity timeout and warning lead time.");
    println!("Then start a session: admin-session run");

    Ok(())
}
