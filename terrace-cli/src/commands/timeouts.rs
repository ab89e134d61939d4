//! Timeout check command
//!
//! Runs the controller's timeout checks against a single deploy item manifest
//! and reports what the controller would do.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use colored::*;
use std::path::PathBuf;
use std::time::Duration;

use terrace_controller::TimeoutDetector;
use terrace_controller::config::parse_timeout;
use terrace_core::domain::DeployItem;

use crate::config::Config;

#[derive(Args)]
pub struct CheckTimeoutsCommand {
    /// Deploy item manifest (YAML)
    manifest: PathBuf,

    /// Pickup timeout (`none` or e.g. 60m)
    #[arg(long, env = "TERRACE_PICKUP_TIMEOUT", default_value = "60m")]
    pickup_timeout: String,

    /// Aborting timeout (`none` or e.g. 5m)
    #[arg(long, env = "TERRACE_ABORTING_TIMEOUT", default_value = "5m")]
    aborting_timeout: String,

    /// Default progressing timeout (`none` or e.g. 10m)
    #[arg(long, env = "TERRACE_DEFAULT_TIMEOUT", default_value = "10m")]
    default_timeout: String,

    /// Write the updated deploy item back to the manifest
    #[arg(long)]
    write: bool,
}

/// Handle the check-timeouts command
pub async fn handle_check_timeouts(cmd: CheckTimeoutsCommand, config: &Config) -> Result<()> {
    let raw = tokio::fs::read_to_string(&cmd.manifest)
        .await
        .with_context(|| format!("Failed to read manifest: {}", cmd.manifest.display()))?;
    let mut item: DeployItem = serde_yaml::from_str(&raw)
        .with_context(|| format!("Failed to decode deploy item: {}", cmd.manifest.display()))?;

    let detector = TimeoutDetector::new(
        parse_timeout(&cmd.pickup_timeout).context("invalid pickup timeout")?,
        parse_timeout(&cmd.aborting_timeout).context("invalid aborting timeout")?,
        parse_timeout(&cmd.default_timeout).context("invalid default timeout")?,
    );
    let old = item.clone();
    let requeue = detector
        .detect(&mut item, Utc::now())
        .context("Failed to run timeout checks")?;

    print_report(&old, &item, requeue);

    if item != old {
        if cmd.write {
            tokio::fs::write(&cmd.manifest, serde_yaml::to_string(&item)?)
                .await
                .with_context(|| format!("Failed to write manifest: {}", cmd.manifest.display()))?;
            println!("{}", "✓ Manifest updated".green().bold());
        } else {
            println!();
            print!("{}", config.encode(&item)?);
        }
    }
    Ok(())
}

fn print_report(old: &DeployItem, new: &DeployItem, requeue: Option<Duration>) {
    println!("{} {}", "Deploy item:".bold(), new.metadata.key().cyan());
    println!("  Phase: {}", new.status.phase);

    if new.status != old.status {
        if let Some(err) = &new.status.last_error {
            println!("  {} {}", err.reason.red().bold(), err.message);
        }
    }
    if new.metadata.annotations != old.metadata.annotations {
        println!("  {}", "Annotations changed".yellow());
        for (key, value) in &new.metadata.annotations {
            if old.metadata.annotations.get(key) != Some(value) {
                println!("    + {}={}", key, value);
            }
        }
        for key in old.metadata.annotations.keys() {
            if !new.metadata.annotations.contains_key(key) {
                println!("    - {}", key);
            }
        }
    }

    match requeue {
        Some(after) => println!("  Next check in {}s", after.as_secs().to_string().dimmed()),
        None if new == old => println!("  {}", "Nothing to do".dimmed()),
        None => {}
    }
}
