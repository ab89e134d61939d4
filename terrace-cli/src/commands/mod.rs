//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod imports;
mod render;
mod timeouts;

use anyhow::Result;
use clap::Subcommand;
use std::path::PathBuf;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Render the deploy items and subinstallations of a blueprint
    Render(render::RenderCommand),
    /// Check imports against the import definitions of a blueprint
    ValidateImports {
        /// Directory holding blueprint.yaml
        blueprint_dir: PathBuf,

        /// YAML file of the form {imports: {...}}
        #[arg(short, long)]
        imports: PathBuf,
    },
    /// Run the timeout checks against a deploy item manifest
    CheckTimeouts(timeouts::CheckTimeoutsCommand),
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
///
/// # Arguments
/// * `command` - The command to execute
/// * `config` - The CLI configuration
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Render(cmd) => render::handle_render_command(cmd, config).await,
        Commands::ValidateImports {
            blueprint_dir,
            imports,
        } => imports::validate_imports_file(&blueprint_dir, &imports).await,
        Commands::CheckTimeouts(cmd) => timeouts::handle_check_timeouts(cmd, config).await,
    }
}
