//! Terrace CLI
//!
//! Renders blueprints locally and inspects deploy items without a cluster.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::{Config, OutputFormat};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "terrace")]
#[command(about = "Terrace blueprint and deploy item tooling", long_about = None)]
struct Cli {
    /// Output format of printed documents
    #[arg(long, short, env = "TERRACE_OUTPUT", value_enum, default_value = "yaml")]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so rendered documents can be piped
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "terrace_cli=info,terrace_pipeline=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = Config { output: cli.output };

    handle_command(cli.command, &config).await
}
