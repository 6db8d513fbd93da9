//! Torsync CLI - Command-line interface
//!
//! Keeps torrents mirrored across the daemons listed in the settings
//! directory.

mod catalog;
mod commands;
mod file_cache;
mod settings;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use torsync_core::tracing_setup::{CliLogLevel, init_tracing};

use crate::settings::Settings;

#[derive(Parser)]
#[command(name = "torsync")]
#[command(about = "Keeps torrents replicated across a fleet of torrent daemons")]
struct Cli {
    /// Settings directory (default: $HOME/.torrentsync)
    #[arg(long, global = true)]
    settings_dir: Option<PathBuf>,

    /// Console log level
    #[arg(long, global = true, value_enum, default_value = "info")]
    log_level: CliLogLevel,

    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings_dir = Settings::resolve_dir(cli.settings_dir)?;
    let settings = Settings::bootstrap(&settings_dir)
        .with_context(|| format!("preparing settings in {}", settings_dir.display()))?;
    init_tracing(cli.log_level.as_tracing_level(), &settings.logs_dir())
        .context("initializing logging")?;

    if let Err(error) = commands::handle_command(cli.command, &settings).await {
        tracing::error!("{}", error);
        anyhow::bail!(error.user_message());
    }

    Ok(())
}
