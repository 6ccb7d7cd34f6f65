//! spsync CLI - publishes local files into a SharePoint document library
//!
//! Provides commands for:
//! - Synchronizing a local file selection into a library
//! - Checking (and creating) the fingerprint column
//! - Viewing and validating configuration

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use spsync_core::config::Config;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{column::CheckColumnCommand, config::ConfigCommand, sync::SyncCommand};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(
    name = "spsync",
    version,
    about = "Incremental upload of local files to SharePoint Online"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Upload new and changed files to the document library
    Sync(SyncCommand),
    /// Ensure the fingerprint column exists on the target library
    CheckColumn(CheckColumnCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// An explicit `--config` must load; the default location may be absent.
    fn load_config(&self) -> Result<Config> {
        match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display())),
            None => Ok(Config::load_or_default(&Config::default_path())),
        }
    }

    fn log_level<'a>(&self, config: &'a Config) -> &'a str {
        match (self.verbose, self.quiet) {
            (0, true) => "warn",
            (0, false) => config.logging.level.as_str(),
            (1, _) => "debug",
            _ => "trace",
        }
    }
}

fn init_tracing(level: &str, json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    init_tracing(cli.log_level(&config), config.logging.json);

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    match &cli.command {
        Commands::Sync(cmd) => cmd.execute(config, format).await,
        Commands::CheckColumn(cmd) => cmd.execute(config, format).await,
        Commands::Config(cmd) => cmd.execute(&config, &cli.config_path(), format),
    }
}
