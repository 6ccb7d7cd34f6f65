//! Config command - view and validate spsync configuration
//!
//! Provides the `spsync config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON) with the secret masked
//! 2. Validates the configuration file and reports every error
//! 3. Prints the configuration file location

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Subcommand;
use spsync_core::config::Config;
use tracing::info;

use crate::output::{get_formatter, OutputFormat};

const MASK: &str = "********";

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the effective configuration
    Show,
    /// Validate the configuration file
    Validate,
    /// Print the configuration file path
    Path,
}

/// Copy of `config` safe to print.
fn masked(config: &Config) -> Config {
    let mut shown = config.clone();
    if !shown.sharepoint.client_secret.is_empty() {
        shown.sharepoint.client_secret = MASK.to_string();
    }
    shown
}

impl ConfigCommand {
    pub fn execute(&self, config: &Config, path: &Path, format: OutputFormat) -> Result<ExitCode> {
        match self {
            ConfigCommand::Show => Self::execute_show(config, path, format),
            ConfigCommand::Validate => Ok(Self::execute_validate(path, format)),
            ConfigCommand::Path => {
                let formatter = get_formatter(matches!(format, OutputFormat::Json));
                if matches!(format, OutputFormat::Json) {
                    formatter.print_json(&serde_json::json!({
                        "config_path": path.display().to_string(),
                        "exists": path.exists(),
                    }));
                } else {
                    println!("{}", path.display());
                }
                Ok(ExitCode::SUCCESS)
            }
        }
    }

    fn execute_show(config: &Config, path: &Path, format: OutputFormat) -> Result<ExitCode> {
        let formatter = get_formatter(matches!(format, OutputFormat::Json));
        let shown = masked(config);
        info!(config_path = %path.display(), "Showing configuration");

        if matches!(format, OutputFormat::Json) {
            let json = serde_json::to_value(&shown)
                .context("Failed to serialize configuration to JSON")?;
            formatter.print_json(&json);
        } else {
            formatter.success(&format!("Configuration ({})", path.display()));
            formatter.info("");
            let yaml = serde_yaml::to_string(&shown)
                .context("Failed to serialize configuration to YAML")?;
            for line in yaml.lines() {
                formatter.info(line);
            }
        }
        Ok(ExitCode::SUCCESS)
    }

    fn execute_validate(path: &Path, format: OutputFormat) -> ExitCode {
        let formatter = get_formatter(matches!(format, OutputFormat::Json));

        // The file itself must load, defaults do not count
        let config = match Config::load(path) {
            Ok(config) => config,
            Err(e) => {
                if matches!(format, OutputFormat::Json) {
                    formatter.print_json(&serde_json::json!({
                        "valid": false,
                        "config_path": path.display().to_string(),
                        "errors": [format!("failed to load: {e}")],
                    }));
                } else {
                    formatter.error(&format!("Cannot load {}: {e}", path.display()));
                }
                return ExitCode::FAILURE;
            }
        };

        let errors = config.validate();
        if matches!(format, OutputFormat::Json) {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            formatter.print_json(&serde_json::json!({
                "valid": errors.is_empty(),
                "config_path": path.display().to_string(),
                "errors": messages,
            }));
        } else if errors.is_empty() {
            formatter.success(&format!("{} is valid", path.display()));
        } else {
            formatter.error(&format!(
                "{} has {} problem{}",
                path.display(),
                errors.len(),
                if errors.len() == 1 { "" } else { "s" }
            ));
            for error in &errors {
                formatter.info(&format!("- {error}"));
            }
        }

        if errors.is_empty() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }
}
