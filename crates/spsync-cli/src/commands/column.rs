//! Check-column command - make sure the fingerprint column exists
//!
//! Creates the column when it is missing, runs the verification probe and
//! prints the internal field name that fingerprints will be written to.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use spsync_core::config::Config;
use tracing::info;

use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct CheckColumnCommand {
    /// Display name of the column to check
    #[arg(long)]
    pub column: Option<String>,
}

impl CheckColumnCommand {
    pub async fn execute(&self, mut config: Config, format: OutputFormat) -> Result<ExitCode> {
        let formatter = get_formatter(matches!(format, OutputFormat::Json));
        if let Some(column) = &self.column {
            config.metadata.column_name = column.clone();
        }
        super::ensure_valid(&config)?;

        let client = super::graph_client(&config).await?;
        let library = super::resolve_target(&client, &config).await?;
        let status = super::column_manager(&client, &config)
            .ensure_column(&library)
            .await;
        info!(available = status.available, field = %status.field_name, "Column check finished");

        if matches!(format, OutputFormat::Json) {
            formatter.print_json(&serde_json::json!({
                "column": config.metadata.column_name,
                "library": status.library_name,
                "available": status.available,
                "field_name": status.field_name,
            }));
        } else if status.available {
            formatter.success(&format!(
                "Column '{}' is ready on '{}'",
                config.metadata.column_name, status.library_name
            ));
            formatter.info(&format!("Internal name: {}", status.field_name));
        } else {
            formatter.error(&format!(
                "Column '{}' is unavailable on '{}'; changes will be detected by size",
                config.metadata.column_name, status.library_name
            ));
        }

        Ok(if status.available {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        })
    }
}
