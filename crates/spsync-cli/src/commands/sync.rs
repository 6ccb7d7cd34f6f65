//! Sync command - publish local files into the document library
//!
//! Provides the `spsync sync` CLI command which:
//! 1. Merges command-line and environment overrides into the configuration
//! 2. Discovers the local files selected by the glob
//! 3. Authenticates, resolves the library and checks the fingerprint column
//! 4. Runs the orchestrator and prints a summary
//!
//! The process exits with status 1 when any file failed.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;
use spsync_core::config::Config;
use spsync_graph::provider::GraphLibrary;
use spsync_graph::upload::session_chunk_size;
use spsync_sync::discovery;
use spsync_sync::markdown::MermaidCliRenderer;
use spsync_sync::orchestrator::{OrchestratorSettings, SyncOrchestrator, SyncReport};
use spsync_sync::stats::format_bytes;
use spsync_sync::uploader::UploadSettings;
use spsync_sync::SyncError;
use tracing::info;

use crate::output::{get_formatter, ConsoleProgress, OutputFormat, OutputFormatter};

#[derive(Debug, Default, Args)]
pub struct SyncCommand {
    /// Azure AD tenant ID
    #[arg(long, env = "SPSYNC_TENANT_ID")]
    pub tenant_id: Option<String>,

    /// Application (client) ID
    #[arg(long, env = "SPSYNC_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Client secret
    #[arg(long, env = "SPSYNC_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// SharePoint host, e.g. contoso.sharepoint.com
    #[arg(long)]
    pub host_name: Option<String>,

    /// Site name as it appears after /sites/
    #[arg(long)]
    pub site_name: Option<String>,

    /// Library and folder to upload into, e.g. "Documents/Reports"
    #[arg(long)]
    pub upload_path: Option<String>,

    /// Glob selecting the local files
    #[arg(long)]
    pub file_path: Option<String>,

    /// Do not descend into matched directories
    #[arg(long)]
    pub no_recursive: bool,

    /// Upload every file regardless of remote state
    #[arg(long)]
    pub force: bool,

    /// Upload Markdown files as they are
    #[arg(long)]
    pub no_convert_md: bool,

    /// Comma-separated exclusion patterns, added to the configured ones
    #[arg(long)]
    pub exclude: Option<String>,

    /// Delete remote files that no longer exist locally
    #[arg(long)]
    pub sync_delete: bool,

    /// Number of parallel uploads
    #[arg(long)]
    pub workers: Option<usize>,

    /// Display name of the fingerprint column
    #[arg(long)]
    pub column: Option<String>,

    /// Write each fingerprint right after its upload
    #[arg(long)]
    pub immediate_metadata: bool,

    /// Also list files that were left unchanged
    #[arg(long)]
    pub show_skipped: bool,
}

impl SyncCommand {
    /// Applies flags (and their environment fallbacks) on top of `config`.
    pub fn apply_overrides(&self, config: &mut Config) {
        let sp = &mut config.sharepoint;
        let strings = [
            (&self.tenant_id, &mut sp.tenant_id),
            (&self.client_id, &mut sp.client_id),
            (&self.client_secret, &mut sp.client_secret),
            (&self.host_name, &mut sp.host_name),
            (&self.site_name, &mut sp.site_name),
            (&self.upload_path, &mut sp.upload_path),
            (&self.file_path, &mut config.sync.file_path),
            (&self.column, &mut config.metadata.column_name),
        ];
        for (flag, field) in strings {
            if let Some(value) = flag {
                *field = value.clone();
            }
        }

        if self.no_recursive {
            config.sync.recursive = false;
        }
        if self.force {
            config.sync.force_upload = true;
        }
        if self.no_convert_md {
            config.sync.convert_md_to_html = false;
        }
        if self.sync_delete {
            config.sync.sync_delete = true;
        }
        if self.immediate_metadata {
            config.metadata.batched = false;
        }
        if let Some(workers) = self.workers {
            config.sync.max_workers = workers;
        }
        if let Some(exclude) = &self.exclude {
            config.sync.exclude_patterns.extend(
                exclude
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(String::from),
            );
        }
    }

    pub async fn execute(&self, mut config: Config, format: OutputFormat) -> Result<ExitCode> {
        let formatter = get_formatter(matches!(format, OutputFormat::Json));
        self.apply_overrides(&mut config);
        super::ensure_valid(&config)?;

        // Step 1: Local selection
        let selection = match discovery::discover(
            &config.sync.file_path,
            config.sync.recursive,
            &config.sync.exclude_patterns,
        ) {
            Ok(selection) => selection,
            Err(SyncError::NoFilesMatched { pattern, excluded }) => {
                formatter.warn(&format!("No files matched '{pattern}' ({excluded} excluded)"));
                return Ok(ExitCode::SUCCESS);
            }
            Err(e) => return Err(e.into()),
        };
        let records = selection.records();
        info!(
            files = records.len(),
            excluded = selection.excluded,
            base = %selection.base.display(),
            "Discovered local files"
        );

        // Step 2: Remote target
        let client = super::graph_client(&config).await?;
        let library = super::resolve_target(&client, &config).await?;
        let column = super::column_manager(&client, &config).ensure_column(&library).await;
        if !column.available {
            formatter.warn(&format!(
                "Column '{}' is unavailable on '{}', comparing by size only",
                config.metadata.column_name, column.library_name
            ));
        }
        let column_available = column.available;
        let library_root = library.root.clone();
        let remote = Arc::new(GraphLibrary::new(client, library, column));

        // Step 3: Run
        let upload = UploadSettings::from_config(
            &config,
            session_chunk_size(config.upload.chunk_threshold_bytes()),
        );
        let orchestrator = SyncOrchestrator::new(
            remote,
            upload,
            OrchestratorSettings::from_config(&config),
            column_available,
        )
        .with_renderer(Arc::new(MermaidCliRenderer::new()))
        .with_progress(Arc::new(ConsoleProgress::new(format, self.show_skipped)));

        let started_at = chrono::Utc::now();
        let started = Instant::now();
        let root = orchestrator
            .upload_root(&library_root, &config.library_subpath())
            .await
            .context("Upload destination could not be resolved")?;
        let report = orchestrator.run(&root, records).await?;
        let duration_ms = started.elapsed().as_millis() as u64;

        // Step 4: Summary
        if matches!(format, OutputFormat::Json) {
            let mut json = serde_json::to_value(&report)?;
            json["started_at"] = serde_json::json!(started_at.to_rfc3339());
            json["duration_ms"] = serde_json::json!(duration_ms);
            json["target"] = serde_json::json!(format!("{}/{}", config.tenant_url(), config.sharepoint.upload_path));
            json["efficiency"] = serde_json::json!(report.stats.efficiency());
            json["bandwidth_saved"] = serde_json::json!(report.stats.bandwidth_saved());
            formatter.print_json(&json);
        } else {
            print_summary(formatter.as_ref(), &report, duration_ms, config.sync.sync_delete);
        }

        Ok(if report.stats.failed_files > 0 {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        })
    }
}

fn plural(n: u64) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

fn print_summary(formatter: &dyn OutputFormatter, report: &SyncReport, duration_ms: u64, sync_delete: bool) {
    let s = &report.stats;
    let duration_display = if duration_ms >= 1000 {
        format!("{:.1}s", duration_ms as f64 / 1000.0)
    } else {
        format!("{}ms", duration_ms)
    };

    if s.failed_files > 0 {
        formatter.error(&format!(
            "{} file{} failed ({} processed in {})",
            s.failed_files,
            plural(s.failed_files),
            s.total_processed(),
            duration_display
        ));
    } else if s.new_files + s.replaced_files == 0 {
        formatter.success(&format!("Already up to date ({})", duration_display));
    } else {
        formatter.success(&format!("Sync completed in {}", duration_display));
    }

    formatter.info(&format!("New:        {} file{}", s.new_files, plural(s.new_files)));
    formatter.info(&format!("Updated:    {} file{}", s.replaced_files, plural(s.replaced_files)));
    formatter.info(&format!("Unchanged:  {} file{}", s.skipped_files, plural(s.skipped_files)));
    if sync_delete {
        formatter.info(&format!("Deleted:    {} file{}", s.deleted_files, plural(s.deleted_files)));
    }
    if report.converted_markdown > 0 {
        formatter.info(&format!("Markdown:   {} converted to HTML", report.converted_markdown));
    }
    formatter.info(&format!(
        "Transfer:   {} sent, {} skipped ({:.1}% saved)",
        format_bytes(s.bytes_uploaded),
        format_bytes(s.bytes_skipped),
        s.bandwidth_saved() * 100.0
    ));
    formatter.info(&format!(
        "Efficiency: {:.1}% of files needed no upload",
        s.efficiency() * 100.0
    ));
    formatter.info(&format!(
        "Compared:   {} by fingerprint, {} by size",
        s.compared_by_hash, s.compared_by_size
    ));

    if report.column_available {
        formatter.info(&format!(
            "Fingerprints: {} saved, {} updated, {} matched, {} failed",
            s.hash_new_saved, s.hash_updated, s.hash_matched, s.hash_save_failed
        ));
    }
    if report.metadata_unsaved > 0 {
        formatter.warn(&format!(
            "{} fingerprint{} could not be saved and will be re-uploaded next run",
            report.metadata_unsaved,
            plural(report.metadata_unsaved as u64)
        ));
    }

    if let Some(limits) = &report.rate_limits {
        formatter.info(&format!(
            "Throttling: {} ({} requests, {} throttled, peak {:.0}%)",
            limits.status,
            limits.total_requests,
            limits.throttled_requests,
            limits.max_utilization * 100.0
        ));
    }
}
