//! Sync orchestration
//!
//! A run has four strictly ordered phases:
//!
//! 1. **Markdown**: `.md` files are converted to HTML and uploaded
//! 2. **Regular files**: everything else is uploaded
//! 3. **Metadata**: queued fingerprints are written in up to three rounds
//! 4. **Sync-delete** (optional): remote files absent locally are removed
//!
//! Phases 1 and 2 run on a bounded worker pool. Between task completions
//! the orchestrator consults the rate-limit monitor and pauses while
//! utilization is high.
//!
//! ## Metadata rounds
//!
//! SharePoint post-processes some uploads (sanitization, indexing, virus
//! scan) before custom-column writes on them succeed. Failed writes are
//! therefore retried after a delay picked from the failed file types, and
//! once more after a longer delay with smaller batches. Whatever still fails
//! is reported and left for the next run.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use spsync_core::config::Config;
use spsync_core::domain::{FileFamily, FileRecord, FolderHandle};
use spsync_core::metadata_debug;
use spsync_core::ports::{IDiagramRenderer, IRemoteLibrary, MetadataWrite, NoDiagrams, RateLimitSummary};
use tracing::{debug, error, info, warn};

use crate::deletion;
use crate::folders::FolderResolver;
use crate::hashing;
use crate::markdown::MarkdownConverter;
use crate::metadata_queue::{MetadataQueue, PendingMetadata};
use crate::stats::{Counter, StatsSnapshot, UploadStatistics};
use crate::uploader::{UploadEngine, UploadOutcome, UploadSettings};

/// Delays and batch sizes of the metadata rounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataFlushSettings {
    pub batch_size: usize,
    /// Batch size of the final round
    pub final_batch_size: usize,
    /// Wait before round 2 when a markup file failed
    pub markup_delay: Duration,
    /// Wait before round 2 when a document failed
    pub document_delay: Duration,
    pub default_delay: Duration,
    /// Wait before the final round
    pub final_delay: Duration,
}

impl MetadataFlushSettings {
    /// Wait before retrying `failed`, chosen by the most demanding file family.
    pub fn retry_delay(&self, failed: &[PendingMetadata]) -> Duration {
        let families: HashSet<FileFamily> = failed.iter().map(|e| FileFamily::of(&e.filename)).collect();
        if families.contains(&FileFamily::Markup) {
            self.markup_delay
        } else if families.contains(&FileFamily::Document) {
            self.document_delay
        } else {
            self.default_delay
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub max_workers: usize,
    /// Pause inserted between completions while the library is throttling
    pub pacing_pause: Duration,
    pub convert_markdown: bool,
    pub sync_delete: bool,
    pub metadata: MetadataFlushSettings,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        let m = &config.metadata;
        Self {
            max_workers: config.sync.max_workers.max(1),
            pacing_pause: Duration::from_millis(config.sync.pacing_pause_ms),
            convert_markdown: config.sync.convert_md_to_html,
            sync_delete: config.sync.sync_delete,
            metadata: MetadataFlushSettings {
                batch_size: m.batch_size,
                final_batch_size: m.final_batch_size,
                markup_delay: Duration::from_secs(m.markup_delay_secs),
                document_delay: Duration::from_secs(m.document_delay_secs),
                default_delay: Duration::from_secs(m.default_delay_secs),
                final_delay: Duration::from_secs(m.final_delay_secs),
            },
        }
    }
}

/// Terminal state of one file, as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    New,
    Replaced,
    Skipped,
    Failed(String),
}

impl From<UploadOutcome> for FileStatus {
    fn from(outcome: UploadOutcome) -> Self {
        match outcome {
            UploadOutcome::New => Self::New,
            UploadOutcome::Replaced => Self::Replaced,
            UploadOutcome::Skipped => Self::Skipped,
        }
    }
}

/// Receives one call per finished file.
pub trait ProgressReporter: Send + Sync {
    fn file_finished(&self, path: &str, status: &FileStatus);
}

/// Reporter that discards everything.
#[derive(Debug, Default)]
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn file_finished(&self, _path: &str, _status: &FileStatus) {}
}

/// Outcome of a run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub stats: StatsSnapshot,
    pub rate_limits: Option<RateLimitSummary>,
    pub column_available: bool,
    /// Markdown files published as HTML
    pub converted_markdown: usize,
    /// Fingerprints still unsaved after the final metadata round
    pub metadata_unsaved: usize,
}

pub struct SyncOrchestrator {
    remote: Arc<dyn IRemoteLibrary>,
    folders: Arc<FolderResolver>,
    engine: UploadEngine,
    converter: MarkdownConverter,
    stats: Arc<UploadStatistics>,
    queue: Arc<MetadataQueue>,
    settings: OrchestratorSettings,
    progress: Arc<dyn ProgressReporter>,
    converted: Mutex<HashSet<PathBuf>>,
    column_available: bool,
}

impl SyncOrchestrator {
    pub fn new(
        remote: Arc<dyn IRemoteLibrary>,
        upload: UploadSettings,
        settings: OrchestratorSettings,
        column_available: bool,
    ) -> Self {
        let folders = Arc::new(FolderResolver::new(Arc::clone(&remote)));
        let stats = Arc::new(UploadStatistics::new());
        let queue = Arc::new(MetadataQueue::new());
        let engine = UploadEngine::new(
            Arc::clone(&remote),
            Arc::clone(&folders),
            Arc::clone(&stats),
            Arc::clone(&queue),
            upload,
            column_available,
        );
        Self {
            remote,
            folders,
            engine,
            converter: MarkdownConverter::new(Arc::new(NoDiagrams)),
            stats,
            queue,
            settings,
            progress: Arc::new(SilentProgress),
            converted: Mutex::new(HashSet::new()),
            column_available,
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn IDiagramRenderer>) -> Self {
        self.converter = MarkdownConverter::new(renderer);
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn stats(&self) -> &Arc<UploadStatistics> {
        &self.stats
    }

    pub fn queue(&self) -> &Arc<MetadataQueue> {
        &self.queue
    }

    pub fn folders(&self) -> &Arc<FolderResolver> {
        &self.folders
    }

    /// Materializes `subpath` below the library root and returns its handle.
    ///
    /// Fails when any segment cannot be resolved, so a run never falls back
    /// to an ancestor of the requested destination.
    pub async fn upload_root(&self, library_root: &FolderHandle, subpath: &str) -> Result<FolderHandle> {
        self.folders.ensure_folder_strict(library_root, subpath).await
    }

    fn is_markdown(&self, record: &FileRecord) -> bool {
        self.settings.convert_markdown && record.relative_path.to_ascii_lowercase().ends_with(".md")
    }

    /// Runs all phases for `records` below `root`.
    pub async fn run(&self, root: &FolderHandle, records: Vec<FileRecord>) -> Result<SyncReport> {
        let workdir = tempfile::tempdir().context("Failed to create conversion directory")?;
        let (markdown, regular): (Vec<_>, Vec<_>) = records.into_iter().partition(|r| self.is_markdown(r));
        info!(
            markdown = markdown.len(),
            regular = regular.len(),
            workers = self.settings.max_workers,
            "Starting sync"
        );

        let mut local_paths = HashSet::new();
        local_paths.extend(self.process_phase(root, markdown, Some(workdir.path())).await);
        local_paths.extend(self.process_phase(root, regular, None).await);

        let metadata_unsaved = if self.column_available {
            self.flush_metadata().await
        } else {
            0
        };

        if self.settings.sync_delete {
            deletion::delete_orphans(self.remote.as_ref(), root, &local_paths, &self.stats).await;
        }

        let converted_markdown = self.converted.lock().unwrap_or_else(PoisonError::into_inner).len();
        let report = SyncReport {
            stats: self.stats.snapshot(),
            rate_limits: self.remote.rate_limit_summary(),
            column_available: self.column_available,
            converted_markdown,
            metadata_unsaved,
        };
        info!(
            processed = report.stats.total_processed(),
            failed = report.stats.failed_files,
            "Sync finished"
        );
        Ok(report)
    }

    /// Processes one phase on the worker pool and returns the remote paths
    /// of every file it considered.
    async fn process_phase(&self, root: &FolderHandle, records: Vec<FileRecord>, convert_into: Option<&Path>) -> Vec<String> {
        let tasks = records.into_iter().enumerate().map(move |(index, record)| {
            let scratch = convert_into.map(|dir| dir.join(index.to_string()));
            self.process_file(root, record, scratch)
        });
        let mut results = stream::iter(tasks).buffer_unordered(self.settings.max_workers.max(1));

        let mut remote_paths = Vec::new();
        while let Some(path) = results.next().await {
            remote_paths.push(path);
            if self.remote.should_slow_down() {
                debug!(pause_ms = self.settings.pacing_pause.as_millis() as u64, "High utilization, pacing");
                tokio::time::sleep(self.settings.pacing_pause).await;
            }
        }
        remote_paths
    }

    async fn process_file(&self, root: &FolderHandle, record: FileRecord, scratch: Option<PathBuf>) -> String {
        let record = match scratch {
            Some(dir) => self.prepare_markdown(record, &dir).await,
            None => record,
        };
        let remote_path = record.remote_path();

        let status = match self.engine.upload(root, &record).await {
            Ok(outcome) => FileStatus::from(outcome),
            Err(e) => {
                let message = format!("{e:#}");
                error!(file = %record.relative_path, error = %message, "Upload failed");
                self.stats.incr(Counter::FailedFiles);
                FileStatus::Failed(message)
            }
        };
        self.progress.file_finished(&record.relative_path, &status);
        remote_path
    }

    /// Converts a Markdown record into an HTML record with a known
    /// fingerprint, falling back to the raw file.
    async fn prepare_markdown(&self, record: FileRecord, dir: &Path) -> FileRecord {
        let html_path = match self.converter.convert_file(&record.local_path, dir).await {
            Ok(path) => path,
            Err(e) => {
                warn!(file = %record.relative_path, error = %format!("{e:#}"), "Conversion failed, uploading Markdown");
                return record;
            }
        };
        let size = match tokio::fs::metadata(&html_path).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                warn!(file = %record.relative_path, error = %e, "Converted file unreadable, uploading Markdown");
                return record;
            }
        };

        let stem = &record.relative_path[..record.relative_path.len() - 3];
        let mut html = FileRecord::new(html_path, &format!("{stem}.html"), size);
        if let Some(fp) = hashing::fingerprint(&html.local_path).await {
            html = html.with_fingerprint(fp);
        }

        self.converted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.local_path.clone());
        debug!(file = %record.relative_path, html = %html.relative_path, "Converted Markdown");
        html
    }

    /// Writes every queued fingerprint; returns how many stayed unsaved.
    async fn flush_metadata(&self) -> usize {
        let pending = self.queue.drain();
        if pending.is_empty() {
            return 0;
        }
        let m = &self.settings.metadata;
        info!(count = pending.len(), "Saving fingerprints");

        let failed = self.write_round(pending, m.batch_size, true).await;
        if failed.is_empty() {
            return 0;
        }

        let delay = m.retry_delay(&failed);
        info!(failed = failed.len(), delay_ms = delay.as_millis() as u64, "Retrying fingerprint writes");
        tokio::time::sleep(delay).await;
        let failed = self.write_round(failed, m.batch_size, false).await;
        if failed.is_empty() {
            return 0;
        }

        info!(
            failed = failed.len(),
            delay_ms = m.final_delay.as_millis() as u64,
            batch_size = m.final_batch_size,
            "Final fingerprint write round"
        );
        tokio::time::sleep(m.final_delay).await;
        let failed = self.write_round(failed, m.final_batch_size, false).await;
        for entry in &failed {
            warn!(file = %entry.display_path, item_id = %entry.item_id, "Fingerprint not saved");
        }
        failed.len()
    }

    /// Sends one round and returns the entries that failed.
    ///
    /// The first round counts failures; later rounds move recovered entries
    /// from failed to saved.
    async fn write_round(&self, entries: Vec<PendingMetadata>, batch_size: usize, first: bool) -> Vec<PendingMetadata> {
        let writes: Vec<MetadataWrite> = entries.iter().map(PendingMetadata::as_write).collect();
        let results = self.remote.write_fingerprints(&writes, batch_size.max(1)).await;

        let mut failed = Vec::new();
        for entry in entries {
            if results.get(&entry.item_id).copied().unwrap_or(false) {
                if !first {
                    self.stats.decr(Counter::HashSaveFailed);
                }
                self.stats.incr(if entry.is_update {
                    Counter::HashUpdated
                } else {
                    Counter::HashNewSaved
                });
                metadata_debug!(file = %entry.display_path, item_id = %entry.item_id, "Fingerprint saved");
            } else {
                if first {
                    self.stats.incr(Counter::HashSaveFailed);
                }
                failed.push(entry);
            }
        }
        failed
    }
}
