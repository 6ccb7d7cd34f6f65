//! UploadEngine: moves one local file into the remote library
//!
//! ## Flow per file
//!
//! 1. Resolve (or create) the remote folder.
//! 2. Decide: in normal mode ask the [`ChangeDetector`]; in forced mode
//!    delete any same-named file and upload unconditionally.
//! 3. Transfer: a single request below the chunk threshold, a resumable
//!    session with per-chunk retry at or above it.
//! 4. Hand the fingerprint to the metadata write-back.
//!
//! The remote name is always the sanitized one; the local file is read in
//! place and never renamed or copied.
//!
//! The transfer is retried up to `max_retry` times without re-deciding, so a
//! file whose predecessor was deleted on an earlier attempt still counts as
//! replaced and each comparison is counted once. The engine counts
//! new, replaced and skipped files; failures are counted by the caller once
//! the last attempt has failed.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use spsync_core::config::Config;
use spsync_core::domain::{is_special_file, FileRecord, Fingerprint, FolderHandle};
use spsync_core::metadata_debug;
use spsync_core::ports::{
    ChunkOutcome, IRemoteLibrary, ProbeResult, RemoteItemKind, RemoteItemMetadata, UploadedItem,
};
use spsync_core::retry::RetryPolicy;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use crate::detector::ChangeDetector;
use crate::folders::FolderResolver;
use crate::hashing;
use crate::metadata_queue::{MetadataQueue, PendingMetadata};
use crate::stats::{Counter, UploadStatistics};
use crate::SyncError;

/// When fingerprints are written to the remote column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataMode {
    /// Queue the write for the batched rounds after all uploads.
    Batched,
    /// Write right after each upload.
    Immediate,
}

/// Tunables of the upload engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSettings {
    pub force_upload: bool,
    /// Files at or above this size use a resumable session.
    pub chunk_threshold: u64,
    /// Raised threshold for compound-extension and installer files.
    pub special_threshold: u64,
    /// Bytes per session chunk.
    pub chunk_size: u64,
    pub max_chunk_retries: u32,
    pub chunk_retry_delay: Duration,
    pub max_retry: u32,
    pub retry_delay: Duration,
    pub metadata_mode: MetadataMode,
}

impl UploadSettings {
    /// Settings from `config`; `chunk_size` comes from the remote adapter.
    pub fn from_config(config: &Config, chunk_size: u64) -> Self {
        Self {
            force_upload: config.sync.force_upload,
            chunk_threshold: config.upload.chunk_threshold_bytes(),
            special_threshold: config.upload.special_threshold_bytes(),
            chunk_size: chunk_size.max(1),
            max_chunk_retries: config.upload.max_chunk_retries,
            chunk_retry_delay: config.upload.chunk_retry_delay(),
            max_retry: config.sync.max_retry,
            retry_delay: Duration::from_secs(config.sync.retry_delay_secs),
            metadata_mode: if config.metadata.batched {
                MetadataMode::Batched
            } else {
                MetadataMode::Immediate
            },
        }
    }

    /// Threshold applied to a file named `name`.
    pub fn effective_threshold(&self, name: &str) -> u64 {
        if is_special_file(name) {
            self.chunk_threshold.max(self.special_threshold)
        } else {
            self.chunk_threshold
        }
    }
}

/// What earlier attempts for the same file established.
#[derive(Debug, Default)]
struct AttemptMemo {
    /// Local fingerprint, set once the file was found to need uploading
    decided: Option<Option<Fingerprint>>,
    /// A previous remote file was found (and deleted) on some attempt
    replaces_existing: bool,
}

/// Terminal outcome of a successful upload call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    New,
    Replaced,
    Skipped,
}

pub struct UploadEngine {
    remote: Arc<dyn IRemoteLibrary>,
    folders: Arc<FolderResolver>,
    detector: ChangeDetector,
    stats: Arc<UploadStatistics>,
    queue: Arc<MetadataQueue>,
    settings: UploadSettings,
    column_available: bool,
}

impl UploadEngine {
    pub fn new(
        remote: Arc<dyn IRemoteLibrary>,
        folders: Arc<FolderResolver>,
        stats: Arc<UploadStatistics>,
        queue: Arc<MetadataQueue>,
        settings: UploadSettings,
        column_available: bool,
    ) -> Self {
        let detector = ChangeDetector::new(Arc::clone(&remote), Arc::clone(&stats), column_available);
        Self {
            remote,
            folders,
            detector,
            stats,
            queue,
            settings,
            column_available,
        }
    }

    pub fn settings(&self) -> &UploadSettings {
        &self.settings
    }

    /// Uploads `record` below `root`, retrying the whole sequence.
    ///
    /// The upload decision is made once. Later attempts only clear the name
    /// again and retransfer, and the file still counts as replaced when an
    /// earlier attempt deleted its predecessor. The error of the final
    /// attempt is returned.
    pub async fn upload(&self, root: &FolderHandle, record: &FileRecord) -> Result<UploadOutcome> {
        let policy = RetryPolicy::fixed(self.settings.max_retry, self.settings.retry_delay);
        let operation = format!("upload {}", record.relative_path);
        let memo = Mutex::new(AttemptMemo::default());
        let this = self;
        let memo = &memo;
        policy
            .run(&operation, move |attempt| async move {
                if attempt > 0 {
                    info!(file = %record.relative_path, attempt, "Retrying upload");
                }
                let folder = this.folders.ensure_folder(root, &record.remote_dir).await;
                this.upload_once(&folder, record, memo).await
            })
            .await
    }

    async fn upload_once(
        &self,
        folder: &FolderHandle,
        record: &FileRecord,
        memo: &Mutex<AttemptMemo>,
    ) -> Result<UploadOutcome> {
        let decided = memo.lock().unwrap_or_else(PoisonError::into_inner).decided.clone();
        let (existing, fingerprint) = match decided {
            Some(fingerprint) => (self.probe_for_replace(folder, record).await, fingerprint),
            None if self.settings.force_upload => {
                let existing = self.probe_for_replace(folder, record).await;
                let fingerprint = match &record.fingerprint {
                    Some(fp) => Some(fp.clone()),
                    None => hashing::fingerprint(&record.local_path).await,
                };
                (existing, fingerprint)
            }
            None => {
                let decision = self.detector.needs_upload(record, folder).await;
                if !decision.needs_upload {
                    return Ok(UploadOutcome::Skipped);
                }
                (decision.existing, decision.fingerprint)
            }
        };

        {
            let mut memo = memo.lock().unwrap_or_else(PoisonError::into_inner);
            memo.decided = Some(fingerprint.clone());
            memo.replaces_existing |= existing.is_some();
        }
        if let Some(meta) = &existing {
            self.delete_existing(meta, record).await?;
        }

        let item = self.transfer(folder, record).await?;
        let is_update = memo.lock().unwrap_or_else(PoisonError::into_inner).replaces_existing;

        self.stats.add(Counter::BytesUploaded, record.size);
        self.stats.incr(if is_update {
            Counter::ReplacedFiles
        } else {
            Counter::NewFiles
        });
        info!(
            file = %record.relative_path,
            remote = %record.remote_path(),
            bytes = record.size,
            replaced = is_update,
            "Uploaded"
        );

        if let Some(fp) = fingerprint {
            self.save_fingerprint(&item, record, fp, is_update).await;
        }

        Ok(if is_update {
            UploadOutcome::Replaced
        } else {
            UploadOutcome::New
        })
    }

    /// Existing same-named file in forced mode. A folder in the way only
    /// skips the delete step.
    async fn probe_for_replace(&self, folder: &FolderHandle, record: &FileRecord) -> Option<RemoteItemMetadata> {
        match self.remote.probe_item(folder, &record.remote_name, false).await {
            ProbeResult::Found(meta) if meta.kind == RemoteItemKind::Folder => {
                let e = SyncError::FolderInTheWay(record.remote_name.clone());
                warn!(file = %record.relative_path, error = %e, "Not deleting");
                None
            }
            ProbeResult::Found(meta) => Some(meta),
            ProbeResult::NotFound => None,
            ProbeResult::Error(detail) => {
                warn!(file = %record.relative_path, error = %detail, "Existence check failed");
                None
            }
        }
    }

    async fn delete_existing(&self, meta: &RemoteItemMetadata, record: &FileRecord) -> Result<()> {
        debug!(file = %record.relative_path, item_id = %meta.id, "Deleting existing remote file");
        self.remote
            .delete_item(&meta.id)
            .await
            .with_context(|| format!("Failed to delete existing '{}'", record.remote_path()))
    }

    async fn transfer(&self, folder: &FolderHandle, record: &FileRecord) -> Result<UploadedItem> {
        let threshold = self.settings.effective_threshold(&record.remote_name);
        if record.size < threshold {
            let data = tokio::fs::read(&record.local_path)
                .await
                .with_context(|| format!("Failed to read {}", record.local_path.display()))?;
            self.remote
                .upload_small(folder, &record.remote_name, data)
                .await
                .with_context(|| format!("Upload of '{}' failed", record.remote_path()))
        } else {
            self.upload_session(folder, record).await
        }
    }

    async fn upload_session(&self, folder: &FolderHandle, record: &FileRecord) -> Result<UploadedItem> {
        let upload_url = self
            .remote
            .create_upload_session(folder, &record.remote_name)
            .await
            .with_context(|| format!("Could not open upload session for '{}'", record.remote_path()))?;

        let mut file = tokio::fs::File::open(&record.local_path)
            .await
            .with_context(|| format!("Failed to open {}", record.local_path.display()))?;
        let total = file.metadata().await?.len();
        let chunk_size = self.settings.chunk_size;
        let policy = RetryPolicy::fixed(self.settings.max_chunk_retries, self.settings.chunk_retry_delay);

        let mut buffer = vec![0u8; chunk_size.min(total.max(1)) as usize];
        let mut offset = 0u64;
        while offset < total {
            let len = chunk_size.min(total - offset) as usize;
            file.read_exact(&mut buffer[..len]).await?;
            let chunk = &buffer[..len];

            let remote = &self.remote;
            let url = upload_url.as_str();
            let outcome = policy
                .run("upload chunk", move |_| remote.upload_chunk(url, chunk, offset, total))
                .await
                .with_context(|| {
                    format!("Chunk at offset {offset} of '{}' failed", record.remote_path())
                })?;

            offset += len as u64;
            debug!(file = %record.relative_path, offset, total, "Chunk accepted");
            if let ChunkOutcome::Completed(item) = outcome {
                return Ok(item);
            }
        }

        Err(SyncError::IncompleteSession(record.remote_path()).into())
    }

    async fn save_fingerprint(&self, item: &UploadedItem, record: &FileRecord, fingerprint: Fingerprint, is_update: bool) {
        if !self.column_available {
            return;
        }

        match self.settings.metadata_mode {
            MetadataMode::Batched => {
                metadata_debug!(item_id = %item.id, fingerprint = %fingerprint, "Queueing fingerprint");
                self.queue.enqueue(PendingMetadata {
                    item_id: item.id.clone(),
                    filename: record.remote_name.clone(),
                    fingerprint,
                    is_update,
                    display_path: record.relative_path.clone(),
                });
            }
            MetadataMode::Immediate => match self.remote.write_fingerprint(&item.id, &fingerprint).await {
                Ok(()) => {
                    metadata_debug!(item_id = %item.id, fingerprint = %fingerprint, "Fingerprint saved");
                    self.stats.incr(if is_update {
                        Counter::HashUpdated
                    } else {
                        Counter::HashNewSaved
                    });
                }
                Err(e) => {
                    warn!(file = %record.relative_path, error = %format!("{e:#}"), "Could not save fingerprint");
                    self.stats.incr(Counter::HashSaveFailed);
                }
            },
        }
    }
}
