//! ChangeDetector: does a local file need uploading?
//!
//! ## Decision order
//!
//! 1. Use the pre-supplied fingerprint (converted Markdown) or compute one.
//! 2. Probe the remote item by its sanitized name.
//! 3. Absent, or the probe failed: upload as a new file.
//! 4. Both fingerprints known: equal means skip.
//! 5. Otherwise compare sizes: equal means skip, different or unknown
//!    means upload.
//!
//! Exactly one of `compared_by_hash` / `compared_by_size` is counted per
//! decision that reaches a comparison.

use std::sync::Arc;

use spsync_core::domain::{FileRecord, Fingerprint, FolderHandle};
use spsync_core::ports::{IRemoteLibrary, ProbeResult, RemoteItemKind, RemoteItemMetadata};
use tracing::{debug, warn};

use crate::hashing;
use crate::stats::{Counter, UploadStatistics};

/// Outcome of one upload decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub needs_upload: bool,
    /// The remote file currently occupying the name, if any
    pub existing: Option<RemoteItemMetadata>,
    /// Local fingerprint, `None` when the file could not be read
    pub fingerprint: Option<Fingerprint>,
}

impl Decision {
    /// Whether a remote file with the same name exists.
    pub fn exists(&self) -> bool {
        self.existing.is_some()
    }

    fn upload_new(fingerprint: Option<Fingerprint>) -> Self {
        Self {
            needs_upload: true,
            existing: None,
            fingerprint,
        }
    }
}

/// How the decision compared local and remote content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    Hash,
    Size,
}

pub struct ChangeDetector {
    remote: Arc<dyn IRemoteLibrary>,
    stats: Arc<UploadStatistics>,
    use_fingerprint: bool,
}

impl ChangeDetector {
    /// `use_fingerprint` is false when the library has no usable column.
    pub fn new(remote: Arc<dyn IRemoteLibrary>, stats: Arc<UploadStatistics>, use_fingerprint: bool) -> Self {
        Self {
            remote,
            stats,
            use_fingerprint,
        }
    }

    /// Decides whether `record` must be uploaded into `folder`.
    pub async fn needs_upload(&self, record: &FileRecord, folder: &FolderHandle) -> Decision {
        let fingerprint = match &record.fingerprint {
            Some(fp) => Some(fp.clone()),
            None => hashing::fingerprint(&record.local_path).await,
        };

        let meta = match self
            .remote
            .probe_item(folder, &record.remote_name, self.use_fingerprint)
            .await
        {
            ProbeResult::NotFound => {
                debug!(file = %record.relative_path, "Not on remote, uploading as new");
                return Decision::upload_new(fingerprint);
            }
            ProbeResult::Error(detail) => {
                warn!(file = %record.relative_path, error = %detail, "Existence check failed, treating as new");
                return Decision::upload_new(fingerprint);
            }
            ProbeResult::Found(meta) => meta,
        };

        if meta.kind == RemoteItemKind::Folder {
            warn!(file = %record.relative_path, "A folder occupies this name on the remote");
            return Decision::upload_new(fingerprint);
        }

        let Some(local) = fingerprint.as_ref() else {
            debug!(file = %record.relative_path, "Local fingerprint unknown, uploading");
            return Decision {
                needs_upload: true,
                existing: Some(meta),
                fingerprint,
            };
        };

        let (comparison, unchanged) = match meta.fingerprint.value() {
            Some(remote) => (Comparison::Hash, remote.as_str().eq_ignore_ascii_case(local.as_str())),
            None => (Comparison::Size, meta.size == Some(record.size)),
        };

        match comparison {
            Comparison::Hash => self.stats.incr(Counter::ComparedByHash),
            Comparison::Size => self.stats.incr(Counter::ComparedBySize),
        }

        if unchanged {
            self.stats.incr(Counter::SkippedFiles);
            self.stats.add(Counter::BytesSkipped, record.size);
            if comparison == Comparison::Hash {
                self.stats.incr(Counter::HashMatched);
            }
            debug!(file = %record.relative_path, ?comparison, "Unchanged, skipping");
        } else {
            debug!(file = %record.relative_path, ?comparison, "Changed, uploading");
        }

        Decision {
            needs_upload: !unchanged,
            existing: Some(meta),
            fingerprint,
        }
    }
}
