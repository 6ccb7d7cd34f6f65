//! spsync Sync - Change detection and upload orchestration engine
//!
//! Provides:
//! - Content fingerprints with size-adaptive chunked reads
//! - Per-file upload decisions against the remote fingerprint column
//! - Idempotent, single-flight remote folder materialization
//! - Simple and resumable uploads with bounded retry
//! - Batched, multi-round fingerprint write-back
//! - Markdown to HTML conversion with rendered diagrams
//!
//! ## Modules
//!
//! - [`hashing`] - XXH3-128 fingerprints
//! - [`detector`] - ChangeDetector, the skip/upload decision
//! - [`folders`] - FolderResolver and its per-run cache
//! - [`uploader`] - UploadEngine
//! - [`metadata_queue`] - Pending fingerprint writes
//! - [`stats`] - Atomic run statistics
//! - [`markdown`] - Markdown rendering and diagram sanitization
//! - [`discovery`] - Local file enumeration and exclusion
//! - [`deletion`] - Removal of remote files absent locally
//! - [`orchestrator`] - Worker pool, phases and the write-back rounds
//!
//! The engine only talks to the remote side through
//! [`spsync_core::ports::IRemoteLibrary`].

pub mod deletion;
pub mod detector;
pub mod discovery;
pub mod folders;
pub mod hashing;
pub mod markdown;
pub mod metadata_queue;
pub mod orchestrator;
pub mod stats;
pub mod uploader;

use thiserror::Error;

/// Errors that can occur during synchronization operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// A matched directory could not be read
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// The file-selection glob is malformed
    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Nothing matched the selection, or every match was excluded
    #[error("No files matched '{pattern}' ({excluded} excluded)")]
    NoFilesMatched { pattern: String, excluded: usize },

    /// A same-named folder occupies the file's remote name
    #[error("A folder named '{0}' already exists at the destination")]
    FolderInTheWay(String),

    /// A resumable upload ended without a final item
    #[error("Upload session for '{0}' ended without a completed item")]
    IncompleteSession(String),
}
