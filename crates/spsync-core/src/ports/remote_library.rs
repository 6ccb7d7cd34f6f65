//! Remote document library port (driven/secondary port)
//!
//! This module defines the interface the sync engine uses to talk to a
//! SharePoint/OneDrive document library. The Graph adapter in
//! `spsync-graph` implements it; engine tests use an in-memory double.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because errors at port boundaries are adapter-specific.
//! - Existence checks return [`ProbeResult`] instead of an error for "not
//!   found", so callers branch on a value rather than on error downcasts.
//! - Remote metadata is modelled as explicit variants ([`RemoteFingerprint`],
//!   `Option` sizes) so the "unknown" branches cannot be forgotten.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::newtypes::{Fingerprint, FolderHandle};

// ============================================================================
// Remote item DTOs
// ============================================================================

/// Whether a remote item is a file or a folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteItemKind {
    File,
    Folder,
}

/// State of the fingerprint column on one remote item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteFingerprint {
    /// The column holds a value.
    Value(Fingerprint),
    /// The column exists but this item has no value yet.
    Empty,
    /// The library has no usable fingerprint column.
    ColumnUnavailable,
    /// The item was found but its fields could not be read.
    Unreadable(String),
}

impl RemoteFingerprint {
    /// The stored value, if there is one.
    pub fn value(&self) -> Option<&Fingerprint> {
        match self {
            Self::Value(fp) => Some(fp),
            _ => None,
        }
    }
}

/// Remote item as seen by one existence check
///
/// Fetched fresh for every check and never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteItemMetadata {
    /// Drive item id
    pub id: String,
    pub kind: RemoteItemKind,
    /// Size in bytes, when reported
    pub size: Option<u64>,
    pub fingerprint: RemoteFingerprint,
}

/// Outcome of looking up one item by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    Found(RemoteItemMetadata),
    /// Confirmed absence (404 or equivalent)
    NotFound,
    /// Any other failure; the detail is for logs only
    Error(String),
}

/// Outcome of a folder creation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderCreation {
    Created(FolderHandle),
    /// A child with the same name appeared first.
    AlreadyExists,
}

/// One child of a remote folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub id: String,
    pub name: String,
    pub kind: RemoteItemKind,
    pub size: Option<u64>,
}

/// Item returned by a completed upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedItem {
    pub id: String,
    pub name: String,
    pub size: Option<u64>,
}

/// Result of sending one chunk to an upload session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Intermediate chunk stored (HTTP 202)
    Accepted,
    /// Final chunk stored; the item is complete
    Completed(UploadedItem),
}

/// One pending fingerprint write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataWrite {
    pub item_id: String,
    pub fingerprint: Fingerprint,
}

/// Throttling telemetry aggregated over a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateLimitSummary {
    pub total_requests: u64,
    pub throttled_requests: u64,
    pub alerts_triggered: u64,
    pub throttle_rate: f64,
    pub average_utilization: f64,
    pub max_utilization: f64,
    pub resource_units_consumed: u64,
    pub last_scope: Option<String>,
    /// One-line verdict, e.g. "stayed within limits"
    pub status: String,
}

// ============================================================================
// IRemoteLibrary trait
// ============================================================================

/// Operations on one resolved document library (site, list and drive)
#[async_trait]
pub trait IRemoteLibrary: Send + Sync {
    /// Looks up `name` directly under `folder`.
    ///
    /// When `with_fingerprint` is false the fingerprint is reported as
    /// [`RemoteFingerprint::ColumnUnavailable`] without reading fields.
    async fn probe_item(&self, folder: &FolderHandle, name: &str, with_fingerprint: bool)
        -> ProbeResult;

    /// Lists the direct children of `folder`.
    async fn list_children(&self, folder: &FolderHandle) -> Result<Vec<RemoteEntry>>;

    /// Creates `name` under `parent`, reporting a name conflict as
    /// [`FolderCreation::AlreadyExists`] instead of an error.
    async fn create_folder(&self, parent: &FolderHandle, name: &str) -> Result<FolderCreation>;

    /// Deletes an item. Deleting an item that is already gone succeeds.
    async fn delete_item(&self, item_id: &str) -> Result<()>;

    /// Uploads `data` as `name` in a single request.
    async fn upload_small(
        &self,
        folder: &FolderHandle,
        name: &str,
        data: Vec<u8>,
    ) -> Result<UploadedItem>;

    /// Opens a resumable upload session and returns its upload URL.
    async fn create_upload_session(&self, folder: &FolderHandle, name: &str) -> Result<String>;

    /// Sends one byte range of a session. Not retried by the adapter.
    async fn upload_chunk(
        &self,
        upload_url: &str,
        data: &[u8],
        offset: u64,
        total: u64,
    ) -> Result<ChunkOutcome>;

    /// Stores a fingerprint in the custom column of one item.
    async fn write_fingerprint(&self, item_id: &str, fingerprint: &Fingerprint) -> Result<()>;

    /// Stores many fingerprints with batched requests of at most `batch_size`.
    ///
    /// Every item id in `writes` appears in the result; `false` marks a failure.
    async fn write_fingerprints(
        &self,
        writes: &[MetadataWrite],
        batch_size: usize,
    ) -> HashMap<String, bool>;

    /// Whether recent responses report high throttle utilization.
    fn should_slow_down(&self) -> bool {
        false
    }

    /// Throttling telemetry collected so far, if the adapter tracks any.
    fn rate_limit_summary(&self) -> Option<RateLimitSummary> {
        None
    }
}
