//! Upload operations for Microsoft Graph API (SharePoint drives)
//!
//! Provides functions for uploading files into a document library:
//! - [`upload_small`] - Single-request upload for files below the chunk threshold
//! - [`create_upload_session`] - Creates a resumable upload session
//! - [`upload_chunk`] - Uploads a single chunk within a session
//!
//! The chunk loop itself, with its per-chunk retry, lives in the sync
//! engine; this module only speaks the wire protocol.
//!
//! ## Microsoft Graph API References
//!
//! - [Upload small files](https://learn.microsoft.com/en-us/graph/api/driveitem-put-content)
//! - [Upload large files](https://learn.microsoft.com/en-us/graph/api/driveitem-createuploadsession)

use anyhow::{Context, Result};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use spsync_core::domain::FolderHandle;
use spsync_core::ports::{ChunkOutcome, UploadedItem};
use tracing::debug;

use crate::client::GraphClient;
use crate::{encode_segment, error_from_response};

/// Upload session chunks must be multiples of 320 KiB.
pub const CHUNK_ALIGNMENT: u64 = 320 * 1024;

/// Largest chunk Graph accepts per request.
pub const MAX_CHUNK_SIZE: u64 = 60 * 1024 * 1024;

/// Chunk size used for a session: `threshold` rounded up to a multiple of
/// 320 KiB, capped at 60 MiB.
pub fn session_chunk_size(threshold: u64) -> u64 {
    let aligned = threshold.max(1).div_ceil(CHUNK_ALIGNMENT) * CHUNK_ALIGNMENT;
    aligned.min(MAX_CHUNK_SIZE)
}

// ============================================================================
// Graph API DriveItem response types for deserialization
// ============================================================================

/// DriveItem returned by a completed upload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphDriveItem {
    /// Drive item ID
    id: String,
    /// Item name
    name: String,
    /// File size in bytes
    size: Option<u64>,
    /// Present if the item is a file
    file: Option<serde_json::Value>,
}

impl From<GraphDriveItem> for UploadedItem {
    fn from(item: GraphDriveItem) -> Self {
        Self {
            id: item.id,
            name: item.name,
            size: item.size,
        }
    }
}

/// Response from creating an upload session
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadSessionResponse {
    /// The URL to use for uploading chunks
    upload_url: String,
}

/// Item-by-path address of `name` under the folder `parent`.
fn build_item_path(drive_id: &str, parent: &FolderHandle, name: &str, suffix: &str) -> String {
    format!(
        "/drives/{drive_id}/items/{parent}:/{}:/{suffix}",
        encode_segment(name)
    )
}

// ============================================================================
// upload_small
// ============================================================================

/// Uploads a file in a single PUT request
///
/// Uses the simple upload API: `PUT /drives/{drive}/items/{parent}:/{name}:/content`.
pub async fn upload_small(
    client: &GraphClient,
    drive_id: &str,
    parent: &FolderHandle,
    name: &str,
    data: Vec<u8>,
) -> Result<UploadedItem> {
    let path = build_item_path(drive_id, parent, name, "content");
    debug!(bytes = data.len(), name, "Uploading small file");

    let response = client
        .execute(Method::PUT, &path, |r| {
            r.header("Content-Type", "application/octet-stream")
                .body(data.clone())
        })
        .await
        .context("Failed to send small upload request")?;

    let item: GraphDriveItem = GraphClient::json_or_error(response, "small upload").await?;
    debug!(id = %item.id, name = %item.name, "Small upload completed");
    Ok(item.into())
}

// ============================================================================
// create_upload_session
// ============================================================================

/// Creates a resumable upload session that replaces any existing item
///
/// Uses `POST /drives/{drive}/items/{parent}:/{name}:/createUploadSession`.
/// The returned upload URL is pre-authorized and used with [`upload_chunk`].
pub async fn create_upload_session(
    client: &GraphClient,
    drive_id: &str,
    parent: &FolderHandle,
    name: &str,
) -> Result<String> {
    let path = build_item_path(drive_id, parent, name, "createUploadSession");
    debug!(name, "Creating upload session");

    let body = serde_json::json!({
        "item": { "@microsoft.graph.conflictBehavior": "replace" }
    });
    let response = client
        .execute(Method::POST, &path, |r| r.json(&body))
        .await
        .context("Failed to create upload session")?;

    let session: UploadSessionResponse =
        GraphClient::json_or_error(response, "create upload session").await?;
    debug!(name, "Upload session created");
    Ok(session.upload_url)
}

// ============================================================================
// upload_chunk
// ============================================================================

/// Uploads a single chunk of data to a resumable upload session
///
/// Sends a plain PUT to the session URL with `Content-Length` and
/// `Content-Range` headers. Not retried here: the caller owns the chunk
/// retry policy.
///
/// # Returns
/// - [`ChunkOutcome::Accepted`] for intermediate chunks (HTTP 202)
/// - [`ChunkOutcome::Completed`] with the final item (HTTP 200/201)
pub async fn upload_chunk(
    client: &GraphClient,
    upload_url: &str,
    data: &[u8],
    offset: u64,
    total: u64,
) -> Result<ChunkOutcome> {
    let chunk_len = data.len() as u64;
    let range_end = offset + chunk_len.saturating_sub(1);
    let content_range = format!("bytes {offset}-{range_end}/{total}");

    debug!(range = %content_range, bytes = chunk_len, "Uploading chunk");

    let response = client
        .http_client()
        .put(upload_url)
        .header("Content-Length", chunk_len.to_string())
        .header("Content-Range", &content_range)
        .body(data.to_vec())
        .send()
        .await
        .context("Failed to send chunk upload request")?;

    client.monitor().observe(response.headers());

    match response.status() {
        StatusCode::ACCEPTED => {
            debug!(range = %content_range, "Chunk accepted");
            Ok(ChunkOutcome::Accepted)
        }
        StatusCode::OK | StatusCode::CREATED => {
            let item: GraphDriveItem = response
                .json()
                .await
                .context("Failed to parse final chunk response")?;
            debug!(id = %item.id, "Upload session completed");
            Ok(ChunkOutcome::Completed(item.into()))
        }
        _ => Err(error_from_response(response).await)
            .with_context(|| format!("Chunk upload failed for range {content_range}")),
    }
}

// ============================================================================
// Tests
// ============================================================================
