//! Fingerprint write-back
//!
//! Fingerprints are stored through the list item behind a drive item:
//! `PATCH /drives/{drive}/items/{id}/listItem/fields`. Many writes are sent
//! through the JSON `$batch` endpoint, at most `batch_size` per request.

use std::collections::HashMap;

use anyhow::{Context, Result};
use reqwest::Method;
use serde::Deserialize;
use spsync_core::domain::Fingerprint;
use spsync_core::metadata_debug;
use spsync_core::ports::MetadataWrite;
use tracing::warn;

use crate::client::GraphClient;

/// Graph rejects batches larger than this.
pub const MAX_BATCH_SIZE: usize = 20;

fn fields_path(drive_id: &str, item_id: &str) -> String {
    format!("/drives/{drive_id}/items/{item_id}/listItem/fields")
}

/// Writes one fingerprint.
pub async fn write_fingerprint(
    client: &GraphClient,
    drive_id: &str,
    field: &str,
    item_id: &str,
    fingerprint: &Fingerprint,
) -> Result<()> {
    let body = serde_json::json!({ field: fingerprint.as_str() });
    metadata_debug!(item_id, field, fingerprint = %fingerprint, "Writing fingerprint");

    let response = client
        .execute(Method::PATCH, &fields_path(drive_id, item_id), |r| r.json(&body))
        .await?;
    let _: serde_json::Value = GraphClient::json_or_error(response, "fingerprint write")
        .await
        .with_context(|| format!("Failed to write fingerprint of item {item_id}"))?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    responses: Vec<BatchSubResponse>,
}

#[derive(Debug, Deserialize)]
struct BatchSubResponse {
    id: String,
    status: u16,
}

fn batch_body(drive_id: &str, field: &str, writes: &[MetadataWrite]) -> serde_json::Value {
    let requests: Vec<_> = writes
        .iter()
        .enumerate()
        .map(|(index, write)| {
            serde_json::json!({
                "id": index.to_string(),
                "method": "PATCH",
                "url": fields_path(drive_id, &write.item_id),
                "body": { field: write.fingerprint.as_str() },
                "headers": { "Content-Type": "application/json" }
            })
        })
        .collect();
    serde_json::json!({ "requests": requests })
}

async fn send_batch(
    client: &GraphClient,
    drive_id: &str,
    field: &str,
    writes: &[MetadataWrite],
) -> Result<BatchResponse> {
    let body = batch_body(drive_id, field, writes);
    let response = client
        .execute(Method::POST, "/$batch", |r| r.json(&body))
        .await?;
    GraphClient::json_or_error(response, "$batch").await
}

/// Writes many fingerprints with `$batch` requests of at most `batch_size`.
///
/// Every item id sent is present in the result. Sub-responses map back by
/// their index id; a missing sub-response or a failed batch request marks
/// the affected entries failed.
pub async fn write_fingerprints(
    client: &GraphClient,
    drive_id: &str,
    field: &str,
    writes: &[MetadataWrite],
    batch_size: usize,
) -> HashMap<String, bool> {
    let mut results = HashMap::with_capacity(writes.len());
    let batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);

    for chunk in writes.chunks(batch_size) {
        for write in chunk {
            results.insert(write.item_id.clone(), false);
        }

        match send_batch(client, drive_id, field, chunk).await {
            Ok(batch) => {
                for sub in batch.responses {
                    let Some(write) = sub.id.parse::<usize>().ok().and_then(|i| chunk.get(i)) else {
                        warn!(id = %sub.id, "Batch response with unknown id");
                        continue;
                    };
                    let ok = (200..300).contains(&sub.status);
                    if !ok {
                        metadata_debug!(item_id = %write.item_id, status = sub.status, "Batched fingerprint write failed");
                    }
                    results.insert(write.item_id.clone(), ok);
                }
            }
            Err(e) => {
                warn!(entries = chunk.len(), error = %format!("{e:#}"), "Batch request failed");
            }
        }
    }

    results
}
