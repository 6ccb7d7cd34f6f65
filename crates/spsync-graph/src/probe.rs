//! Remote item lookup with custom fields
//!
//! One existence check per file: the item is addressed by name under its
//! parent folder, and when the fingerprint column is usable the list item
//! fields are expanded in the same request.

use reqwest::{Method, StatusCode};
use serde::Deserialize;
use spsync_core::domain::{Fingerprint, FolderHandle};
use spsync_core::metadata_debug;
use spsync_core::ports::{ProbeResult, RemoteFingerprint, RemoteItemKind, RemoteItemMetadata};
use tracing::{debug, warn};

use crate::client::GraphClient;
use crate::{encode_segment, error_from_response};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProbedItem {
    id: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    folder: Option<serde_json::Value>,
    #[serde(default)]
    list_item: Option<ProbedListItem>,
}

#[derive(Debug, Deserialize)]
struct ProbedListItem {
    #[serde(default)]
    fields: serde_json::Map<String, serde_json::Value>,
}

impl ProbedItem {
    fn kind(&self) -> RemoteItemKind {
        if self.folder.is_some() {
            RemoteItemKind::Folder
        } else {
            RemoteItemKind::File
        }
    }

    fn fingerprint(&self, field: &str) -> RemoteFingerprint {
        let value = self
            .list_item
            .as_ref()
            .and_then(|li| li.fields.get(field))
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        match value {
            Some(v) => RemoteFingerprint::Value(Fingerprint::new(v)),
            None => RemoteFingerprint::Empty,
        }
    }
}

enum Fetch {
    Item(ProbedItem),
    NotFound,
    Failed(String),
}

async fn fetch(client: &GraphClient, path: &str) -> Fetch {
    let response = match client.execute(Method::GET, path, |r| r).await {
        Ok(response) => response,
        Err(e) => return Fetch::Failed(e.to_string()),
    };
    if response.status() == StatusCode::NOT_FOUND {
        return Fetch::NotFound;
    }
    if !response.status().is_success() {
        return Fetch::Failed(error_from_response(response).await.to_string());
    }
    match response.json::<ProbedItem>().await {
        Ok(item) => Fetch::Item(item),
        Err(e) => Fetch::Failed(format!("unparseable item: {e}")),
    }
}

/// Looks up `name` under `folder`.
///
/// With `field` set, the fingerprint column is read in the same request. If
/// that expanded read fails, a plain read decides existence and the
/// fingerprint is reported as unreadable.
pub async fn probe_item(
    client: &GraphClient,
    drive_id: &str,
    folder: &FolderHandle,
    name: &str,
    field: Option<&str>,
) -> ProbeResult {
    let plain = format!("/drives/{drive_id}/items/{folder}:/{}", encode_segment(name));

    let Some(field) = field else {
        return match fetch(client, &plain).await {
            Fetch::Item(item) => ProbeResult::Found(RemoteItemMetadata {
                kind: item.kind(),
                id: item.id,
                size: item.size,
                fingerprint: RemoteFingerprint::ColumnUnavailable,
            }),
            Fetch::NotFound => ProbeResult::NotFound,
            Fetch::Failed(detail) => ProbeResult::Error(detail),
        };
    };

    let expanded = format!("{plain}?$expand=listItem($expand=fields($select={field}))");
    let expand_error = match fetch(client, &expanded).await {
        Fetch::Item(item) => {
            let fingerprint = item.fingerprint(field);
            metadata_debug!(name, item_id = %item.id, fingerprint = ?fingerprint, "Probed remote item");
            return ProbeResult::Found(RemoteItemMetadata {
                kind: item.kind(),
                id: item.id,
                size: item.size,
                fingerprint,
            });
        }
        Fetch::NotFound => return ProbeResult::NotFound,
        Fetch::Failed(detail) => detail,
    };

    debug!(name, error = %expand_error, "Expanded read failed, retrying without fields");
    match fetch(client, &plain).await {
        Fetch::Item(item) => ProbeResult::Found(RemoteItemMetadata {
            kind: item.kind(),
            id: item.id,
            size: item.size,
            fingerprint: RemoteFingerprint::Unreadable(expand_error),
        }),
        Fetch::NotFound => ProbeResult::NotFound,
        Fetch::Failed(detail) => {
            warn!(name, error = %detail, "Remote item lookup failed");
            ProbeResult::Error(detail)
        }
    }
}
