//! Folder listing, creation and deletion

use anyhow::{Context, Result};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use spsync_core::domain::FolderHandle;
use spsync_core::ports::{FolderCreation, RemoteEntry, RemoteItemKind};
use tracing::{debug, info};

use crate::client::GraphClient;
use crate::error_from_response;

#[derive(Debug, Deserialize)]
struct ChildItem {
    id: String,
    name: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    folder: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChildPage {
    #[serde(default)]
    value: Vec<ChildItem>,
    #[serde(rename = "@odata.nextLink", default)]
    next_link: Option<String>,
}

impl From<ChildItem> for RemoteEntry {
    fn from(item: ChildItem) -> Self {
        let kind = if item.folder.is_some() {
            RemoteItemKind::Folder
        } else {
            RemoteItemKind::File
        };
        Self {
            id: item.id,
            name: item.name,
            kind,
            size: item.size,
        }
    }
}

/// Lists every child of `folder`, following `@odata.nextLink` pages.
pub async fn list_children(
    client: &GraphClient,
    drive_id: &str,
    folder: &FolderHandle,
) -> Result<Vec<RemoteEntry>> {
    let mut entries = Vec::new();
    let mut next = Some(format!("/drives/{drive_id}/items/{folder}/children"));

    while let Some(path) = next.take() {
        let page: ChildPage = client
            .get_json(&path)
            .await
            .with_context(|| format!("Failed to list children of folder {folder}"))?;
        entries.extend(page.value.into_iter().map(RemoteEntry::from));
        next = page.next_link;
    }

    debug!(folder = %folder, count = entries.len(), "Listed folder children");
    Ok(entries)
}

/// Creates folder `name` under `parent`.
///
/// The request asks Graph to fail on a name clash, so a concurrent creator
/// shows up as [`FolderCreation::AlreadyExists`].
pub async fn create_folder(
    client: &GraphClient,
    drive_id: &str,
    parent: &FolderHandle,
    name: &str,
) -> Result<FolderCreation> {
    let body = serde_json::json!({
        "name": name,
        "folder": {},
        "@microsoft.graph.conflictBehavior": "fail"
    });
    let path = format!("/drives/{drive_id}/items/{parent}/children");

    let response = client
        .execute_allowing_conflict(Method::POST, &path, |r| r.json(&body))
        .await?;

    if response.status() == StatusCode::CONFLICT {
        debug!(name, parent = %parent, "Folder already exists");
        return Ok(FolderCreation::AlreadyExists);
    }

    let created: ChildItem = GraphClient::json_or_error(response, "create folder").await?;
    info!(name, id = %created.id, "Created folder");
    Ok(FolderCreation::Created(FolderHandle::new(created.id)?))
}

/// Deletes an item; an item that is already gone counts as deleted.
pub async fn delete_item(client: &GraphClient, drive_id: &str, item_id: &str) -> Result<()> {
    let path = format!("/drives/{drive_id}/items/{item_id}");
    let response = client.execute(Method::DELETE, &path, |r| r).await?;

    match response.status() {
        status if status.is_success() => {
            debug!(item_id, "Deleted item");
            Ok(())
        }
        StatusCode::NOT_FOUND => {
            debug!(item_id, "Item already deleted");
            Ok(())
        }
        _ => Err(error_from_response(response).await)
            .with_context(|| format!("Failed to delete item {item_id}")),
    }
}
