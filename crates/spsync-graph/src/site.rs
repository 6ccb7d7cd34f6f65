//! Site, library and drive resolution
//!
//! Turns the configured host, site and library name into the identifiers
//! every later call needs. Any failure here is fatal for the run.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use spsync_core::domain::FolderHandle;
use tracing::{info, warn};

use crate::client::GraphClient;

/// Display name of the default document library.
pub const DEFAULT_LIBRARY_DISPLAY_NAME: &str = "Documents";
/// Internal name of the default document library.
pub const DEFAULT_LIBRARY_INTERNAL_NAME: &str = "Shared Documents";

#[derive(Debug, Deserialize)]
struct IdOnly {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListEntry {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListCollection {
    #[serde(default)]
    value: Vec<ListEntry>,
}

/// Identifiers of one resolved document library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryContext {
    pub site_id: String,
    pub list_id: String,
    /// Display name of the library actually used
    pub list_name: String,
    pub drive_id: String,
    /// Root folder of the library's drive
    pub root: FolderHandle,
}

/// Resolves the site id of `https://{host}/sites/{site}`.
pub async fn resolve_site(client: &GraphClient, host_name: &str, site_name: &str) -> Result<String> {
    let path = format!("/sites/{host_name}:/sites/{site_name}");
    let site: IdOnly = client
        .get_json(&path)
        .await
        .with_context(|| format!("Failed to resolve site {host_name}/sites/{site_name}"))?;
    info!(site_id = %site.id, "Resolved site");
    Ok(site.id)
}

fn find_list<'a>(lists: &'a [ListEntry], wanted: &str) -> Option<&'a ListEntry> {
    lists.iter().find(|l| {
        l.display_name.as_deref() == Some(wanted) || l.name.as_deref() == Some(wanted)
    })
}

fn find_default_library(lists: &[ListEntry]) -> Option<&ListEntry> {
    lists.iter().find(|l| {
        l.display_name.as_deref() == Some(DEFAULT_LIBRARY_DISPLAY_NAME)
            || l.name.as_deref() == Some(DEFAULT_LIBRARY_INTERNAL_NAME)
    })
}

/// Finds the list named `library` on the site, falling back to the default
/// document library. Returns `(list_id, display_name)`.
pub async fn resolve_list(client: &GraphClient, site_id: &str, library: &str) -> Result<(String, String)> {
    let lists: ListCollection = client
        .get_json(&format!("/sites/{site_id}/lists"))
        .await
        .context("Failed to list site libraries")?;

    let entry = match find_list(&lists.value, library) {
        Some(entry) => entry,
        None => {
            warn!(library, "Library not found, falling back to the default document library");
            match find_default_library(&lists.value) {
                Some(entry) => entry,
                None => bail!("Neither library '{library}' nor the default document library exists"),
            }
        }
    };

    let display = entry
        .display_name
        .clone()
        .or_else(|| entry.name.clone())
        .unwrap_or_else(|| library.to_string());
    Ok((entry.id.clone(), display))
}

/// Resolves site, list, drive and drive root in one go.
pub async fn resolve_library(
    client: &GraphClient,
    host_name: &str,
    site_name: &str,
    library: &str,
) -> Result<LibraryContext> {
    let site_id = resolve_site(client, host_name, site_name).await?;
    let (list_id, list_name) = resolve_list(client, &site_id, library).await?;

    let drive: IdOnly = client
        .get_json(&format!("/sites/{site_id}/lists/{list_id}/drive"))
        .await
        .with_context(|| format!("Failed to resolve drive of library '{list_name}'"))?;

    let root: IdOnly = client
        .get_json(&format!("/drives/{}/root", drive.id))
        .await
        .context("Failed to resolve drive root")?;

    info!(library = %list_name, drive_id = %drive.id, "Resolved document library");

    Ok(LibraryContext {
        site_id,
        list_id,
        list_name,
        drive_id: drive.id,
        root: FolderHandle::new(root.id)?,
    })
}
