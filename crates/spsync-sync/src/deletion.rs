//! Removal of remote files that no longer exist locally
//!
//! Only files below the upload root are considered. Paths are compared in
//! their sanitized remote form, so the local set must hold
//! [`FileRecord::remote_path`](spsync_core::domain::FileRecord::remote_path)
//! values (with converted Markdown already mapped to `.html`).

use std::collections::HashSet;

use anyhow::Result;
use spsync_core::domain::FolderHandle;
use spsync_core::ports::{IRemoteLibrary, RemoteItemKind};
use tracing::{debug, info, warn};

use crate::stats::{Counter, UploadStatistics};

/// A remote file and its path relative to the upload root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub id: String,
    pub path: String,
}

/// Lists every file below `root`, depth first.
pub async fn list_remote_files(remote: &dyn IRemoteLibrary, root: &FolderHandle) -> Result<Vec<RemoteFile>> {
    let mut files = Vec::new();
    let mut pending = vec![(root.clone(), String::new())];

    while let Some((folder, prefix)) = pending.pop() {
        for entry in remote.list_children(&folder).await? {
            let path = if prefix.is_empty() {
                entry.name.clone()
            } else {
                format!("{prefix}/{}", entry.name)
            };
            match entry.kind {
                RemoteItemKind::File => files.push(RemoteFile { id: entry.id, path }),
                RemoteItemKind::Folder => pending.push((FolderHandle::new(entry.id)?, path)),
            }
        }
    }

    Ok(files)
}

/// Remote files whose path is not in `local`.
pub fn orphans(remote_files: Vec<RemoteFile>, local: &HashSet<String>) -> Vec<RemoteFile> {
    remote_files
        .into_iter()
        .filter(|file| !local.contains(&file.path))
        .collect()
}

/// Deletes remote files below `root` that are absent from `local`.
///
/// Returns the number of files deleted. An empty `local` set deletes
/// nothing. Listing and deletion failures are logged, never raised.
pub async fn delete_orphans(
    remote: &dyn IRemoteLibrary,
    root: &FolderHandle,
    local: &HashSet<String>,
    stats: &UploadStatistics,
) -> usize {
    if local.is_empty() {
        warn!("No local files in the sync set, skipping remote deletion");
        return 0;
    }

    let remote_files = match list_remote_files(remote, root).await {
        Ok(files) => files,
        Err(e) => {
            warn!(error = %format!("{e:#}"), "Could not list remote files, skipping deletion");
            return 0;
        }
    };
    debug!(remote = remote_files.len(), local = local.len(), "Comparing remote and local files");

    let mut deleted = 0;
    for file in orphans(remote_files, local) {
        match remote.delete_item(&file.id).await {
            Ok(()) => {
                info!(path = %file.path, "Deleted remote file absent locally");
                stats.incr(Counter::DeletedFiles);
                deleted += 1;
            }
            Err(e) => warn!(path = %file.path, error = %format!("{e:#}"), "Could not delete remote file"),
        }
    }
    deleted
}
