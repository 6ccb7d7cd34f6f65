//! FolderResolver: idempotent remote folder materialization
//!
//! Walks a relative folder path one segment at a time, reusing cached
//! handles, finding existing folders, and creating missing ones. The cache
//! holds one `OnceCell` per path prefix, so concurrent workers asking for the
//! same prefix wait on a single lookup-or-create instead of racing. A create
//! that loses to another client (name conflict) re-lists the parent and uses
//! the folder that won.
//!
//! For per-file folders a segment that cannot be resolved is logged and the
//! deepest folder resolved so far is returned. The upload root uses the
//! strict variant, which fails instead. Failed prefixes are not cached, so a
//! later call tries again.

use std::sync::Arc;

use anyhow::{bail, Result};
use dashmap::DashMap;
use spsync_core::domain::{sanitize_path, FolderHandle};
use spsync_core::ports::{FolderCreation, IRemoteLibrary, RemoteItemKind};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

pub struct FolderResolver {
    remote: Arc<dyn IRemoteLibrary>,
    cache: DashMap<String, Arc<OnceCell<FolderHandle>>>,
}

impl FolderResolver {
    pub fn new(remote: Arc<dyn IRemoteLibrary>) -> Self {
        Self {
            remote,
            cache: DashMap::new(),
        }
    }

    /// Number of resolved folder prefixes.
    pub fn cached_len(&self) -> usize {
        self.cache.iter().filter(|entry| entry.value().initialized()).count()
    }

    /// Ensures `relative_path` exists below `root` and returns its handle.
    ///
    /// Every segment is sanitized as a folder name. An empty path is `root`.
    pub async fn ensure_folder(&self, root: &FolderHandle, relative_path: &str) -> FolderHandle {
        match self.walk(root, relative_path).await {
            Ok(handle) => handle,
            Err((deepest, e)) => {
                warn!(
                    path = relative_path,
                    error = %format!("{e:#}"),
                    "Could not resolve folder, using the last resolved parent"
                );
                deepest
            }
        }
    }

    /// Like [`ensure_folder`](Self::ensure_folder), but any unresolved
    /// segment is an error instead of a fallback to a parent.
    pub async fn ensure_folder_strict(&self, root: &FolderHandle, relative_path: &str) -> Result<FolderHandle> {
        self.walk(root, relative_path)
            .await
            .map_err(|(_, e)| e.context(format!("Could not resolve folder '{relative_path}'")))
    }

    /// Resolves every segment. On failure returns the deepest folder reached.
    async fn walk(
        &self,
        root: &FolderHandle,
        relative_path: &str,
    ) -> std::result::Result<FolderHandle, (FolderHandle, anyhow::Error)> {
        let mut current = root.clone();
        let mut key = root.to_string();

        for segment in sanitize_path(relative_path, false) {
            key.push('/');
            key.push_str(&segment);

            let cell = self.cache.entry(key.clone()).or_default().clone();
            let parent = current.clone();
            let resolved = cell
                .get_or_try_init(|| self.resolve_segment(&parent, &segment))
                .await;

            match resolved {
                Ok(handle) => current = handle.clone(),
                Err(e) => return Err((current, e.context(format!("segment '{segment}'")))),
            }
        }

        Ok(current)
    }

    async fn find_child_folder(&self, parent: &FolderHandle, name: &str) -> Result<Option<FolderHandle>> {
        let children = self.remote.list_children(parent).await?;
        let found = children
            .into_iter()
            .find(|c| c.kind == RemoteItemKind::Folder && c.name.eq_ignore_ascii_case(name));
        match found {
            Some(entry) => Ok(Some(FolderHandle::new(entry.id)?)),
            None => Ok(None),
        }
    }

    async fn resolve_segment(&self, parent: &FolderHandle, name: &str) -> Result<FolderHandle> {
        if let Some(existing) = self.find_child_folder(parent, name).await? {
            debug!(name, "Found existing folder");
            return Ok(existing);
        }

        match self.remote.create_folder(parent, name).await? {
            FolderCreation::Created(handle) => {
                info!(name, "Created remote folder");
                Ok(handle)
            }
            FolderCreation::AlreadyExists => {
                debug!(name, "Folder created concurrently, re-querying");
                match self.find_child_folder(parent, name).await? {
                    Some(handle) => Ok(handle),
                    None => bail!("Folder '{name}' reported as existing but not listed"),
                }
            }
        }
    }
}
