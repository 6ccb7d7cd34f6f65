//! Shared test helpers for engine integration tests
//!
//! [`FakeLibrary`] is an in-memory document library. It records folder
//! creations per path, deletions, uploads, chunk calls and fingerprint
//! writes, and can inject chunk and metadata failures.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use spsync_core::domain::{FileRecord, Fingerprint, FolderHandle};
use spsync_core::ports::{
    ChunkOutcome, FolderCreation, IRemoteLibrary, MetadataWrite, ProbeResult, RemoteEntry,
    RemoteFingerprint, RemoteItemKind, RemoteItemMetadata, UploadedItem,
};
use spsync_sync::orchestrator::{MetadataFlushSettings, OrchestratorSettings, SyncOrchestrator};
use spsync_sync::uploader::{MetadataMode, UploadSettings};

pub const ROOT: &str = "root";
pub const MIB: u64 = 1024 * 1024;
/// 4 MiB rounded up to a multiple of 320 KiB
pub const CHUNK_SIZE: u64 = 4_259_840;

#[derive(Debug, Clone)]
pub struct Node {
    pub id: String,
    pub parent: String,
    pub name: String,
    pub kind: RemoteItemKind,
    pub size: u64,
    pub fingerprint: Option<Fingerprint>,
}

#[derive(Debug)]
struct Session {
    parent: String,
    name: String,
    received: u64,
}

#[derive(Debug, Default)]
struct State {
    items: HashMap<String, Node>,
    sessions: HashMap<String, Session>,
    creates: HashMap<String, usize>,
    events: Vec<String>,
    batch_sizes: Vec<usize>,
    chunk_failures: HashMap<u64, u32>,
}

/// In-memory [`IRemoteLibrary`].
#[derive(Default)]
pub struct FakeLibrary {
    state: Mutex<State>,
    next_id: AtomicU64,
    chunk_calls: AtomicU64,
    small_uploads: AtomicU64,
    failing_write_calls: AtomicU32,
    failing_creates: AtomicBool,
    failing_probes: AtomicBool,
    slow_down: AtomicBool,
}

impl FakeLibrary {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn new_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn child(state: &State, parent: &str, name: &str) -> Option<Node> {
        state
            .items
            .values()
            .find(|n| n.parent == parent && n.name == name)
            .cloned()
    }

    fn path_of(state: &State, node: &Node) -> String {
        let mut parts = vec![node.name.clone()];
        let mut parent = node.parent.clone();
        while let Some(p) = state.items.get(&parent) {
            parts.push(p.name.clone());
            parent = p.parent.clone();
        }
        parts.reverse();
        parts.join("/")
    }

    fn store_file(&self, state: &mut State, parent: &str, name: &str, size: u64) -> UploadedItem {
        if let Some(old) = Self::child(state, parent, name) {
            state.items.remove(&old.id);
        }
        let id = self.new_id("file");
        state.events.push(format!("upload:{name}"));
        state.items.insert(
            id.clone(),
            Node {
                id: id.clone(),
                parent: parent.to_string(),
                name: name.to_string(),
                kind: RemoteItemKind::File,
                size,
                fingerprint: None,
            },
        );
        UploadedItem {
            id,
            name: name.to_string(),
            size: Some(size),
        }
    }

    /// Node at a `/`-separated path below the root.
    pub fn find(&self, path: &str) -> Option<Node> {
        let state = self.state.lock().unwrap();
        let mut parent = ROOT.to_string();
        let mut found = None;
        for segment in path.split('/') {
            let node = Self::child(&state, &parent, segment)?;
            parent = node.id.clone();
            found = Some(node);
        }
        found
    }

    /// Paths of every remote file.
    pub fn file_paths(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut paths: Vec<_> = state
            .items
            .values()
            .filter(|n| n.kind == RemoteItemKind::File)
            .map(|n| Self::path_of(&state, n))
            .collect();
        paths.sort();
        paths
    }

    /// Places a file directly, bypassing the upload calls.
    pub fn seed_file(&self, name: &str, size: u64, fingerprint: Option<Fingerprint>) -> String {
        let mut state = self.state.lock().unwrap();
        let id = self.new_id("seed");
        state.items.insert(
            id.clone(),
            Node {
                id: id.clone(),
                parent: ROOT.to_string(),
                name: name.to_string(),
                kind: RemoteItemKind::File,
                size,
                fingerprint,
            },
        );
        id
    }

    /// Folder creation requests for `parent_id/name`.
    pub fn creates_for(&self, key: &str) -> usize {
        self.state.lock().unwrap().creates.get(key).copied().unwrap_or(0)
    }

    pub fn create_counts(&self) -> HashMap<String, usize> {
        self.state.lock().unwrap().creates.clone()
    }

    /// Ordered log of `upload:{name}` and `delete:{name}` events.
    pub fn events(&self) -> Vec<String> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.state.lock().unwrap().batch_sizes.clone()
    }

    pub fn chunk_calls(&self) -> u64 {
        self.chunk_calls.load(Ordering::SeqCst)
    }

    pub fn small_uploads(&self) -> u64 {
        self.small_uploads.load(Ordering::SeqCst)
    }

    /// Makes the chunk at `offset` fail `times` times.
    pub fn fail_chunk(&self, offset: u64, times: u32) {
        self.state.lock().unwrap().chunk_failures.insert(offset, times);
    }

    /// Makes the next `calls` batched writes fail for every item.
    pub fn fail_write_calls(&self, calls: u32) {
        self.failing_write_calls.store(calls, Ordering::SeqCst);
    }

    /// Makes folder creation fail until reset.
    pub fn fail_creates(&self, fail: bool) {
        self.failing_creates.store(fail, Ordering::SeqCst);
    }

    /// Makes existence checks report an error until reset.
    pub fn fail_probes(&self, fail: bool) {
        self.failing_probes.store(fail, Ordering::SeqCst);
    }

    pub fn set_slow_down(&self, slow: bool) {
        self.slow_down.store(slow, Ordering::SeqCst);
    }
}

#[async_trait]
impl IRemoteLibrary for FakeLibrary {
    async fn probe_item(&self, folder: &FolderHandle, name: &str, with_fingerprint: bool) -> ProbeResult {
        if self.failing_probes.load(Ordering::SeqCst) {
            return ProbeResult::Error("injected probe failure".to_string());
        }
        let state = self.state.lock().unwrap();
        match Self::child(&state, folder.as_str(), name) {
            Some(node) => ProbeResult::Found(RemoteItemMetadata {
                id: node.id,
                kind: node.kind,
                size: Some(node.size),
                fingerprint: match (with_fingerprint, node.fingerprint) {
                    (false, _) => RemoteFingerprint::ColumnUnavailable,
                    (true, Some(fp)) => RemoteFingerprint::Value(fp),
                    (true, None) => RemoteFingerprint::Empty,
                },
            }),
            None => ProbeResult::NotFound,
        }
    }

    async fn list_children(&self, folder: &FolderHandle) -> Result<Vec<RemoteEntry>> {
        tokio::time::sleep(Duration::from_millis(2)).await;
        let state = self.state.lock().unwrap();
        Ok(state
            .items
            .values()
            .filter(|n| n.parent == folder.as_str())
            .map(|n| RemoteEntry {
                id: n.id.clone(),
                name: n.name.clone(),
                kind: n.kind,
                size: Some(n.size),
            })
            .collect())
    }

    async fn create_folder(&self, parent: &FolderHandle, name: &str) -> Result<FolderCreation> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        if self.failing_creates.load(Ordering::SeqCst) {
            bail!("injected folder creation failure");
        }
        let mut state = self.state.lock().unwrap();
        *state.creates.entry(format!("{parent}/{name}")).or_default() += 1;
        if Self::child(&state, parent.as_str(), name).is_some() {
            return Ok(FolderCreation::AlreadyExists);
        }
        let id = self.new_id("folder");
        state.items.insert(
            id.clone(),
            Node {
                id: id.clone(),
                parent: parent.to_string(),
                name: name.to_string(),
                kind: RemoteItemKind::Folder,
                size: 0,
                fingerprint: None,
            },
        );
        Ok(FolderCreation::Created(FolderHandle::new(id)?))
    }

    async fn delete_item(&self, item_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(node) = state.items.remove(item_id) {
            state.events.push(format!("delete:{}", node.name));
        }
        Ok(())
    }

    async fn upload_small(&self, folder: &FolderHandle, name: &str, data: Vec<u8>) -> Result<UploadedItem> {
        self.small_uploads.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        Ok(self.store_file(&mut state, folder.as_str(), name, data.len() as u64))
    }

    async fn create_upload_session(&self, folder: &FolderHandle, name: &str) -> Result<String> {
        let url = format!("https://upload.example/{}", self.new_id("session"));
        self.state.lock().unwrap().sessions.insert(
            url.clone(),
            Session {
                parent: folder.to_string(),
                name: name.to_string(),
                received: 0,
            },
        );
        Ok(url)
    }

    async fn upload_chunk(&self, upload_url: &str, data: &[u8], offset: u64, total: u64) -> Result<ChunkOutcome> {
        self.chunk_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if let Some(remaining) = state.chunk_failures.get_mut(&offset) {
            if *remaining > 0 {
                *remaining -= 1;
                bail!("injected chunk failure at {offset}");
            }
        }

        let Some(session) = state.sessions.get_mut(upload_url) else {
            bail!("unknown session {upload_url}");
        };
        if session.received != offset {
            bail!("expected offset {}, got {offset}", session.received);
        }
        session.received += data.len() as u64;
        if session.received < total {
            return Ok(ChunkOutcome::Accepted);
        }

        let (parent, name) = (session.parent.clone(), session.name.clone());
        state.sessions.remove(upload_url);
        Ok(ChunkOutcome::Completed(self.store_file(&mut state, &parent, &name, total)))
    }

    async fn write_fingerprint(&self, item_id: &str, fingerprint: &Fingerprint) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.items.get_mut(item_id) {
            Some(node) => {
                node.fingerprint = Some(fingerprint.clone());
                Ok(())
            }
            None => bail!("no item {item_id}"),
        }
    }

    async fn write_fingerprints(&self, writes: &[MetadataWrite], batch_size: usize) -> HashMap<String, bool> {
        let failing = self
            .failing_write_calls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let mut state = self.state.lock().unwrap();
        state.batch_sizes.push(batch_size);
        writes
            .iter()
            .map(|w| {
                let ok = !failing
                    && match state.items.get_mut(&w.item_id) {
                        Some(node) => {
                            node.fingerprint = Some(w.fingerprint.clone());
                            true
                        }
                        None => false,
                    };
                (w.item_id.clone(), ok)
            })
            .collect()
    }

    fn should_slow_down(&self) -> bool {
        self.slow_down.load(Ordering::SeqCst)
    }
}

pub fn root() -> FolderHandle {
    FolderHandle::new(ROOT).unwrap()
}

/// Upload settings with millisecond delays.
pub fn upload_settings() -> UploadSettings {
    UploadSettings {
        force_upload: false,
        chunk_threshold: 4 * MIB,
        special_threshold: 250 * MIB,
        chunk_size: CHUNK_SIZE,
        max_chunk_retries: 3,
        chunk_retry_delay: Duration::from_millis(1),
        max_retry: 2,
        retry_delay: Duration::from_millis(1),
        metadata_mode: MetadataMode::Batched,
    }
}

/// Orchestrator settings with millisecond delays.
pub fn orchestrator_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        max_workers: 4,
        pacing_pause: Duration::from_millis(1),
        convert_markdown: true,
        sync_delete: false,
        metadata: MetadataFlushSettings {
            batch_size: 20,
            final_batch_size: 5,
            markup_delay: Duration::from_millis(3),
            document_delay: Duration::from_millis(2),
            default_delay: Duration::from_millis(1),
            final_delay: Duration::from_millis(4),
        },
    }
}

pub fn orchestrator(remote: &Arc<FakeLibrary>, column_available: bool) -> SyncOrchestrator {
    orchestrator_with(remote, upload_settings(), orchestrator_settings(), column_available)
}

pub fn orchestrator_with(
    remote: &Arc<FakeLibrary>,
    upload: UploadSettings,
    settings: OrchestratorSettings,
    column_available: bool,
) -> SyncOrchestrator {
    let remote: Arc<dyn IRemoteLibrary> = remote.clone();
    SyncOrchestrator::new(remote, upload, settings, column_available)
}

/// Writes `content` to `base/relative` and returns its record.
pub fn local_file(base: &Path, relative: &str, content: &[u8]) -> FileRecord {
    let path = base.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    FileRecord::new(path, relative, content.len() as u64)
}
