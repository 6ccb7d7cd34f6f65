//! Pending fingerprint writes
//!
//! Workers enqueue one entry per uploaded file; the orchestrator drains the
//! queue once every upload has finished and writes the fingerprints in
//! batches. An item id is accepted at most once per run.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use spsync_core::domain::Fingerprint;
use spsync_core::ports::MetadataWrite;

/// One fingerprint waiting to be written to the remote column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMetadata {
    pub item_id: String,
    /// Remote file name, used to pick the retry delay
    pub filename: String,
    pub fingerprint: Fingerprint,
    /// True when the upload replaced an existing file
    pub is_update: bool,
    /// Path shown in logs and status lines
    pub display_path: String,
}

impl PendingMetadata {
    pub fn as_write(&self) -> MetadataWrite {
        MetadataWrite {
            item_id: self.item_id.clone(),
            fingerprint: self.fingerprint.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct QueueState {
    entries: VecDeque<PendingMetadata>,
    seen: HashSet<String>,
}

/// Ordered, deduplicating queue shared by all workers.
#[derive(Debug, Default)]
pub struct MetadataQueue {
    state: Mutex<QueueState>,
}

impl MetadataQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds `entry` unless its item id was already enqueued this run.
    ///
    /// Returns whether the entry was added.
    pub fn enqueue(&self, entry: PendingMetadata) -> bool {
        let mut state = self.lock();
        if !state.seen.insert(entry.item_id.clone()) {
            return false;
        }
        state.entries.push_back(entry);
        true
    }

    /// Removes and returns every pending entry in insertion order.
    pub fn drain(&self) -> Vec<PendingMetadata> {
        self.lock().entries.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
