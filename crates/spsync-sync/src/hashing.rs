//! Content fingerprints
//!
//! A fingerprint is the XXH3-128 digest of a file's bytes, rendered as 32
//! lowercase hex characters. Files are streamed in chunks whose size grows
//! with the file so small files stay cheap and large files avoid per-read
//! overhead.

use std::io::Read;
use std::path::{Path, PathBuf};

use spsync_core::domain::Fingerprint;
use tracing::warn;
use xxhash_rust::xxh3::Xxh3;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const GIB: u64 = 1024 * MIB;

/// Read size used for a file of `size` bytes.
pub fn chunk_size_for(size: u64) -> usize {
    let chunk = if size < MIB {
        64 * KIB
    } else if size < 10 * MIB {
        256 * KIB
    } else if size < 100 * MIB {
        MIB
    } else if size < GIB {
        4 * MIB
    } else {
        8 * MIB
    };
    chunk as usize
}

/// Fingerprint of an in-memory buffer.
pub fn fingerprint_bytes(data: &[u8]) -> Fingerprint {
    let mut hasher = Xxh3::new();
    hasher.update(data);
    Fingerprint::new(format!("{:032x}", hasher.digest128()))
}

fn fingerprint_blocking(path: &Path) -> std::io::Result<Fingerprint> {
    let mut file = std::fs::File::open(path)?;
    let size = file.metadata()?.len();
    let mut buffer = vec![0u8; chunk_size_for(size)];
    let mut hasher = Xxh3::new();
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(Fingerprint::new(format!("{:032x}", hasher.digest128())))
}

/// Fingerprint of the file at `path`, or `None` if it cannot be read.
///
/// `None` means "unknown", which callers treat as "must upload".
pub async fn fingerprint(path: &Path) -> Option<Fingerprint> {
    let owned: PathBuf = path.to_path_buf();
    let result = tokio::task::spawn_blocking(move || fingerprint_blocking(&owned)).await;
    match result {
        Ok(Ok(fp)) => Some(fp),
        Ok(Err(e)) => {
            warn!(path = %path.display(), error = %e, "Could not fingerprint file");
            None
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Fingerprint task failed");
            None
        }
    }
}
