//! Per-run file records
//!
//! A [`FileRecord`] is created when the local tree is enumerated and dropped
//! once the upload decision for the file has been carried out.

use std::path::{Path, PathBuf};

use super::errors::DomainError;
use super::names::{sanitize_folder_path, sanitize_name};
use super::newtypes::Fingerprint;

/// A local file and the remote location it maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// File whose bytes are uploaded (a temporary HTML file for converted Markdown).
    pub local_path: PathBuf,
    /// Size of `local_path` in bytes.
    pub size: u64,
    /// `/`-separated path relative to the discovery base, as the user sees it.
    pub relative_path: String,
    /// Sanitized remote file name.
    pub remote_name: String,
    /// Sanitized remote folder path relative to the upload root (empty for the root).
    pub remote_dir: String,
    /// Content fingerprint, when already known.
    pub fingerprint: Option<Fingerprint>,
}

impl FileRecord {
    /// Builds a record for `local_path` uploaded as `relative_path`.
    pub fn new(local_path: impl Into<PathBuf>, relative_path: &str, size: u64) -> Self {
        let relative_path = relative_path.replace('\\', "/").trim_start_matches('/').to_string();
        let (dir, name) = match relative_path.rsplit_once('/') {
            Some((dir, name)) => (dir, name),
            None => ("", relative_path.as_str()),
        };
        let remote_name = sanitize_name(name, false);
        let remote_dir = sanitize_folder_path(dir);
        Self {
            local_path: local_path.into(),
            size,
            remote_name,
            remote_dir,
            relative_path,
            fingerprint: None,
        }
    }

    /// Builds a record for `path` relative to `base`, reading its size from disk.
    pub fn from_disk(base: &Path, path: &Path) -> Result<Self, DomainError> {
        let relative = path
            .strip_prefix(base)
            .map_err(|_| DomainError::PathNotInBase(path.display().to_string()))?;
        let relative = relative
            .to_str()
            .ok_or_else(|| DomainError::InvalidPath(path.display().to_string()))?;
        let size = std::fs::metadata(path)
            .map_err(|e| DomainError::InvalidPath(format!("{}: {e}", path.display())))?
            .len();
        Ok(Self::new(path, relative, size))
    }

    /// Attaches a fingerprint computed elsewhere (e.g. for converted Markdown).
    #[must_use]
    pub fn with_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    /// Remote path relative to the upload root.
    pub fn remote_path(&self) -> String {
        if self.remote_dir.is_empty() {
            self.remote_name.clone()
        } else {
            format!("{}/{}", self.remote_dir, self.remote_name)
        }
    }

    /// Whether the sanitized name differs from the local file name.
    pub fn is_renamed(&self) -> bool {
        self.local_path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(true, |n| n != self.remote_name)
    }
}
