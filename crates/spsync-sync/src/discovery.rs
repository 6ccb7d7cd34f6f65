//! Local file discovery
//!
//! The selection is a glob. Matched directories are expanded (recursively
//! when `recursive` is set) and every path is filtered through the
//! exclusion patterns. Relative paths are computed against a base directory
//! so the local folder structure is recreated below the upload root.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use glob::Pattern;
use spsync_core::domain::FileRecord;
use tracing::{debug, warn};

use crate::SyncError;

/// Files selected for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    /// Directory relative paths are computed from
    pub base: PathBuf,
    /// Selected files, sorted
    pub files: Vec<PathBuf>,
    /// Matches dropped by exclusion patterns
    pub excluded: usize,
}

impl Discovery {
    /// `/`-separated path of `path` relative to the base.
    pub fn relative_path(&self, path: &Path) -> String {
        relative_to(&self.base, path)
    }

    /// Builds one record per selected file, skipping unreadable ones.
    pub fn records(&self) -> Vec<FileRecord> {
        self.files
            .iter()
            .filter_map(|path| match std::fs::metadata(path) {
                Ok(meta) => Some(FileRecord::new(path, &self.relative_path(path), meta.len())),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable file");
                    None
                }
            })
            .collect()
    }
}

/// Whether `path` matches any exclusion pattern.
///
/// A pattern matches when it globs the base name, names a path component
/// literally (patterns without wildcards), globs the whole path, or, unless
/// it starts with `*` or `.`, globs the base name as `*.{pattern}`.
pub fn should_exclude(path: &str, patterns: &[String]) -> bool {
    if patterns.is_empty() {
        return false;
    }

    let normalized = path.replace('\\', "/");
    let basename = normalized.rsplit('/').next().unwrap_or(&normalized);

    patterns.iter().any(|pattern| {
        let compiled = Pattern::new(pattern).ok();
        let globs = |text: &str| compiled.as_ref().is_some_and(|p| p.matches(text));

        if globs(basename) {
            return true;
        }
        let has_wildcard = pattern.contains(&['*', '?', '['][..]);
        if !has_wildcard && normalized.split('/').any(|c| c == pattern) {
            return true;
        }
        if globs(&normalized) {
            return true;
        }
        if !pattern.starts_with('*') && !pattern.starts_with('.') {
            if let Ok(extension) = Pattern::new(&format!("*.{pattern}")) {
                return extension.matches(basename);
            }
        }
        false
    })
}

/// Expands `pattern` into the files to upload.
pub fn discover(pattern: &str, recursive: bool, excludes: &[String]) -> Result<Discovery, SyncError> {
    let matches = glob::glob(pattern).map_err(|e| SyncError::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })?;

    let mut excluded = 0;
    let mut files = BTreeSet::new();
    let mut dirs = Vec::new();

    for entry in matches {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable match");
                continue;
            }
        };
        if should_exclude(&path.to_string_lossy(), excludes) {
            excluded += 1;
            continue;
        }
        if path.is_dir() {
            dirs.push(path);
        } else if path.is_file() {
            files.insert(path);
        }
    }

    for dir in &dirs {
        excluded += walk(dir, recursive, excludes, &mut files)?;
    }

    if files.is_empty() {
        return Err(SyncError::NoFilesMatched {
            pattern: pattern.to_string(),
            excluded,
        });
    }

    let files: Vec<PathBuf> = files.into_iter().collect();
    let base = base_path(&files, &dirs);
    debug!(
        base = %base.display(),
        files = files.len(),
        excluded,
        "Discovered files"
    );

    Ok(Discovery { base, files, excluded })
}

/// Adds the files below `dir` to `files`, returning how many entries were excluded.
fn walk(dir: &Path, recursive: bool, excludes: &[String], files: &mut BTreeSet<PathBuf>) -> Result<usize, SyncError> {
    let mut excluded = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if should_exclude(&path.to_string_lossy(), excludes) {
            excluded += 1;
            continue;
        }
        if path.is_dir() {
            if recursive {
                excluded += walk(&path, recursive, excludes, files)?;
            }
        } else if path.is_file() {
            files.insert(path);
        }
    }
    Ok(excluded)
}

/// Parent of the first matched directory, else the deepest directory
/// containing every file.
pub fn base_path(files: &[PathBuf], dirs: &[PathBuf]) -> PathBuf {
    if let Some(first) = dirs.first() {
        return first.parent().map(Path::to_path_buf).unwrap_or_default();
    }

    let mut parents = files
        .iter()
        .map(|f| f.parent().map(Path::to_path_buf).unwrap_or_default());
    let Some(mut common) = parents.next() else {
        return PathBuf::new();
    };
    for parent in parents {
        common = common
            .components()
            .zip(parent.components())
            .take_while(|(a, b)| a == b)
            .map(|(a, _)| a)
            .collect();
    }
    common
}

fn relative_to(base: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(base).unwrap_or(path);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
