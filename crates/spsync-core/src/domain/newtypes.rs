//! Domain newtypes
//!
//! Strongly-typed wrappers for remote folder handles and content fingerprints.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// FolderHandle
// ============================================================================

/// Opaque handle of a remote folder (the drive item id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FolderHandle(String);

impl FolderHandle {
    /// Create a new FolderHandle
    ///
    /// # Errors
    /// Returns error if the id is empty
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(DomainError::InvalidFolderHandle(
                "Folder handle cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for FolderHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FolderHandle {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

// ============================================================================
// Fingerprint
// ============================================================================

/// Hex digest of a file's content.
///
/// Locally computed fingerprints are 32 lowercase hex characters (XXH3-128).
/// Values read back from the remote column are wrapped as-is and simply
/// compared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(digest: impl Into<String>) -> Self {
        Self(digest.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 32 lowercase hex characters.
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == 32 && self.0.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f'))
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.0
    }
}
