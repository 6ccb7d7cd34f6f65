//! Domain error types

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A remote folder handle was empty
    #[error("Invalid folder handle: {0}")]
    InvalidFolderHandle(String),

    /// A local path is not valid UTF-8 or could not be inspected
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A discovered file lies outside the selection's base directory
    #[error("Path is outside the base directory: {0}")]
    PathNotInBase(String),
}
