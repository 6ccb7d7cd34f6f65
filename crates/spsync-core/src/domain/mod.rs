//! Domain types and business rules
//!
//! - Newtypes for remote folder handles and content fingerprints
//! - SharePoint name sanitization and file-family classification
//! - Per-run file records
//! - Domain-specific error types

pub mod errors;
pub mod file_record;
pub mod names;
pub mod newtypes;

// Re-export commonly used types
pub use errors::DomainError;
pub use file_record::FileRecord;
pub use names::{is_special_file, sanitize_folder_path, sanitize_name, sanitize_path, FileFamily};
pub use newtypes::{Fingerprint, FolderHandle};
