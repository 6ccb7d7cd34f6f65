//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are the interfaces the sync engine depends on, implemented in
//! adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IRemoteLibrary`] - Document library operations (Microsoft Graph)
//! - [`IDiagramRenderer`] - Diagram-to-SVG rendering for Markdown conversion

pub mod diagram_renderer;
pub mod remote_library;

pub use diagram_renderer::{IDiagramRenderer, NoDiagrams};
pub use remote_library::{
    ChunkOutcome, FolderCreation, IRemoteLibrary, MetadataWrite, ProbeResult, RateLimitSummary,
    RemoteEntry, RemoteFingerprint, RemoteItemKind, RemoteItemMetadata, UploadedItem,
};
