//! Diagram renderer port
//!
//! Markdown conversion hands every fenced diagram block to an
//! [`IDiagramRenderer`]. `None` means the block stays a code block.

use async_trait::async_trait;

#[async_trait]
pub trait IDiagramRenderer: Send + Sync {
    /// Renders diagram source to inline SVG markup.
    async fn to_svg(&self, source: &str) -> Option<String>;
}

/// Renderer that never produces an image.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDiagrams;

#[async_trait]
impl IDiagramRenderer for NoDiagrams {
    async fn to_svg(&self, _source: &str) -> Option<String> {
        None
    }
}
