//! Page thumbnail rendering and caching for a document viewer.

#![deny(missing_debug_implementations)]

pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod loader;
pub mod log;
pub mod pipeline;
pub mod render;
pub mod stats;
pub mod toc;
pub mod types;

pub type Result<T> = std::result::Result<T, anyhow::Error>;

pub use cache::{ThumbnailCache, ThumbnailEntry};
pub use codec::Bitmap;
pub use config::LoaderConfig;
pub use error::LoadError;
pub use loader::{RequestOutcome, ThumbnailLoader};
pub use pipeline::{DisplaySlot, RenderTaskRegistry};
pub use render::PageRenderer;
pub use types::{CacheBudget, DocumentId, ImageDimensions, PageKey, PixelFormat, RenderParams};

/// Returns the version of the core crate for telemetry and debugging.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposes_semver_version() {
        assert!(version().contains('.'));
    }

    #[test]
    fn constructs_basic_types() {
        let document = DocumentId::new("demo.pdf");
        let key = PageKey::new(document.clone(), 0);
        let entry = ThumbnailEntry::new(key.clone(), Bitmap::blank(RenderParams::default()));

        assert_eq!(entry.page.document, document);
        assert_eq!(entry.cost(), 30_000);
    }
}
