//! Shared data structures exchanged between the loader, the cache, and the display layer.

use serde::{Deserialize, Serialize};

/// Identifier for an opened document (file name, content hash, etc.).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Page identity combines the parent document with the zero-based page index.
///
/// Used both as the thumbnail cache key and as the in-flight render key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageKey {
    pub document: DocumentId,
    pub index: u32,
}

impl PageKey {
    pub fn new(document: DocumentId, index: u32) -> Self {
        Self { document, index }
    }

    /// A key is usable when it names a document.
    pub fn is_well_formed(&self) -> bool {
        !self.document.as_str().trim().is_empty()
    }
}

impl std::fmt::Display for PageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.document.as_str(), self.index)
    }
}

/// Memory layout of a rendered thumbnail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// 16-bit packed 5/6/5, the cheapest format for thumbnails.
    #[default]
    Rgb565,
    Rgb888,
    Rgba8888,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb565 => 2,
            PixelFormat::Rgb888 => 3,
            PixelFormat::Rgba8888 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

impl ImageDimensions {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Target size and format handed to the page renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderParams {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub format: PixelFormat,
}

impl RenderParams {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self { width, height, format }
    }

    pub fn dimensions(&self) -> ImageDimensions {
        ImageDimensions { width: self.width, height: self.height }
    }

    /// Bytes needed for a bitmap of these parameters.
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }
}

impl Default for RenderParams {
    fn default() -> Self {
        // Thumbnails render well below slot size to keep the cache cheap.
        Self { width: 100, height: 150, format: PixelFormat::Rgb565 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheBudget {
    pub bytes_max: usize,
}

impl Default for CacheBudget {
    fn default() -> Self {
        Self { bytes_max: 30 * 1024 * 1024 }
    }
}

/// Unique id of a scheduled render job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(u64);

impl JobId {
    pub(crate) fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_document_and_page_produce_equal_keys() {
        let a = PageKey::new(DocumentId::new("manual.pdf"), 3);
        let b = PageKey::new(DocumentId::new("manual.pdf"), 3);
        assert_eq!(a, b);

        let mut set = std::collections::HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn blank_document_is_not_well_formed() {
        assert!(!PageKey::new(DocumentId::new("  "), 0).is_well_formed());
        assert!(PageKey::new(DocumentId::new("a.pdf"), 0).is_well_formed());
    }

    #[test]
    fn default_thumbnail_costs_thirty_thousand_bytes() {
        assert_eq!(RenderParams::default().byte_len(), 30_000);
        assert_eq!(RenderParams::new(10, 10, PixelFormat::Rgba8888).byte_len(), 400);
    }
}
