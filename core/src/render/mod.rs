//! Seam to the native page rasterizer.
//!
//! The rasterizer itself lives outside this crate. Implementations are expected to block for
//! tens to hundreds of milliseconds and are always called from a render worker thread, never
//! from the requesting thread.

use std::sync::Arc;

use crate::codec::Bitmap;
use crate::types::{DocumentId, RenderParams};

pub type Result<T> = crate::Result<T>;

/// Produces page bitmaps for an opened document.
pub trait PageRenderer: Send + Sync {
    /// Prepare a page for rendering. Must be idempotent; called before every render.
    fn open_page(&self, document: &DocumentId, page_index: u32) -> Result<()>;

    /// Rasterize a page at the requested size and pixel format.
    fn render_page(
        &self,
        document: &DocumentId,
        page_index: u32,
        params: RenderParams,
    ) -> Result<Bitmap>;
}

impl<R: PageRenderer + ?Sized> PageRenderer for Arc<R> {
    fn open_page(&self, document: &DocumentId, page_index: u32) -> Result<()> {
        (**self).open_page(document, page_index)
    }

    fn render_page(
        &self,
        document: &DocumentId,
        page_index: u32,
        params: RenderParams,
    ) -> Result<Bitmap> {
        (**self).render_page(document, page_index, params)
    }
}

impl<R: PageRenderer + ?Sized> PageRenderer for Box<R> {
    fn open_page(&self, document: &DocumentId, page_index: u32) -> Result<()> {
        (**self).open_page(document, page_index)
    }

    fn render_page(
        &self,
        document: &DocumentId,
        page_index: u32,
        params: RenderParams,
    ) -> Result<Bitmap> {
        (**self).render_page(document, page_index, params)
    }
}

/// Checks the bitmap a renderer returned against what was asked for.
pub(crate) fn check_output(bitmap: &Bitmap, params: RenderParams) -> Result<()> {
    anyhow::ensure!(
        bitmap.dimensions == params.dimensions() && bitmap.format == params.format,
        "renderer returned {:?} {:?}, expected {:?} {:?}",
        bitmap.format,
        bitmap.dimensions,
        params.format,
        params.dimensions()
    );
    Ok(())
}
