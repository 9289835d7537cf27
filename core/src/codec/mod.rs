//! Rendered bitmap buffers and pixel format conversion.

pub mod bitmap;

pub use bitmap::Bitmap;

pub type Result<T> = crate::Result<T>;
