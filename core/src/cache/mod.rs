//! Bounded in-memory thumbnail cache.

pub mod memory;
mod thumbnail;

pub use memory::{InsertOutcome, MemoryCache, ThumbnailEntry};
pub use thumbnail::ThumbnailCache;
