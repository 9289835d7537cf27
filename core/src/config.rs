//! Loader configuration.

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::types::{CacheBudget, RenderParams};

/// More workers than one screen of thumbnail slots, so a full screen never queues behind itself.
pub const DEFAULT_WORKERS: usize = 20;

/// Settings for a [`ThumbnailLoader`](crate::loader::ThumbnailLoader).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Byte budget for the in-memory thumbnail cache.
    pub cache_budget: CacheBudget,
    /// Number of render worker threads.
    pub workers: usize,
    /// Size and pixel format used when a caller does not pick one.
    pub thumbnail: RenderParams,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            cache_budget: CacheBudget::default(),
            workers: DEFAULT_WORKERS,
            thumbnail: RenderParams::default(),
        }
    }
}

impl LoaderConfig {
    /// Parse a (possibly partial) JSON override; missing fields keep their defaults.
    pub fn from_json(text: &str) -> crate::Result<Self> {
        serde_json::from_str(text).context("parsing loader configuration")
    }

    pub fn with_budget(mut self, bytes_max: usize) -> Self {
        self.cache_budget = CacheBudget { bytes_max };
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: RenderParams) -> Self {
        self.thumbnail = thumbnail;
        self
    }
}
