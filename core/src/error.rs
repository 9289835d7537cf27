//! Failure taxonomy for thumbnail requests.

use thiserror::Error;

use crate::types::{PageKey, RenderParams};

/// Reasons a thumbnail could not be produced.
///
/// None of these are fatal to the viewer; the worst visible effect is a missing thumbnail.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("invalid thumbnail request for {key}: {reason}")]
    InvalidRequest { key: PageKey, reason: String },

    #[error("rendering {key} at {}x{} failed", .params.width, .params.height)]
    RenderFailure {
        key: PageKey,
        params: RenderParams,
        #[source]
        source: anyhow::Error,
    },

    #[error("thumbnail for {key} costs {cost} bytes, more than the {budget} byte cache budget")]
    CacheOverflow { key: PageKey, cost: usize, budget: usize },

    #[error("render pool is shut down")]
    Shutdown,
}

impl LoadError {
    pub(crate) fn invalid(key: &PageKey, reason: impl Into<String>) -> Self {
        Self::InvalidRequest { key: key.clone(), reason: reason.into() }
    }
}
