//! The page a display slot currently shows.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::types::PageKey;

/// Shared, mutable binding between a reusable display slot and a page.
///
/// The display layer rebinds a slot as it scrolls; render jobs read the binding at delivery
/// time and drop results for pages the slot no longer shows.
#[derive(Debug, Clone, Default)]
pub struct DisplaySlot {
    bound: Arc<Mutex<Option<PageKey>>>,
}

impl DisplaySlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the slot to `key`, returning the previous binding.
    pub fn bind(&self, key: PageKey) -> Option<PageKey> {
        self.bound.lock().replace(key)
    }

    pub fn unbind(&self) -> Option<PageKey> {
        self.bound.lock().take()
    }

    pub fn current(&self) -> Option<PageKey> {
        self.bound.lock().clone()
    }

    pub fn is_bound_to(&self, key: &PageKey) -> bool {
        self.bound.lock().as_ref() == Some(key)
    }

    /// Whether both handles refer to the same slot, whatever each is bound to.
    pub fn same_slot(&self, other: &DisplaySlot) -> bool {
        Arc::ptr_eq(&self.bound, &other.bound)
    }
}
