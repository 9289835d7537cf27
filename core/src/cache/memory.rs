//! In-memory LRU of rendered thumbnails, weighted by bitmap size.

use std::sync::Arc;

use hashlink::LruCache;

use crate::codec::Bitmap;
use crate::types::{CacheBudget, PageKey};

/// Rendered bitmap for a single page together with its memory cost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailEntry {
    pub page: PageKey,
    pub bitmap: Bitmap,
    cost: usize,
}

impl ThumbnailEntry {
    pub fn new(page: PageKey, bitmap: Bitmap) -> Self {
        let cost = bitmap.byte_cost();
        Self { page, bitmap, cost }
    }

    /// Bytes this entry counts against the cache budget.
    pub fn cost(&self) -> usize {
        self.cost
    }
}

/// What happened to an entry handed to [`MemoryCache::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Stored; `evicted` older entries were dropped to make room.
    Inserted { evicted: usize },
    /// The key already had a value, which was kept.
    AlreadyPresent,
    /// The entry alone exceeds the budget and was not stored.
    Oversized,
}

/// LRU keyed by [`PageKey`] that evicts based on byte budget.
///
/// Not synchronized; see [`super::ThumbnailCache`] for the shared wrapper.
#[derive(Debug)]
pub struct MemoryCache {
    entries: LruCache<PageKey, Arc<ThumbnailEntry>>,
    budget: CacheBudget,
    bytes_used: usize,
}

impl MemoryCache {
    /// Construct a cache with the provided memory budget.
    pub fn new(budget: CacheBudget) -> Self {
        Self { entries: LruCache::new_unbounded(), budget, bytes_used: 0 }
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total memory consumption tracked by the cache.
    pub fn bytes_used(&self) -> usize {
        self.bytes_used
    }

    pub fn budget(&self) -> CacheBudget {
        self.budget
    }

    /// Retrieve an entry, refreshing its recency ordering if present.
    pub fn get(&mut self, key: &PageKey) -> Option<Arc<ThumbnailEntry>> {
        self.entries.get(key).cloned()
    }

    /// Membership test that leaves recency untouched.
    pub fn contains(&self, key: &PageKey) -> bool {
        self.entries.peek(key).is_some()
    }

    /// Insert an entry unless the key is already cached. Oversized entries are ignored.
    pub fn insert(&mut self, key: PageKey, entry: Arc<ThumbnailEntry>) -> InsertOutcome {
        if self.entries.peek(&key).is_some() {
            return InsertOutcome::AlreadyPresent;
        }

        let cost = entry.cost();
        if cost > self.budget.bytes_max {
            // A single oversized entry should not wipe the cache; skip storing it.
            return InsertOutcome::Oversized;
        }

        self.bytes_used += cost;
        self.entries.insert(key, entry);
        let evicted = self.evict_if_needed();
        InsertOutcome::Inserted { evicted }
    }

    /// Remove an entry from the cache if present.
    pub fn remove(&mut self, key: &PageKey) -> Option<Arc<ThumbnailEntry>> {
        let removed = self.entries.remove(key);
        if let Some(ref entry) = removed {
            self.bytes_used = self.bytes_used.saturating_sub(entry.cost());
        }
        removed
    }

    /// Drop every entry, returning how many were held.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        self.bytes_used = 0;
        count
    }

    // The newest entry sits at the MRU end and fits on its own, so it is never reached.
    fn evict_if_needed(&mut self) -> usize {
        let mut evicted = 0;
        while self.bytes_used > self.budget.bytes_max {
            if let Some((_key, oldest)) = self.entries.remove_lru() {
                self.bytes_used = self.bytes_used.saturating_sub(oldest.cost());
                evicted += 1;
            } else {
                break;
            }
        }
        evicted
    }
}
