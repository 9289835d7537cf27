use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::LoadError;
use crate::types::{CacheBudget, PageKey};

use super::memory::{InsertOutcome, MemoryCache, ThumbnailEntry};

/// Thread-safe thumbnail store shared between the requesting thread and render workers.
///
/// Every operation takes the same short-lived lock, so `get`, `put` and `clear` are
/// serialized with respect to each other. No sequence of calls is atomic as a whole.
#[derive(Debug)]
pub struct ThumbnailCache {
    inner: Mutex<MemoryCache>,
}

impl ThumbnailCache {
    pub fn new(budget: CacheBudget) -> Self {
        Self { inner: Mutex::new(MemoryCache::new(budget)) }
    }

    /// Look up a thumbnail and mark it most recently used.
    pub fn get(&self, key: &PageKey) -> Option<Arc<ThumbnailEntry>> {
        self.inner.lock().get(key)
    }

    pub fn contains(&self, key: &PageKey) -> bool {
        self.inner.lock().contains(key)
    }

    /// Store a thumbnail. An existing entry for the key is kept as is.
    pub fn put(&self, key: PageKey, entry: Arc<ThumbnailEntry>) -> InsertOutcome {
        let cost = entry.cost();
        let outcome = self.inner.lock().insert(key.clone(), entry);
        match outcome {
            InsertOutcome::Inserted { evicted } => {
                debug!(target: "cache", page = %key, cost, evicted, "thumbnail cached");
            }
            InsertOutcome::AlreadyPresent => {
                debug!(target: "cache", page = %key, "thumbnail already cached, keeping first");
            }
            InsertOutcome::Oversized => {
                warn!(
                    target: "cache",
                    page = %key,
                    cost,
                    budget = self.budget().bytes_max,
                    "thumbnail larger than cache budget, not cached"
                );
            }
        }
        outcome
    }

    /// Like [`put`](Self::put) but reports an oversized entry as an error.
    ///
    /// Returns `Ok(true)` when the entry was stored and `Ok(false)` when another entry for the
    /// key was already present.
    pub fn try_put(&self, key: PageKey, entry: Arc<ThumbnailEntry>) -> Result<bool, LoadError> {
        let cost = entry.cost();
        match self.put(key.clone(), entry) {
            InsertOutcome::Inserted { .. } => Ok(true),
            InsertOutcome::AlreadyPresent => Ok(false),
            InsertOutcome::Oversized => {
                Err(LoadError::CacheOverflow { key, cost, budget: self.budget().bytes_max })
            }
        }
    }

    /// Drop every cached thumbnail immediately.
    pub fn clear(&self) {
        let dropped = self.inner.lock().clear();
        debug!(target: "cache", dropped, "thumbnail cache cleared");
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn bytes_used(&self) -> usize {
        self.inner.lock().bytes_used()
    }

    pub fn budget(&self) -> CacheBudget {
        self.inner.lock().budget()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Bitmap;
    use crate::types::{DocumentId, PixelFormat, RenderParams};
    use std::thread;

    fn key(index: u32) -> PageKey {
        PageKey::new(DocumentId::new("shared"), index)
    }

    fn entry(index: u32) -> Arc<ThumbnailEntry> {
        let bitmap = Bitmap::blank(RenderParams::new(10, 10, PixelFormat::Rgb565));
        Arc::new(ThumbnailEntry::new(key(index), bitmap))
    }

    #[test]
    fn try_put_reports_overflow() {
        let cache = ThumbnailCache::new(CacheBudget { bytes_max: 100 });
        let err = cache.try_put(key(1), entry(1)).unwrap_err();
        assert!(matches!(err, LoadError::CacheOverflow { cost: 200, budget: 100, .. }));
        assert!(cache.is_empty());
    }

    #[test]
    fn try_put_distinguishes_duplicates() {
        let cache = ThumbnailCache::new(CacheBudget { bytes_max: 1_000 });
        assert!(cache.try_put(key(1), entry(1)).unwrap());
        assert!(!cache.try_put(key(1), entry(1)).unwrap());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn concurrent_writers_stay_within_budget() {
        let cache = Arc::new(ThumbnailCache::new(CacheBudget { bytes_max: 2_000 }));
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for index in 0..50 {
                        let page = worker * 100 + index;
                        cache.put(key(page), entry(page));
                        let _ = cache.get(&key(page / 2));
                        assert!(cache.bytes_used() <= 2_000);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(cache.bytes_used() <= 2_000);
        assert_eq!(cache.len(), 10);
    }
}
