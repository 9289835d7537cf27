use std::sync::Arc;

use preview_core::cache::{InsertOutcome, ThumbnailCache, ThumbnailEntry};
use preview_core::codec::Bitmap;
use preview_core::{CacheBudget, DocumentId, LoadError, PageKey, PixelFormat, RenderParams};

fn page(index: u32) -> PageKey {
    PageKey::new(DocumentId::new("D"), index)
}

/// 200x150 RGB565, 60 000 bytes.
fn entry(index: u32) -> Arc<ThumbnailEntry> {
    let params = RenderParams::new(200, 150, PixelFormat::Rgb565);
    Arc::new(ThumbnailEntry::new(page(index), Bitmap::blank(params)))
}

#[test]
fn default_thumbnail_costs_thirty_thousand_bytes() {
    let cache = ThumbnailCache::new(CacheBudget::default());
    let thumb = Arc::new(ThumbnailEntry::new(page(3), Bitmap::blank(RenderParams::default())));

    assert_eq!(cache.put(page(3), thumb), InsertOutcome::Inserted { evicted: 0 });
    assert_eq!(cache.bytes_used(), 30_000);
    assert_eq!(cache.budget().bytes_max, 30 * 1024 * 1024);
}

#[test]
fn least_recently_used_entry_is_evicted_first() {
    let cache = ThumbnailCache::new(CacheBudget { bytes_max: 300_000 });
    for index in 1..=5 {
        cache.put(page(index), entry(index));
    }
    assert_eq!(cache.bytes_used(), 300_000);

    // Touch entry 1 so entry 2 becomes the oldest.
    assert!(cache.get(&page(1)).is_some());

    assert_eq!(cache.put(page(6), entry(6)), InsertOutcome::Inserted { evicted: 1 });
    assert!(cache.contains(&page(1)), "recently used entry should be retained");
    assert!(!cache.contains(&page(2)), "least recently used entry should be evicted");
    assert!(cache.contains(&page(6)));
    assert_eq!(cache.len(), 5);
    assert!(cache.bytes_used() <= 300_000);
}

#[test]
fn oversized_entry_is_never_retained() {
    let cache = ThumbnailCache::new(CacheBudget { bytes_max: 50_000 });
    let small = Bitmap::blank(RenderParams::default());
    cache.put(page(1), Arc::new(ThumbnailEntry::new(page(1), small)));

    let err = cache.try_put(page(2), entry(2)).unwrap_err();
    match err {
        LoadError::CacheOverflow { cost, budget, .. } => {
            assert_eq!(cost, 60_000);
            assert_eq!(budget, 50_000);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!cache.contains(&page(2)));
    assert!(cache.contains(&page(1)), "existing entries survive a rejected insert");
    assert_eq!(cache.bytes_used(), 30_000);
}

#[test]
fn second_writer_keeps_first_entry() {
    let cache = ThumbnailCache::new(CacheBudget::default());
    let first = entry(4);
    let second = entry(4);

    assert!(cache.try_put(page(4), Arc::clone(&first)).unwrap());
    assert!(!cache.try_put(page(4), second).unwrap());

    let stored = cache.get(&page(4)).unwrap();
    assert!(Arc::ptr_eq(&stored, &first));
    assert_eq!(cache.bytes_used(), 60_000);
}

#[test]
fn clear_drops_everything() {
    let cache = ThumbnailCache::new(CacheBudget::default());
    for index in 0..4 {
        cache.put(page(index), entry(index));
    }

    cache.clear();

    assert!(cache.is_empty());
    assert_eq!(cache.bytes_used(), 0);
    assert!(cache.get(&page(0)).is_none());
}
