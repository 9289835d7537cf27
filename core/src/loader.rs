//! Thumbnail requests: cache lookup, render dispatch, and stale-aware delivery.
//!
//! A request first checks the [`ThumbnailCache`]. Hits are delivered synchronously on the
//! calling thread. Misses are handed to the [`RenderTaskRegistry`], which runs at most one
//! render per page on its worker pool. When a render finishes it is cached and delivered to
//! every requester whose [`DisplaySlot`] still shows that page; results for slots that were
//! rebound in the meantime are dropped and stay in the cache for the next request.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::cache::{ThumbnailCache, ThumbnailEntry};
use crate::config::LoaderConfig;
use crate::error::LoadError;
use crate::pipeline::{DisplaySlot, JobHandle, RenderTaskRegistry, Submission, Subscriber};
use crate::render::{self, PageRenderer};
use crate::stats::StatsCollector;
use crate::types::{PageKey, RenderParams};

/// How a request was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Served from cache; the handler already ran.
    Hit,
    /// A new render was queued.
    Scheduled,
    /// A render for the page was already in flight and the request was attached to it.
    Joined,
}

/// Owns the cache, the render registry, and the renderer for one viewer session.
///
/// Dropping the loader (or calling [`shutdown`](Self::shutdown)) cancels outstanding renders,
/// clears the cache, and joins the worker threads.
pub struct ThumbnailLoader {
    cache: Arc<ThumbnailCache>,
    registry: Arc<RenderTaskRegistry>,
    renderer: Arc<dyn PageRenderer>,
    stats: Arc<StatsCollector>,
    thumbnail: RenderParams,
}

impl std::fmt::Debug for ThumbnailLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThumbnailLoader")
            .field("cache", &self.cache)
            .field("registry", &self.registry)
            .field("thumbnail", &self.thumbnail)
            .finish_non_exhaustive()
    }
}

impl ThumbnailLoader {
    pub fn new(renderer: Arc<dyn PageRenderer>, config: LoaderConfig) -> crate::Result<Self> {
        Self::with_stats(renderer, config, Arc::new(StatsCollector::new()))
    }

    /// Construct a loader that reports into an existing collector.
    pub fn with_stats(
        renderer: Arc<dyn PageRenderer>,
        config: LoaderConfig,
        stats: Arc<StatsCollector>,
    ) -> crate::Result<Self> {
        let cache = Arc::new(ThumbnailCache::new(config.cache_budget));
        let registry = Arc::new(RenderTaskRegistry::new(config.workers)?);
        stats.update_cache_usage(0, config.cache_budget.bytes_max as u64);
        Ok(Self { cache, registry, renderer, stats, thumbnail: config.thumbnail })
    }

    /// Request the thumbnail for `key` on behalf of `slot`.
    ///
    /// Binds `slot` to `key`. A cached thumbnail is passed to `on_result` before this returns;
    /// otherwise `on_result` runs later on a render worker, and only if `slot` is still bound
    /// to `key` by then. Invalid requests have no side effects.
    pub fn request<F>(
        &self,
        key: PageKey,
        params: RenderParams,
        slot: &DisplaySlot,
        on_result: F,
    ) -> Result<RequestOutcome, LoadError>
    where
        F: Fn(&PageKey, Arc<ThumbnailEntry>) + Send + Sync + 'static,
    {
        if let Err(err) = validate(&key, params) {
            warn!(target: "loader", error = %err, "ignoring thumbnail request");
            return Err(err);
        }

        slot.bind(key.clone());

        let cached = self.cache.get(&key);
        self.stats.record_cache_lookup(cached.is_some());
        if let Some(entry) = cached {
            debug!(target: "loader", page = %key, "thumbnail cache hit");
            on_result(&key, entry);
            return Ok(RequestOutcome::Hit);
        }

        let subscriber = Subscriber::new(slot.clone(), Arc::new(on_result));
        let job = RenderJob {
            cache: Arc::clone(&self.cache),
            registry: Arc::clone(&self.registry),
            renderer: Arc::clone(&self.renderer),
            stats: Arc::clone(&self.stats),
            params,
        };
        let submission =
            self.registry.try_submit(key.clone(), subscriber, move |handle| job.run(handle))?;
        publish_load(&self.stats, &self.registry);

        Ok(match submission {
            Submission::Scheduled(_) => RequestOutcome::Scheduled,
            Submission::Joined(_) => {
                debug!(target: "loader", page = %key, "render already in flight");
                RequestOutcome::Joined
            }
        })
    }

    /// [`request`](Self::request) using the configured thumbnail size.
    pub fn request_thumbnail<F>(
        &self,
        key: PageKey,
        slot: &DisplaySlot,
        on_result: F,
    ) -> Result<RequestOutcome, LoadError>
    where
        F: Fn(&PageKey, Arc<ThumbnailEntry>) + Send + Sync + 'static,
    {
        self.request(key, self.thumbnail, slot, on_result)
    }

    /// Best-effort cancel of the in-flight render for `key`, for every requester.
    pub fn cancel_request(&self, key: &PageKey) -> bool {
        let cancelled = self.registry.cancel(key);
        if cancelled {
            self.stats.record_cancellation();
            publish_load(&self.stats, &self.registry);
        }
        cancelled
    }

    /// Unbind a slot that left the screen.
    ///
    /// The render it was waiting for is cancelled only if no other slot still shows that page.
    pub fn release_slot(&self, slot: &DisplaySlot) -> Option<PageKey> {
        let previous = slot.unbind()?;
        if self.registry.detach(&previous, slot) {
            self.stats.record_cancellation();
            publish_load(&self.stats, &self.registry);
        }
        Some(previous)
    }

    /// Drop all cached thumbnails.
    pub fn clear(&self) {
        self.cache.clear();
        self.publish_usage();
    }

    /// Cancel outstanding work, clear the cache, and stop the worker threads.
    pub fn shutdown(&self) {
        let cancelled = self.registry.cancel_all();
        if cancelled > 0 {
            debug!(target: "loader", cancelled, "cancelled renders on shutdown");
        }
        self.registry.shutdown();
        self.clear();
        self.stats.update_in_flight(0, 0);
    }

    pub fn cache(&self) -> &ThumbnailCache {
        &self.cache
    }

    pub fn stats(&self) -> Arc<StatsCollector> {
        Arc::clone(&self.stats)
    }

    /// Renders currently registered as in flight.
    pub fn in_flight(&self) -> usize {
        self.registry.in_flight()
    }

    pub fn is_in_flight(&self, key: &PageKey) -> bool {
        self.registry.is_in_flight(key)
    }

    fn publish_usage(&self) {
        let budget = self.cache.budget().bytes_max as u64;
        self.stats.update_cache_usage(self.cache.bytes_used() as u64, budget);
    }
}

impl Drop for ThumbnailLoader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn validate(key: &PageKey, params: RenderParams) -> Result<(), LoadError> {
    if !key.is_well_formed() {
        return Err(LoadError::invalid(key, "document id is empty"));
    }
    if params.width == 0 || params.height == 0 {
        return Err(LoadError::invalid(
            key,
            format!("target size {}x{} is not positive", params.width, params.height),
        ));
    }
    Ok(())
}

fn publish_load(stats: &StatsCollector, registry: &RenderTaskRegistry) {
    stats.update_in_flight(registry.in_flight(), registry.queued());
}

/// Everything a render job needs once it leaves the requesting thread.
struct RenderJob {
    cache: Arc<ThumbnailCache>,
    registry: Arc<RenderTaskRegistry>,
    renderer: Arc<dyn PageRenderer>,
    stats: Arc<StatsCollector>,
    params: RenderParams,
}

impl RenderJob {
    fn run(self, handle: JobHandle) {
        let key = handle.key().clone();
        let _unwind = UnregisterOnPanic { registry: &self.registry, handle: &handle };
        let entry = self.render(&handle);

        if let Some(entry) = &entry {
            if handle.is_cancelled() {
                debug!(target: "loader", page = %key, "render cancelled, not caching");
            } else if let Err(err) = self.cache.try_put(key.clone(), Arc::clone(entry)) {
                warn!(target: "loader", error = %err, "thumbnail will be re-rendered on demand");
            }
            let budget = self.cache.budget().bytes_max as u64;
            self.stats.update_cache_usage(self.cache.bytes_used() as u64, budget);
        }

        // Always unregister, whatever happened above.
        let subscribers = self.registry.complete(&handle);
        publish_load(&self.stats, &self.registry);

        let Some(entry) = entry else {
            return;
        };
        if handle.is_cancelled() {
            return;
        }

        for subscriber in subscribers {
            if subscriber.wants(&key) {
                subscriber.deliver(&key, Arc::clone(&entry));
                self.stats.record_delivery();
            } else {
                debug!(target: "loader", page = %key, "slot moved on, dropping result");
                self.stats.record_stale();
            }
        }
    }

    fn render(&self, handle: &JobHandle) -> Option<Arc<ThumbnailEntry>> {
        let key = handle.key();
        if handle.is_cancelled() {
            debug!(target: "loader", page = %key, "render cancelled before start");
            return None;
        }
        // A job that finished between the requester's cache miss and this one's
        // registration may already have produced the page.
        if let Some(existing) = self.cache.get(key) {
            debug!(target: "loader", page = %key, "page cached while queued");
            return Some(existing);
        }

        let started = Instant::now();
        let result = self
            .renderer
            .open_page(&key.document, key.index)
            .and_then(|()| self.renderer.render_page(&key.document, key.index, self.params))
            .and_then(|bitmap| {
                render::check_output(&bitmap, self.params)?;
                Ok(bitmap)
            });
        let elapsed = started.elapsed();
        self.stats.record_render(elapsed, result.is_ok());

        match result {
            Ok(bitmap) => {
                debug!(
                    target: "loader",
                    page = %key,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "page rendered"
                );
                Some(Arc::new(ThumbnailEntry::new(key.clone(), bitmap)))
            }
            Err(source) => {
                let err =
                    LoadError::RenderFailure { key: key.clone(), params: self.params, source };
                warn!(target: "loader", error = ?err, "thumbnail render failed");
                None
            }
        }
    }
}

/// Releases the registration if the job unwinds, so later requests for the page are not
/// stuck joining a job that will never complete.
struct UnregisterOnPanic<'a> {
    registry: &'a RenderTaskRegistry,
    handle: &'a JobHandle,
}

impl Drop for UnregisterOnPanic<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.registry.complete(self.handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Bitmap;
    use crate::types::{DocumentId, PixelFormat};

    struct Blank;

    impl PageRenderer for Blank {
        fn open_page(&self, _document: &DocumentId, _page_index: u32) -> crate::Result<()> {
            Ok(())
        }

        fn render_page(
            &self,
            _document: &DocumentId,
            _page_index: u32,
            params: RenderParams,
        ) -> crate::Result<Bitmap> {
            Ok(Bitmap::blank(params))
        }
    }

    fn loader() -> ThumbnailLoader {
        ThumbnailLoader::new(Arc::new(Blank), LoaderConfig::default().with_workers(2)).unwrap()
    }

    #[test]
    fn rejects_zero_dimensions_without_binding() {
        let loader = loader();
        let slot = DisplaySlot::new();
        let key = PageKey::new(DocumentId::new("doc"), 0);

        let err = loader
            .request(key, RenderParams::new(0, 150, PixelFormat::Rgb565), &slot, |_, _| {})
            .unwrap_err();
        assert!(matches!(err, LoadError::InvalidRequest { .. }));
        assert_eq!(slot.current(), None);
        assert_eq!(loader.in_flight(), 0);
    }

    #[test]
    fn rejects_blank_document() {
        let loader = loader();
        let slot = DisplaySlot::new();
        let key = PageKey::new(DocumentId::new(""), 3);

        let err = loader.request_thumbnail(key, &slot, |_, _| {}).unwrap_err();
        assert!(err.to_string().contains("document id is empty"));
    }

    #[test]
    fn release_slot_unbinds() {
        let loader = loader();
        let slot = DisplaySlot::new();
        let key = PageKey::new(DocumentId::new("doc"), 9);
        slot.bind(key.clone());

        assert_eq!(loader.release_slot(&slot), Some(key));
        assert_eq!(loader.release_slot(&slot), None);
    }

    #[test]
    fn requests_after_shutdown_fail() {
        let loader = loader();
        loader.shutdown();
        let slot = DisplaySlot::new();
        let key = PageKey::new(DocumentId::new("doc"), 1);

        let err = loader.request_thumbnail(key, &slot, |_, _| {}).unwrap_err();
        assert!(matches!(err, LoadError::Shutdown));
    }
}
