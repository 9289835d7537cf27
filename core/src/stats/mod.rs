//! Runtime counters for the thumbnail pipeline.
//!
//! The loader records render latency, cache effectiveness, and what became of each finished
//! render (delivered, stale, cancelled, failed). A [`PerfSnapshot`] can be serialized for a
//! developer overlay or a log line.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::warn;

const DEFAULT_SAMPLE_CAPACITY: usize = 240;

#[derive(Debug, Default)]
struct SampleWindow {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl SampleWindow {
    fn new(capacity: usize) -> Self {
        Self { samples: VecDeque::with_capacity(capacity), capacity }
    }

    fn push(&mut self, value: f32) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    fn percentile(&self, percentile: f32) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }

        let mut sorted: Vec<f32> = self.samples.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

        let rank = percentile.clamp(0.0, 1.0) * (sorted.len() - 1) as f32;
        let index = rank.round() as usize;
        sorted.get(index).copied().unwrap_or(0.0)
    }
}

#[derive(Debug)]
struct StatsInner {
    started_at: Instant,
    render_times_ms: SampleWindow,
    cache_requests: u64,
    cache_hits: u64,
    cache_bytes_used: u64,
    cache_bytes_capacity: u64,
    renders: u64,
    render_failures: u64,
    deliveries: u64,
    stale_drops: u64,
    cancellations: u64,
    in_flight: usize,
    queued: usize,
}

impl Default for StatsInner {
    fn default() -> Self {
        Self {
            started_at: Instant::now(),
            render_times_ms: SampleWindow::new(DEFAULT_SAMPLE_CAPACITY),
            cache_requests: 0,
            cache_hits: 0,
            cache_bytes_used: 0,
            cache_bytes_capacity: 0,
            renders: 0,
            render_failures: 0,
            deliveries: 0,
            stale_drops: 0,
            cancellations: 0,
            in_flight: 0,
            queued: 0,
        }
    }
}

/// Thread-safe counter collection shared by the loader and its render jobs.
#[derive(Debug, Default)]
pub struct StatsCollector {
    inner: parking_lot::Mutex<StatsInner>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one call into the page renderer and whether it succeeded.
    pub fn record_render(&self, duration: Duration, succeeded: bool) {
        let mut guard = self.inner.lock();
        guard.renders = guard.renders.saturating_add(1);
        if succeeded {
            guard.render_times_ms.push(duration.as_secs_f64() as f32 * 1_000.0);
        } else {
            guard.render_failures = guard.render_failures.saturating_add(1);
        }
    }

    /// Record whether a cache lookup produced a hit.
    pub fn record_cache_lookup(&self, hit: bool) {
        let mut guard = self.inner.lock();
        guard.cache_requests = guard.cache_requests.saturating_add(1);
        if hit {
            guard.cache_hits = guard.cache_hits.saturating_add(1);
        }
    }

    pub fn record_delivery(&self) {
        let mut guard = self.inner.lock();
        guard.deliveries = guard.deliveries.saturating_add(1);
    }

    /// A finished render whose requester had moved on to another page.
    pub fn record_stale(&self) {
        let mut guard = self.inner.lock();
        guard.stale_drops = guard.stale_drops.saturating_add(1);
    }

    pub fn record_cancellation(&self) {
        let mut guard = self.inner.lock();
        guard.cancellations = guard.cancellations.saturating_add(1);
    }

    /// Update the aggregate cache usage counters.
    pub fn update_cache_usage(&self, used_bytes: u64, capacity_bytes: u64) {
        let mut guard = self.inner.lock();
        guard.cache_bytes_used = used_bytes;
        guard.cache_bytes_capacity = capacity_bytes;
    }

    /// Registered renders, and how many of those are still waiting for a worker.
    pub fn update_in_flight(&self, in_flight: usize, queued: usize) {
        let mut guard = self.inner.lock();
        guard.in_flight = in_flight;
        guard.queued = queued;
    }

    /// Generate a snapshot of the current metrics.
    pub fn snapshot(&self) -> PerfSnapshot {
        let guard = self.inner.lock();

        let cache_requests = guard.cache_requests.max(1);
        let cache_hit_ratio = guard.cache_hits as f32 / cache_requests as f32;

        PerfSnapshot {
            timestamp_ms: now_ms(),
            uptime_ms: guard.started_at.elapsed().as_millis() as u64,
            render_time_ms_p50: guard.render_times_ms.percentile(0.50),
            render_time_ms_p95: guard.render_times_ms.percentile(0.95),
            cache_hit_ratio,
            cache_requests: guard.cache_requests,
            cache_bytes_used: guard.cache_bytes_used,
            cache_bytes_capacity: guard.cache_bytes_capacity,
            renders: guard.renders,
            render_failures: guard.render_failures,
            deliveries: guard.deliveries,
            stale_drops: guard.stale_drops,
            cancellations: guard.cancellations,
            in_flight: guard.in_flight,
            queued: guard.queued,
        }
    }
}

fn now_ms() -> u64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(delta) => delta.as_millis() as u64,
        Err(err) => {
            warn!("system clock error: {err}");
            0
        }
    }
}

/// Immutable snapshot of the pipeline counters.
#[derive(Debug, Clone, Serialize)]
pub struct PerfSnapshot {
    pub timestamp_ms: u64,
    pub uptime_ms: u64,
    pub render_time_ms_p50: f32,
    pub render_time_ms_p95: f32,
    pub cache_hit_ratio: f32,
    pub cache_requests: u64,
    pub cache_bytes_used: u64,
    pub cache_bytes_capacity: u64,
    pub renders: u64,
    pub render_failures: u64,
    pub deliveries: u64,
    pub stale_drops: u64,
    pub cancellations: u64,
    pub in_flight: usize,
    pub queued: usize,
}
