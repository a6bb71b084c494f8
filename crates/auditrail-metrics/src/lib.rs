//! Atomic counters, gauges, and a fixed-bucket latency histogram
//! (spec.md §4.11). The admin/metrics HTTP surface that reports these is an
//! external collaborator (spec.md §1) and is not built here; this crate only
//! exposes the in-process structure that surface would consume.

use auditrail_core::LATENCY_BUCKETS_MS;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Serialize)]
pub struct HistogramSnapshot {
    /// Cumulative count per upper bound in `LATENCY_BUCKETS_MS`, plus a
    /// final `+Inf` bucket.
    pub bucket_upper_bounds_ms: Vec<u64>,
    pub bucket_counts: Vec<u64>,
    pub sum_ns: u64,
    pub count: u64,
}

/// Fixed-bucket latency histogram, Prometheus-style cumulative buckets.
pub struct LatencyHistogram {
    bucket_counts: Vec<AtomicU64>,
    sum_ns: AtomicU64,
    count: AtomicU64,
}

impl LatencyHistogram {
    pub fn new() -> Self {
        Self {
            // One counter per finite bound plus the implicit +Inf bucket.
            bucket_counts: (0..=LATENCY_BUCKETS_MS.len()).map(|_| AtomicU64::new(0)).collect(),
            sum_ns: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn record(&self, d: Duration) {
        let ns = d.as_nanos().min(u64::MAX as u128) as u64;
        let ms = d.as_secs_f64() * 1000.0;
        for (i, bound) in LATENCY_BUCKETS_MS.iter().enumerate() {
            if ms <= *bound as f64 {
                self.bucket_counts[i].fetch_add(1, Ordering::Relaxed);
            }
        }
        // The +Inf bucket always observes everything.
        self.bucket_counts[LATENCY_BUCKETS_MS.len()].fetch_add(1, Ordering::Relaxed);
        self.sum_ns.fetch_add(ns, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        HistogramSnapshot {
            bucket_upper_bounds_ms: LATENCY_BUCKETS_MS.to_vec(),
            bucket_counts: self.bucket_counts.iter().map(|c| c.load(Ordering::Relaxed)).collect(),
            sum_ns: self.sum_ns.load(Ordering::Relaxed),
            count: self.count.load(Ordering::Relaxed),
        }
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

/// The worker's full counter/gauge/histogram set (spec.md §4.11).
pub struct Metrics {
    pub processed: AtomicU64,
    pub dropped: AtomicU64,
    pub blocked_submits: AtomicU64,
    pub event_pool_hits: AtomicU64,
    pub event_pool_misses: AtomicU64,
    pub queue_depth: AtomicU64,
    pub queue_capacity: AtomicU64,
    pub active_tasks: AtomicU64,
    /// 0 = drop mode, 1 = block mode.
    pub backpressure_mode: AtomicU64,
    pub latency: LatencyHistogram,
}

impl Metrics {
    pub fn new(queue_capacity: u64, block_mode: bool) -> Self {
        Self {
            processed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            blocked_submits: AtomicU64::new(0),
            event_pool_hits: AtomicU64::new(0),
            event_pool_misses: AtomicU64::new(0),
            queue_depth: AtomicU64::new(0),
            queue_capacity: AtomicU64::new(queue_capacity),
            active_tasks: AtomicU64::new(0),
            backpressure_mode: AtomicU64::new(if block_mode { 1 } else { 0 }),
            latency: LatencyHistogram::new(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub processed: u64,
    pub dropped: u64,
    pub blocked_submits: u64,
    pub event_pool_hits: u64,
    pub event_pool_misses: u64,
    pub queue_depth: u64,
    pub queue_capacity: u64,
    pub active_tasks: u64,
    pub backpressure_mode: u64,
    pub latency: HistogramSnapshot,
}

impl Metrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            blocked_submits: self.blocked_submits.load(Ordering::Relaxed),
            event_pool_hits: self.event_pool_hits.load(Ordering::Relaxed),
            event_pool_misses: self.event_pool_misses.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
            queue_capacity: self.queue_capacity.load(Ordering::Relaxed),
            active_tasks: self.active_tasks.load(Ordering::Relaxed),
            backpressure_mode: self.backpressure_mode.load(Ordering::Relaxed),
            latency: self.latency.snapshot(),
        }
    }
}
