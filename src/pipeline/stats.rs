//! Per-session cycle counters, mirrored to the `metrics` facade.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct PipelineStats {
    cycles: AtomicU64,
    metadata_waits: AtomicU64,
    raw_frames: AtomicU64,
    submitted: AtomicU64,
    busy_skips: AtomicU64,
    results_drawn: AtomicU64,
    empty_results: AtomicU64,
    failures: AtomicU64,
    stale_discarded: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub cycles: u64,
    pub metadata_waits: u64,
    pub raw_frames: u64,
    pub submitted: u64,
    pub busy_skips: u64,
    pub results_drawn: u64,
    pub empty_results: u64,
    pub failures: u64,
    pub stale_discarded: u64,
    pub in_flight: usize,
    pub peak_in_flight: usize,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("tryon_cycles_total").increment(1);
    }

    pub(crate) fn metadata_wait(&self) {
        self.metadata_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn raw_frame(&self) {
        self.raw_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        metrics::counter!("tryon_requests_total").increment(1);
    }

    pub(crate) fn settled(&self) {
        let _ = self
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    pub(crate) fn busy_skip(&self) {
        self.busy_skips.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("tryon_busy_skips_total").increment(1);
    }

    pub(crate) fn result_drawn(&self) {
        self.results_drawn.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn empty_result(&self) {
        self.empty_results.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("tryon_failures_total").increment(1);
    }

    pub(crate) fn stale_discarded(&self) {
        self.stale_discarded.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("tryon_stale_results_total").increment(1);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            metadata_waits: self.metadata_waits.load(Ordering::Relaxed),
            raw_frames: self.raw_frames.load(Ordering::Relaxed),
            submitted: self.submitted.load(Ordering::Relaxed),
            busy_skips: self.busy_skips.load(Ordering::Relaxed),
            results_drawn: self.results_drawn.load(Ordering::Relaxed),
            empty_results: self.empty_results.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            stale_discarded: self.stale_discarded.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::SeqCst),
            peak_in_flight: self.peak_in_flight.load(Ordering::SeqCst),
        }
    }
}
