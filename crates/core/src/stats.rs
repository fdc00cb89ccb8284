//! Per-pipeline delivery counters.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters describing what a pipeline has done so far.
///
/// Updated from both the ingest and render contexts. Reads are relaxed
/// snapshots and may trail the hot paths by a tick.
#[derive(Debug, Default)]
pub struct PipelineStats {
    ingested: AtomicU64,
    annotated: AtomicU64,
    rendered: AtomicU64,
    scheduled: AtomicU64,
    dropped_late: AtomicU64,
    deferred: AtomicU64,
    discarded: AtomicU64,
}

impl PipelineStats {
    pub(crate) fn record_ingested(&self) {
        self.ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_annotated(&self, n: u64) {
        self.annotated.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn record_rendered(&self) {
        self.rendered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_scheduled(&self) {
        self.scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped_late.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_deferred(&self) {
        self.deferred.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_discarded(&self, n: u64) {
        self.discarded.fetch_add(n, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ingested: self.ingested.load(Ordering::Relaxed),
            annotated: self.annotated.load(Ordering::Relaxed),
            rendered: self.rendered.load(Ordering::Relaxed),
            scheduled: self.scheduled.load(Ordering::Relaxed),
            dropped_late: self.dropped_late.load(Ordering::Relaxed),
            deferred: self.deferred.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`PipelineStats`] at one moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Access units accepted by `ingest` (terminator included).
    pub ingested: u64,
    /// Samples that left inference with a finalized duration.
    pub annotated: u64,
    /// Samples handed over for immediate presentation.
    pub rendered: u64,
    /// Samples handed over with a scheduled release time.
    pub scheduled: u64,
    /// Samples dropped for missing their window.
    pub dropped_late: u64,
    /// Ticks that left the head sample queued.
    pub deferred: u64,
    /// Samples thrown away by shutdown.
    pub discarded: u64,
}

impl StatsSnapshot {
    /// Samples that left the pipeline one way or another.
    pub fn delivered(&self) -> u64 {
        self.rendered + self.scheduled + self.dropped_late
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ingested={} annotated={} rendered={} scheduled={} dropped={} deferred={} discarded={}",
            self.ingested,
            self.annotated,
            self.rendered,
            self.scheduled,
            self.dropped_late,
            self.deferred,
            self.discarded
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = PipelineStats::default();
        stats.record_ingested();
        stats.record_ingested();
        stats.record_annotated(3);
        stats.record_rendered();
        stats.record_scheduled();
        stats.record_dropped();
        stats.record_deferred();
        stats.record_discarded(4);

        let snap = stats.snapshot();
        assert_eq!(snap.ingested, 2);
        assert_eq!(snap.annotated, 3);
        assert_eq!(snap.rendered, 1);
        assert_eq!(snap.scheduled, 1);
        assert_eq!(snap.dropped_late, 1);
        assert_eq!(snap.deferred, 1);
        assert_eq!(snap.discarded, 4);
        assert_eq!(snap.delivered(), 3);
    }

    #[test]
    fn snapshot_starts_zeroed() {
        let snap = PipelineStats::default().snapshot();
        assert_eq!(snap, StatsSnapshot::default());
    }

    #[test]
    fn display_is_compact() {
        let stats = PipelineStats::default();
        stats.record_rendered();
        let line = stats.snapshot().to_string();
        assert!(line.contains("rendered=1"));
        assert!(line.contains("dropped=0"));
    }
}
