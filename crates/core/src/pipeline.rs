//! Per-track playback pipeline.
//!
//! A [`TrackPipeline`] joins the two halves of the timing core: the ingest
//! side feeds demuxed access units through duration inference and queues the
//! finalized samples; the render side calls [`TrackPipeline::tick`] each pass
//! to learn what to do with the head of the queue. The two sides are safe to
//! drive from different threads.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use crate::clock::ClockState;
use crate::error::{PlayoutError, Result};
use crate::infer::{DurationEstimator, InferenceConfig};
use crate::pacing::{Disposition, Pacer, PacerConfig, PassThrough, ReleaseAdjuster, SleepGate};
use crate::queue::SampleQueue;
use crate::sample::{AccessUnit, Sample, TrackKind};
use crate::stats::{PipelineStats, StatsSnapshot};

/// Everything needed to build one track's pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Which elementary stream this pipeline carries.
    pub track: TrackKind,
    /// Duration inference tuning.
    pub inference: InferenceConfig,
    /// Pacing thresholds and release mode.
    pub pacing: PacerConfig,
    /// Skip pacing entirely: every tick hands over the head sample. Used
    /// when a downstream sink does its own timing.
    pub demux_only: bool,
}

impl PipelineConfig {
    pub fn new(track: TrackKind) -> Self {
        Self {
            track,
            inference: InferenceConfig::default(),
            pacing: PacerConfig::default(),
            demux_only: false,
        }
    }
}

/// Outcome of one render pass over a pipeline.
#[derive(Debug, PartialEq, Eq)]
pub enum TickResult {
    /// Present this sample immediately.
    Render(Sample),
    /// Hand this sample to the output with an absolute release deadline.
    RenderAt {
        /// Deadline on the same timebase as [`ClockState::now_ns`].
        release_time_ns: i64,
        sample: Sample,
    },
    /// This sample missed its window and was removed without presenting.
    Dropped(Sample),
    /// The head sample is not due yet; it stays queued.
    NotReady,
    /// Nothing queued, but more may arrive.
    Empty,
    /// Nothing queued and nothing more will arrive.
    Ended,
}

#[derive(Default)]
struct SignalInner {
    generation: Mutex<u64>,
    cond: Condvar,
}

/// Wakes a render loop that ran out of queued samples.
///
/// The ingest side fires it whenever new samples become ready; a waiter
/// blocks until the next firing or a timeout. Clones share the signal.
#[derive(Clone, Default)]
pub struct ReadySignal {
    inner: Arc<SignalInner>,
}

impl ReadySignal {
    /// Wake every current waiter.
    pub fn notify(&self) {
        let mut generation = self.inner.generation.lock();
        *generation = generation.wrapping_add(1);
        self.inner.cond.notify_all();
    }

    /// Block until the signal fires or `timeout` passes.
    ///
    /// Returns `true` if the signal fired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut generation = self.inner.generation.lock();
        let seen = *generation;
        while *generation == seen {
            if self
                .inner
                .cond
                .wait_until(&mut generation, deadline)
                .timed_out()
            {
                break;
            }
        }
        *generation != seen
    }
}

/// One elementary stream's timed delivery path.
pub struct TrackPipeline {
    track: TrackKind,
    demux_only: bool,
    estimator: Mutex<DurationEstimator>,
    queue: Arc<SampleQueue>,
    pacer: Mutex<Pacer>,
    gate: SleepGate,
    ready: ReadySignal,
    stats: Arc<PipelineStats>,
}

impl TrackPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        Self::with_adjuster(config, Box::new(PassThrough))
    }

    /// Build a pipeline whose pacer slews release times through `adjuster`.
    pub fn with_adjuster(
        config: PipelineConfig,
        adjuster: Box<dyn ReleaseAdjuster>,
    ) -> Result<Self> {
        let PipelineConfig {
            track,
            inference,
            pacing,
            demux_only,
        } = config;
        pacing.validate()?;
        let estimator = DurationEstimator::new(inference)?;
        let pacer = Pacer::with_adjuster(pacing, adjuster);
        let gate = pacer.gate();
        debug!(track = %track, demux_only, "pipeline created");
        Ok(Self {
            track,
            demux_only,
            estimator: Mutex::new(estimator),
            queue: Arc::new(SampleQueue::new()),
            pacer: Mutex::new(pacer),
            gate,
            ready: ReadySignal::default(),
            stats: Arc::new(PipelineStats::default()),
        })
    }

    pub fn track(&self) -> TrackKind {
        self.track
    }

    /// Samples still inside the inference window.
    pub fn pending_len(&self) -> usize {
        self.estimator.lock().pending_len()
    }

    /// Samples queued with finalized durations, awaiting release.
    pub fn ready_len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.queue.is_closed()
    }

    /// Whether ticking can ever yield another sample: the pipeline was shut
    /// down, or end-of-stream is marked and the queue has drained.
    pub fn is_ended(&self) -> bool {
        self.queue.is_closed() || (self.queue.is_eos() && self.queue.is_empty())
    }

    /// Use `signal` instead of this pipeline's own ready signal.
    ///
    /// Lets several pipelines (an audio and a video track, say) wake the one
    /// render loop that serves them all.
    #[must_use]
    pub fn with_ready_signal(mut self, signal: ReadySignal) -> Self {
        self.ready = signal;
        self
    }

    /// Signal fired whenever ingest makes new samples ready.
    pub fn ready_signal(&self) -> ReadySignal {
        self.ready.clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Feed one demuxed access unit.
    ///
    /// Runs duration inference and queues whatever it finalizes. Returns the
    /// number of samples that became ready on this call. A terminator unit
    /// drains the inference window and marks the queue end-of-stream.
    pub fn ingest(&self, unit: AccessUnit) -> Result<usize> {
        if self.queue.is_closed() {
            return Err(PlayoutError::ShutDown);
        }
        let terminator = unit.end_of_stream;
        let finalized = self.estimator.lock().ingest(unit)?;
        self.stats.record_ingested();

        let mut queued = 0usize;
        for sample in finalized {
            if self.queue.push(sample) {
                queued += 1;
            }
        }
        if queued > 0 {
            self.stats.record_annotated(queued as u64);
            trace!(track = %self.track, queued, "samples ready");
        }
        if terminator {
            self.queue.mark_eos();
            debug!(track = %self.track, "stream ended");
        }
        if queued > 0 || terminator {
            self.ready.notify();
        }
        Ok(queued)
    }

    /// Decide what to do with the head sample on this render pass.
    ///
    /// Single-consumer: call from one render loop at a time.
    pub fn tick(&self, clock: &ClockState) -> TickResult {
        let Some(pts_us) = self.queue.peek_pts() else {
            return self.end_state();
        };

        if self.demux_only {
            return match self.queue.pop() {
                Some(sample) => {
                    self.stats.record_rendered();
                    TickResult::Render(sample)
                }
                None => self.end_state(),
            };
        }

        match self.pacer.lock().decide(pts_us, clock) {
            Disposition::Defer => {
                self.stats.record_deferred();
                TickResult::NotReady
            }
            Disposition::RenderNow => match self.queue.pop() {
                Some(sample) => {
                    self.stats.record_rendered();
                    trace!(track = %self.track, pts_us, "render");
                    TickResult::Render(sample)
                }
                None => self.end_state(),
            },
            Disposition::ScheduleAt { release_time_ns } => match self.queue.pop() {
                Some(sample) => {
                    self.stats.record_scheduled();
                    trace!(track = %self.track, pts_us, release_time_ns, "scheduled");
                    TickResult::RenderAt {
                        release_time_ns,
                        sample,
                    }
                }
                None => self.end_state(),
            },
            Disposition::DropLate => match self.queue.pop() {
                Some(sample) => {
                    self.stats.record_dropped();
                    debug!(track = %self.track, pts_us, "dropped late sample");
                    TickResult::Dropped(sample)
                }
                None => self.end_state(),
            },
        }
    }

    /// Tear the pipeline down: cancel any pacing sleep, throw away samples
    /// still in flight, refuse further ingest.
    ///
    /// Returns `(pending, queued)`: how many samples were discarded from the
    /// inference window and from the ready queue. Idempotent.
    pub fn shutdown(&self) -> (usize, usize) {
        self.gate.cancel();
        let pending = self.estimator.lock().discard();
        let queued = self.queue.close();
        self.stats.record_discarded((pending + queued) as u64);
        self.ready.notify();
        debug!(track = %self.track, pending, queued, "pipeline shut down");
        (pending, queued)
    }

    fn end_state(&self) -> TickResult {
        if self.queue.is_closed() || self.queue.is_eos() {
            TickResult::Ended
        } else {
            TickResult::Empty
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn unit(pts_us: i64) -> AccessUnit {
        AccessUnit::new(pts_us, vec![0u8; 8])
    }

    /// Clock with zero loop lag at the given instant.
    fn clock(position_us: i64, now_ns: i64) -> ClockState {
        ClockState::new(position_us, now_ns / 1_000, now_ns)
    }

    fn small_window(track: TrackKind) -> PipelineConfig {
        let mut config = PipelineConfig::new(track);
        config.inference.window_len = 3;
        config
    }

    fn immediate_pipeline() -> TrackPipeline {
        let mut config = small_window(TrackKind::Video);
        config.pacing.use_scheduled_release = false;
        TrackPipeline::new(config).expect("valid config")
    }

    // --- construction ---

    #[test]
    fn rejects_undersized_window() {
        let mut config = PipelineConfig::new(TrackKind::Audio);
        config.inference.window_len = 2;
        assert!(matches!(
            TrackPipeline::new(config),
            Err(PlayoutError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_bad_pacing() {
        let mut config = PipelineConfig::new(TrackKind::Video);
        config.pacing.sleep_slack_us = config.pacing.sleep_threshold_us + 1;
        assert!(matches!(
            TrackPipeline::new(config),
            Err(PlayoutError::InvalidConfig(_))
        ));
    }

    // --- demux-only delivery ---

    #[test]
    fn demux_only_delivers_in_order() {
        let mut config = small_window(TrackKind::Audio);
        config.demux_only = true;
        let pipeline = TrackPipeline::new(config).expect("valid config");

        for i in 0..5 {
            pipeline.ingest(unit(i * 10_000)).expect("ingest");
        }
        pipeline.ingest(AccessUnit::end_of_stream()).expect("eos");

        let state = clock(0, 0);
        let mut seen = Vec::new();
        loop {
            match pipeline.tick(&state) {
                TickResult::Render(sample) => {
                    assert_eq!(sample.duration_us(), 10_000);
                    seen.push(sample.pts_us());
                }
                TickResult::Ended => break,
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        assert_eq!(seen, vec![0, 10_000, 20_000, 30_000, 40_000]);
        assert_eq!(pipeline.stats().rendered, 5);
    }

    // --- paced delivery ---

    #[test]
    fn first_tick_renders_regardless_of_clock() {
        let pipeline = immediate_pipeline();
        for pts in [500_000, 540_000, 580_000] {
            pipeline.ingest(unit(pts)).expect("ingest");
        }
        assert_eq!(pipeline.ready_len(), 1);

        // Head is half a second early; the first frame still goes out.
        let result = pipeline.tick(&clock(0, 0));
        assert!(matches!(result, TickResult::Render(s) if s.pts_us() == 500_000));
    }

    #[test]
    fn defer_leaves_head_queued() {
        let pipeline = immediate_pipeline();
        for pts in [0, 40_000, 80_000, 120_000] {
            pipeline.ingest(unit(pts)).expect("ingest");
        }
        pipeline.ingest(AccessUnit::end_of_stream()).expect("eos");
        assert!(matches!(
            pipeline.tick(&clock(0, 0)),
            TickResult::Render(_)
        ));

        // 40ms early on the immediate path: defer, twice, no state change.
        assert_eq!(pipeline.tick(&clock(0, 0)), TickResult::NotReady);
        assert_eq!(pipeline.tick(&clock(0, 0)), TickResult::NotReady);
        assert_eq!(pipeline.ready_len(), 3);

        // Position advanced into the render window: same head goes out.
        let result = pipeline.tick(&clock(35_000, 0));
        assert!(matches!(result, TickResult::Render(s) if s.pts_us() == 40_000));
        assert_eq!(pipeline.stats().deferred, 2);
    }

    #[test]
    fn paced_flow_mixes_outcomes() {
        let pipeline = immediate_pipeline();
        for pts in [0, 40_000, 80_000, 120_000, 160_000] {
            pipeline.ingest(unit(pts)).expect("ingest");
        }
        pipeline.ingest(AccessUnit::end_of_stream()).expect("eos");
        assert_eq!(pipeline.ready_len(), 5);

        assert!(matches!(
            pipeline.tick(&clock(0, 0)),
            TickResult::Render(s) if s.pts_us() == 0
        ));
        // 80ms late: beyond the drop threshold.
        assert!(matches!(
            pipeline.tick(&clock(120_000, 0)),
            TickResult::Dropped(s) if s.pts_us() == 40_000
        ));
        // Exactly 30ms late: still renders.
        assert!(matches!(
            pipeline.tick(&clock(110_000, 0)),
            TickResult::Render(s) if s.pts_us() == 80_000
        ));
        assert!(matches!(
            pipeline.tick(&clock(120_000, 0)),
            TickResult::Render(s) if s.pts_us() == 120_000
        ));
        assert!(matches!(
            pipeline.tick(&clock(160_000, 0)),
            TickResult::Render(s) if s.pts_us() == 160_000
        ));
        assert_eq!(pipeline.tick(&clock(200_000, 0)), TickResult::Ended);

        let stats = pipeline.stats();
        assert_eq!(stats.ingested, 6);
        assert_eq!(stats.annotated, 5);
        assert_eq!(stats.rendered, 4);
        assert_eq!(stats.dropped_late, 1);
    }

    #[test]
    fn scheduled_release_carries_deadline() {
        let pipeline = TrackPipeline::new(small_window(TrackKind::Video)).expect("valid config");
        for pts in [0, 40_000, 80_000] {
            pipeline.ingest(unit(pts)).expect("ingest");
        }
        pipeline.ingest(AccessUnit::end_of_stream()).expect("eos");
        assert!(matches!(
            pipeline.tick(&clock(0, 1_000_000_000)),
            TickResult::Render(_)
        ));

        // 40ms early, inside the 50ms horizon: scheduled 40ms out.
        let result = pipeline.tick(&clock(0, 1_000_000_000));
        match result {
            TickResult::RenderAt {
                release_time_ns,
                sample,
            } => {
                assert_eq!(sample.pts_us(), 40_000);
                assert_eq!(release_time_ns, 1_040_000_000);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        // Head now 80ms early: beyond the horizon, stays queued.
        assert_eq!(
            pipeline.tick(&clock(0, 1_000_000_000)),
            TickResult::NotReady
        );
        assert_eq!(pipeline.stats().scheduled, 1);
    }

    // --- end of stream ---

    #[test]
    fn empty_before_eos_ended_after() {
        let pipeline = immediate_pipeline();
        assert_eq!(pipeline.tick(&clock(0, 0)), TickResult::Empty);

        pipeline.ingest(unit(0)).expect("ingest");
        pipeline.ingest(AccessUnit::end_of_stream()).expect("eos");
        assert!(matches!(
            pipeline.tick(&clock(0, 0)),
            TickResult::Render(_)
        ));
        assert_eq!(pipeline.tick(&clock(0, 0)), TickResult::Ended);
    }

    #[test]
    fn ingest_after_eos_fails() {
        let pipeline = immediate_pipeline();
        pipeline.ingest(AccessUnit::end_of_stream()).expect("eos");
        assert!(matches!(
            pipeline.ingest(unit(0)),
            Err(PlayoutError::StreamEnded)
        ));
    }

    // --- shutdown ---

    #[test]
    fn shutdown_discards_pending_and_queued() {
        let pipeline = immediate_pipeline();
        for i in 0..5 {
            pipeline.ingest(unit(i * 10_000)).expect("ingest");
        }
        assert_eq!(pipeline.pending_len(), 2);
        assert_eq!(pipeline.ready_len(), 3);

        assert_eq!(pipeline.shutdown(), (2, 3));
        assert!(pipeline.is_shut_down());
        assert_eq!(pipeline.stats().discarded, 5);

        assert_eq!(pipeline.tick(&clock(0, 0)), TickResult::Ended);
        assert!(matches!(
            pipeline.ingest(unit(99_000)),
            Err(PlayoutError::ShutDown)
        ));
        // Second shutdown finds nothing left.
        assert_eq!(pipeline.shutdown(), (0, 0));
    }

    // --- ready signal ---

    #[test]
    fn ready_signal_wakes_waiter() {
        let pipeline = Arc::new(immediate_pipeline());
        let signal = pipeline.ready_signal();

        let producer = {
            let pipeline = Arc::clone(&pipeline);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(100));
                for i in 0..3 {
                    pipeline.ingest(unit(i * 10_000)).expect("ingest");
                }
            })
        };

        assert!(signal.wait_timeout(Duration::from_secs(5)));
        producer.join().expect("producer");
        assert_eq!(pipeline.ready_len(), 1);
    }

    #[test]
    fn ready_signal_times_out_quietly() {
        let signal = ReadySignal::default();
        assert!(!signal.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn pipelines_share_an_injected_signal() {
        let shared = ReadySignal::default();
        let video = Arc::new(
            TrackPipeline::new(small_window(TrackKind::Video))
                .expect("valid config")
                .with_ready_signal(shared.clone()),
        );

        let waiter = {
            let shared = shared.clone();
            thread::spawn(move || shared.wait_timeout(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(100));
        for i in 0..3 {
            video.ingest(unit(i * 10_000)).expect("ingest");
        }
        assert!(waiter.join().expect("waiter"), "ingest did not fire the shared signal");
    }

    // --- end state ---

    #[test]
    fn is_ended_tracks_stream_state() {
        let pipeline = immediate_pipeline();
        assert!(!pipeline.is_ended());

        pipeline.ingest(unit(0)).expect("ingest");
        pipeline.ingest(AccessUnit::end_of_stream()).expect("eos");
        assert!(!pipeline.is_ended(), "sample still queued");

        assert!(matches!(
            pipeline.tick(&clock(0, 0)),
            TickResult::Render(_)
        ));
        assert!(pipeline.is_ended());
    }
}
