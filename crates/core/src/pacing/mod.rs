//! Release-time pacing for annotated samples.
//!
//! On every render tick the [`Pacer`] compares the head sample's
//! presentation time against the playback position and wall clock, and
//! decides what the output should do with it. The decision set matches what
//! output paths can actually execute:
//!
//! - **Render now**: hand the sample over for immediate presentation.
//! - **Schedule**: hand the sample over with an absolute release deadline,
//!   for outputs that queue timed releases themselves.
//! - **Drop**: the sample missed its window; presenting it would only push
//!   everything later.
//! - **Defer**: too early to act; leave the sample queued and ask again.
//!
//! Outputs that slew release times onto display refresh boundaries plug in
//! through the [`ReleaseAdjuster`] trait; [`vsync::VsyncAligned`] is the
//! bundled grid-snapping implementation and [`PassThrough`] the identity.

pub mod pacer;
pub mod vsync;

use crate::error::{PlayoutError, Result};

pub use pacer::{Pacer, SleepGate};
pub use vsync::VsyncAligned;

/// Samples later than this are dropped instead of presented. Strict: a
/// sample exactly this late still renders.
pub const DEFAULT_LATE_THRESHOLD_US: i64 = 30_000;

/// Scheduled-release outputs accept deadlines up to this far ahead.
pub const DEFAULT_SCHEDULE_HORIZON_US: i64 = 50_000;

/// Immediate-release outputs act on samples due within this horizon.
pub const DEFAULT_RENDER_HORIZON_US: i64 = 30_000;

/// Earliness above which the immediate path sleeps before rendering.
pub const DEFAULT_SLEEP_THRESHOLD_US: i64 = 11_000;

/// The pacing sleep wakes this much before the release target.
pub const DEFAULT_SLEEP_SLACK_US: i64 = 10_000;

/// What to do with the sample at the head of the queue on this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Present the sample immediately.
    RenderNow,
    /// Hand the sample to the output with an absolute release deadline.
    ScheduleAt {
        /// Deadline on the same timebase as [`ClockState::now_ns`](crate::clock::ClockState).
        release_time_ns: i64,
    },
    /// The sample missed its window; discard it without presenting.
    DropLate,
    /// Too early to act. The sample stays queued; ask again next tick.
    Defer,
}

/// Pacing thresholds and release mode.
///
/// The defaults come from measured playback behavior on mobile output
/// paths; all of them are tunable per pipeline.
#[derive(Debug, Clone)]
pub struct PacerConfig {
    /// Lateness beyond this (strictly) drops the sample.
    pub late_threshold_us: i64,
    /// Scheduled-release path: earliness below this schedules, at or above
    /// defers.
    pub schedule_horizon_us: i64,
    /// Immediate-release path: earliness below this renders, at or above
    /// defers.
    pub render_horizon_us: i64,
    /// Immediate-release path: earliness above this sleeps off the wait
    /// before rendering.
    pub sleep_threshold_us: i64,
    /// How much of the wait the pacing sleep leaves unslept.
    pub sleep_slack_us: i64,
    /// Whether the output accepts absolute future release times.
    pub use_scheduled_release: bool,
}

impl Default for PacerConfig {
    fn default() -> Self {
        Self {
            late_threshold_us: DEFAULT_LATE_THRESHOLD_US,
            schedule_horizon_us: DEFAULT_SCHEDULE_HORIZON_US,
            render_horizon_us: DEFAULT_RENDER_HORIZON_US,
            sleep_threshold_us: DEFAULT_SLEEP_THRESHOLD_US,
            sleep_slack_us: DEFAULT_SLEEP_SLACK_US,
            use_scheduled_release: true,
        }
    }
}

impl PacerConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.late_threshold_us < 0
            || self.schedule_horizon_us <= 0
            || self.render_horizon_us <= 0
        {
            return Err(PlayoutError::InvalidConfig(
                "pacing thresholds must be positive".to_string(),
            ));
        }
        if self.sleep_slack_us > self.sleep_threshold_us {
            return Err(PlayoutError::InvalidConfig(format!(
                "sleep_slack_us {} exceeds sleep_threshold_us {}",
                self.sleep_slack_us, self.sleep_threshold_us
            )));
        }
        Ok(())
    }
}

/// Adjusts how early a sample is released, given the implied release time.
///
/// Display pipelines often slew release times onto refresh boundaries; the
/// pacer treats that policy as pluggable. Implementations must be
/// repeat-stable: the same `(early_us, now_ns)` input yields the same
/// output, so a deferred sample re-evaluates consistently on later ticks.
pub trait ReleaseAdjuster: Send {
    /// Return the adjusted earliness in microseconds.
    fn adjust_early_us(&mut self, early_us: i64, now_ns: i64) -> i64;
}

/// Identity adjuster: earliness passes through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

impl ReleaseAdjuster for PassThrough {
    fn adjust_early_us(&mut self, early_us: i64, _now_ns: i64) -> i64 {
        early_us
    }
}
