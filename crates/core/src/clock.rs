//! Clock inputs for pacing decisions.

use std::time::Instant;

/// Snapshot of the three clock readings one pacing decision needs.
///
/// The pipeline never reads clocks itself; the render loop samples them and
/// hands them in:
///
/// - `position_us`: playback position on the media timeline, microseconds.
///   Comparable to sample timestamps.
/// - `elapsed_realtime_us`: wall clock at the start of the render pass, in
///   microseconds.
/// - `now_ns`: wall clock now, nanoseconds, same timebase as
///   `elapsed_realtime_us`.
///
/// `now_ns` running ahead of `elapsed_realtime_us` measures time burned
/// inside the pass itself, which the earliness math subtracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockState {
    /// Playback position on the media timeline (microseconds).
    pub position_us: i64,
    /// Wall clock at the start of the render pass (microseconds).
    pub elapsed_realtime_us: i64,
    /// Wall clock now (nanoseconds).
    pub now_ns: i64,
}

impl ClockState {
    pub fn new(position_us: i64, elapsed_realtime_us: i64, now_ns: i64) -> Self {
        Self {
            position_us,
            elapsed_realtime_us,
            now_ns,
        }
    }

    /// Microseconds spent since the render pass sampled its wall clock.
    pub fn loop_lag_us(&self) -> i64 {
        self.now_ns / 1_000 - self.elapsed_realtime_us
    }
}

/// Monotonic wall-clock source anchored at construction.
///
/// Backed by [`Instant`], so readings never go backwards. Clones share the
/// same origin and therefore the same timebase.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Microseconds since the clock was created.
    pub fn now_us(&self) -> i64 {
        self.origin.elapsed().as_micros() as i64
    }

    /// Nanoseconds since the clock was created.
    pub fn now_ns(&self) -> i64 {
        self.origin.elapsed().as_nanos() as i64
    }

    /// Coherent [`ClockState`] for a render pass beginning now.
    ///
    /// Both wall-clock fields come from a single reading, so the state
    /// starts with zero loop lag.
    pub fn state(&self, position_us: i64) -> ClockState {
        let elapsed = self.origin.elapsed();
        ClockState {
            position_us,
            elapsed_realtime_us: elapsed.as_micros() as i64,
            now_ns: elapsed.as_nanos() as i64,
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}
