use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::{Disposition, PacerConfig, PassThrough, ReleaseAdjuster};
use crate::clock::ClockState;

/// Cancelable bounded wait used for the pacing sleep.
///
/// Clones share one flag. [`cancel`](Self::cancel) wakes every sleeper and
/// makes all future sleeps return immediately; there is no way to re-arm a
/// cancelled gate.
#[derive(Clone, Default)]
pub struct SleepGate {
    inner: Arc<GateInner>,
}

#[derive(Default)]
struct GateInner {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

impl SleepGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `wait`. Returns false if cancelled before the time is up.
    pub fn sleep(&self, wait: Duration) -> bool {
        let mut cancelled = self.inner.cancelled.lock();
        if *cancelled {
            return false;
        }
        let deadline = Instant::now() + wait;
        loop {
            if self
                .inner
                .wake
                .wait_until(&mut cancelled, deadline)
                .timed_out()
            {
                return !*cancelled;
            }
            if *cancelled {
                return false;
            }
        }
    }

    /// Cancel the gate, waking any sleeper.
    pub fn cancel(&self) {
        *self.inner.cancelled.lock() = true;
        self.inner.wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock()
    }
}

/// Per-track release-time pacer.
///
/// Stateless between ticks except for the first-frame latch: the first
/// decision of a stream always renders, putting a frame up and establishing
/// the timing baseline the rest of the stream is paced against.
pub struct Pacer {
    config: PacerConfig,
    adjuster: Box<dyn ReleaseAdjuster>,
    gate: SleepGate,
    rendered_any: bool,
}

impl Pacer {
    /// Pacer with the identity release adjuster.
    pub fn new(config: PacerConfig) -> Self {
        Self::with_adjuster(config, Box::new(PassThrough))
    }

    /// Pacer with a custom release adjuster (e.g. vsync alignment).
    pub fn with_adjuster(config: PacerConfig, adjuster: Box<dyn ReleaseAdjuster>) -> Self {
        Self {
            config,
            adjuster,
            gate: SleepGate::new(),
            rendered_any: false,
        }
    }

    pub fn config(&self) -> &PacerConfig {
        &self.config
    }

    /// Handle used to abort an in-progress pacing sleep.
    pub fn gate(&self) -> SleepGate {
        self.gate.clone()
    }

    /// How early `pts_us` is relative to the playback position, corrected
    /// for time already burned inside the render pass. Negative means late.
    pub fn early_us(pts_us: i64, clock: &ClockState) -> i64 {
        pts_us - clock.position_us - clock.loop_lag_us()
    }

    /// Decide what to do with the head sample on this tick.
    ///
    /// The caller owns the follow-through: on [`Disposition::RenderNow`],
    /// [`ScheduleAt`](Disposition::ScheduleAt) and
    /// [`DropLate`](Disposition::DropLate) the sample must come off the
    /// queue; on [`Defer`](Disposition::Defer) it must stay. Deferring
    /// mutates no pacer state, so asking again with the same clock readings
    /// yields the same answer.
    ///
    /// The immediate-release path may block up to roughly
    /// `render_horizon_us` sleeping off an early margin.
    /// [`SleepGate::cancel`] aborts the wait, in which case the sample is
    /// deferred.
    pub fn decide(&mut self, pts_us: i64, clock: &ClockState) -> Disposition {
        if !self.rendered_any {
            self.rendered_any = true;
            tracing::debug!(pts_us, "first sample, rendering to establish baseline");
            return Disposition::RenderNow;
        }

        let raw_early_us = Self::early_us(pts_us, clock);
        let early_us = self.adjuster.adjust_early_us(raw_early_us, clock.now_ns);

        if early_us < -self.config.late_threshold_us {
            tracing::debug!(pts_us, late_us = -early_us, "sample missed its window");
            return Disposition::DropLate;
        }

        if self.config.use_scheduled_release {
            if early_us < self.config.schedule_horizon_us {
                return Disposition::ScheduleAt {
                    release_time_ns: clock.now_ns + early_us * 1_000,
                };
            }
            return Disposition::Defer;
        }

        if early_us >= self.config.render_horizon_us {
            return Disposition::Defer;
        }
        if early_us > self.config.sleep_threshold_us {
            let wait_us = (early_us - self.config.sleep_slack_us).max(0);
            tracing::trace!(pts_us, wait_us, "sleeping off early margin");
            if !self.gate.sleep(Duration::from_micros(wait_us as u64)) {
                return Disposition::Defer;
            }
        }
        Disposition::RenderNow
    }
}
