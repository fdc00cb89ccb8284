//! Sample duration inference.
//!
//! Segmented transport streams carry presentation timestamps but no
//! per-sample durations, while decoders and the pacing math downstream need
//! both. The [`DurationEstimator`] reconstructs durations from timestamps
//! alone: it holds a small sliding window of pending samples and bounds each
//! sample's duration by the smallest positive timestamp gap to a nearby
//! neighbor.
//!
//! ## Windowed inference
//!
//! Units arrive in decode order, which for streams with bidirectional
//! prediction is not presentation order, so `next.pts - this.pts` over
//! adjacent arrivals can be negative or wildly wrong. Instead, each pending
//! sample at index `i` scans the arrival-order neighborhood
//! `[i - lookbehind, i + lookahead)` and takes
//!
//! ```text
//! duration(i) = min over neighbors j with pts(j) > pts(i) of pts(j) - pts(i)
//! ```
//!
//! Durations start at an unknown sentinel and only ever decrease, so a pass
//! can only tighten estimates. Once the window is full, the oldest sample's
//! neighborhood can no longer grow and it is emitted with its duration
//! finalized. At end of stream the remainder is drained in one final pass.
//!
//! A sample whose duration is still unknown when it pops (the last sample of
//! a stream, runs of identical timestamps) inherits the duration of the
//! previously emitted sample, falling back to [`FALLBACK_DURATION_US`] when
//! there is none.

use std::collections::VecDeque;

use crate::error::{PlayoutError, Result};
use crate::sample::{AccessUnit, Sample};

/// Default pending-window length.
pub const DEFAULT_WINDOW_LEN: usize = 10;

/// Smallest usable window. Below this the neighborhood carries too little
/// context to bound a duration.
pub const MIN_WINDOW_LEN: usize = 3;

/// How many earlier arrivals each candidate scans by default.
pub const DEFAULT_LOOKBEHIND: usize = 2;

/// How many positions past the candidate the scan reaches by default
/// (exclusive bound, so 7 covers the six arrivals after it).
pub const DEFAULT_LOOKAHEAD: usize = 7;

/// Duration assigned when nothing can be inferred at all (single-sample
/// streams, leading runs of identical timestamps): one frame at ~30 fps.
pub const FALLBACK_DURATION_US: i64 = 33_333;

/// Window geometry for duration inference.
///
/// The defaults favor look-ahead: future arrivals usually hold the
/// presentation successor of a reordered frame, while the look-behind only
/// needs to cover how far a frame can be displaced backwards.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// Pending-window length. Minimum [`MIN_WINDOW_LEN`].
    pub window_len: usize,
    /// Neighbor scan reach behind each candidate.
    pub lookbehind: usize,
    /// Neighbor scan reach past each candidate (exclusive bound).
    pub lookahead: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            window_len: DEFAULT_WINDOW_LEN,
            lookbehind: DEFAULT_LOOKBEHIND,
            lookahead: DEFAULT_LOOKAHEAD,
        }
    }
}

impl InferenceConfig {
    fn validate(&self) -> Result<()> {
        if self.window_len < MIN_WINDOW_LEN {
            return Err(PlayoutError::InvalidConfig(format!(
                "window_len {} below minimum {}",
                self.window_len, MIN_WINDOW_LEN
            )));
        }
        if self.lookahead == 0 {
            return Err(PlayoutError::InvalidConfig(
                "lookahead must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Sliding-window duration estimator for one track.
///
/// Feed it demuxed units via [`ingest`](Self::ingest); it returns annotated
/// samples as their durations finalize. Samples come out in arrival order,
/// delayed by up to one window length.
#[derive(Debug)]
pub struct DurationEstimator {
    config: InferenceConfig,
    window: VecDeque<Sample>,
    /// Duration of the most recent emission, inherited by samples whose own
    /// duration could not be inferred.
    last_duration_us: Option<i64>,
    /// Highest presentation timestamp among emitted samples. Arrivals behind
    /// this can never be repaired by the window and are rejected.
    horizon_us: Option<i64>,
    finished: bool,
}

impl DurationEstimator {
    /// Create an estimator with the given window geometry.
    pub fn new(config: InferenceConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            window: VecDeque::with_capacity(config.window_len),
            config,
            last_duration_us: None,
            horizon_us: None,
            finished: false,
        })
    }

    /// Create an estimator with the default window geometry.
    pub fn with_defaults() -> Self {
        Self {
            window: VecDeque::with_capacity(DEFAULT_WINDOW_LEN),
            config: InferenceConfig::default(),
            last_duration_us: None,
            horizon_us: None,
            finished: false,
        }
    }

    /// The window geometry this estimator runs with.
    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    /// Number of samples waiting in the window.
    pub fn pending_len(&self) -> usize {
        self.window.len()
    }

    /// Whether the end-of-stream terminator has been seen (or the estimator
    /// was discarded).
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed one unit through the window.
    ///
    /// Ordinary calls return zero samples (window still filling) or one (the
    /// oldest sample, its duration finalized). The end-of-stream terminator
    /// drains everything still pending; if the terminator carries a payload,
    /// that payload becomes the final sample. An empty terminator marker is
    /// not emitted.
    ///
    /// Errors reject the unit without touching the window: negative
    /// timestamps, timestamps behind the finalized horizon, and any unit
    /// after the terminator.
    pub fn ingest(&mut self, unit: AccessUnit) -> Result<Vec<Sample>> {
        if self.finished {
            return Err(PlayoutError::StreamEnded);
        }

        let terminator = unit.end_of_stream;
        if !terminator || !unit.data.is_empty() {
            self.accept(unit)?;
        }

        let mut emitted = Vec::new();
        if terminator {
            self.finished = true;
            self.infer_pass();
            while let Some(sample) = self.emit_front() {
                emitted.push(sample);
            }
            tracing::debug!(drained = emitted.len(), "end of stream, drained pending window");
        } else if self.window.len() >= self.config.window_len {
            self.infer_pass();
            if let Some(sample) = self.emit_front() {
                emitted.push(sample);
            }
        }
        Ok(emitted)
    }

    /// Drop everything still pending without inferring durations.
    ///
    /// Teardown path: the stream is being abandoned, not completed. The
    /// estimator refuses further input afterwards. Returns how many pending
    /// samples were dropped.
    pub fn discard(&mut self) -> usize {
        let dropped = self.window.len();
        self.window.clear();
        self.finished = true;
        if dropped > 0 {
            tracing::debug!(dropped, "pending window discarded");
        }
        dropped
    }

    fn accept(&mut self, unit: AccessUnit) -> Result<()> {
        if unit.pts_us < 0 {
            return Err(PlayoutError::NegativeTimestamp { pts_us: unit.pts_us });
        }
        if let Some(horizon_us) = self.horizon_us {
            if unit.pts_us < horizon_us {
                return Err(PlayoutError::OutOfOrderBeyondWindow {
                    pts_us: unit.pts_us,
                    horizon_us,
                });
            }
        }
        tracing::trace!(
            pts_us = unit.pts_us,
            pending = self.window.len() + 1,
            "unit accepted"
        );
        self.window.push_back(Sample::pending(unit));
        Ok(())
    }

    /// One tightening pass over the whole window.
    ///
    /// Each candidate takes the smallest positive pts gap to a neighbor in
    /// `[i - lookbehind, i + lookahead)`, clipped to the window. Updates only
    /// lower durations, so repeated passes over the same samples are safe.
    fn infer_pass(&mut self) {
        let len = self.window.len();
        let pts: Vec<i64> = self.window.iter().map(|s| s.pts_us()).collect();
        for i in 0..len {
            let lo = i.saturating_sub(self.config.lookbehind);
            let hi = (i + self.config.lookahead).min(len);
            let mut tightest: Option<i64> = None;
            for j in lo..hi {
                if pts[j] > pts[i] {
                    let gap = pts[j] - pts[i];
                    tightest = Some(tightest.map_or(gap, |t| t.min(gap)));
                }
            }
            if let Some(gap) = tightest {
                self.window[i].tighten_duration(gap);
            }
        }
    }

    /// Pop the oldest pending sample, resolving an unknown duration by
    /// inheritance.
    fn emit_front(&mut self) -> Option<Sample> {
        let mut sample = self.window.pop_front()?;
        if !sample.duration_known() {
            let fallback_us = self.last_duration_us.unwrap_or(FALLBACK_DURATION_US);
            sample.resolve_unknown(fallback_us);
            tracing::trace!(
                pts_us = sample.pts_us(),
                duration_us = fallback_us,
                "duration approximated from predecessor"
            );
        }
        self.last_duration_us = Some(sample.duration_us());
        self.horizon_us = Some(match self.horizon_us {
            Some(h) => h.max(sample.pts_us()),
            None => sample.pts_us(),
        });
        Some(sample)
    }
}
