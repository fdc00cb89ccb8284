//! Access units and annotated samples.
//!
//! An [`AccessUnit`] is one demuxed coded unit (for video, one frame's worth
//! of bitstream) carrying a presentation timestamp but no duration. Segmented
//! transport streams do not encode per-sample durations, so the duration is
//! reconstructed downstream by [`DurationEstimator`](crate::infer::DurationEstimator),
//! which wraps each unit into a [`Sample`]: the same payload plus an inferred
//! duration.
//!
//! Units flow one way: created by the stream source, consumed exactly once by
//! the estimator, then carried inside a `Sample` until the pacer hands the
//! sample to the output (or drops it).

/// Sentinel for a duration that has not been inferred yet.
///
/// Conceptually positive infinity: inference passes only ever lower it, so
/// `min` updates against real timestamp gaps always win.
pub(crate) const UNKNOWN_DURATION_US: i64 = i64::MAX;

/// Which elementary stream a pipeline carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
        }
    }
}

/// Opaque decrypt metadata attached to an access unit.
///
/// The timing pipeline never interprets this; it rides along so the decoder
/// downstream receives it together with the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptoInfo(pub Vec<u8>);

/// One demuxed coded unit with its presentation timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessUnit {
    /// Coded payload bytes (opaque to the timing pipeline).
    pub data: Vec<u8>,
    /// Presentation timestamp in microseconds. Non-negative; near-sorted in
    /// arrival order (decode order may locally differ from presentation
    /// order).
    pub pts_us: i64,
    /// Whether this unit starts at a sync sample (IDR or equivalent).
    pub key_frame: bool,
    /// Whether this unit terminates the stream. A terminator may carry a
    /// final payload or be an empty marker.
    pub end_of_stream: bool,
    /// Decrypt metadata, passed through untouched.
    pub crypto: Option<CryptoInfo>,
}

impl AccessUnit {
    /// Create a plain unit with the given timestamp and payload.
    pub fn new(pts_us: i64, data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            pts_us,
            key_frame: false,
            end_of_stream: false,
            crypto: None,
        }
    }

    /// Create an empty end-of-stream marker.
    ///
    /// The marker carries no payload and is never emitted as a sample; it
    /// only tells the estimator to drain.
    pub fn end_of_stream() -> Self {
        Self {
            data: Vec::new(),
            pts_us: 0,
            key_frame: false,
            end_of_stream: true,
            crypto: None,
        }
    }

    /// Mark this unit as starting at a sync sample.
    #[must_use]
    pub fn with_key_frame(mut self) -> Self {
        self.key_frame = true;
        self
    }

    /// Attach decrypt metadata.
    #[must_use]
    pub fn with_crypto(mut self, crypto: CryptoInfo) -> Self {
        self.crypto = Some(crypto);
        self
    }
}

/// An access unit annotated with its inferred duration.
///
/// The duration starts at an internal "unknown" sentinel and is tightened
/// monotonically downward while the sample sits in the inference window.
/// Samples leaving the estimator always carry a finite duration; the sentinel
/// never escapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    unit: AccessUnit,
    duration_us: i64,
}

impl Sample {
    /// Wrap a unit with its duration still unknown.
    pub(crate) fn pending(unit: AccessUnit) -> Self {
        Self {
            unit,
            duration_us: UNKNOWN_DURATION_US,
        }
    }

    /// Presentation timestamp in microseconds.
    pub fn pts_us(&self) -> i64 {
        self.unit.pts_us
    }

    /// Inferred duration in microseconds.
    pub fn duration_us(&self) -> i64 {
        self.duration_us
    }

    /// Coded payload bytes.
    pub fn data(&self) -> &[u8] {
        &self.unit.data
    }

    /// Whether the sample starts at a sync sample.
    pub fn is_key_frame(&self) -> bool {
        self.unit.key_frame
    }

    /// Whether this sample carried the end-of-stream flag.
    pub fn is_end_of_stream(&self) -> bool {
        self.unit.end_of_stream
    }

    /// Decrypt metadata, if any.
    pub fn crypto(&self) -> Option<&CryptoInfo> {
        self.unit.crypto.as_ref()
    }

    /// Unwrap the underlying access unit, discarding the duration.
    pub fn into_unit(self) -> AccessUnit {
        self.unit
    }

    /// Lower the duration to `bound_us` if the current estimate is larger.
    pub(crate) fn tighten_duration(&mut self, bound_us: i64) {
        if bound_us < self.duration_us {
            self.duration_us = bound_us;
        }
    }

    /// Whether inference produced a finite duration.
    pub(crate) fn duration_known(&self) -> bool {
        self.duration_us != UNKNOWN_DURATION_US
    }

    /// Assign a fallback duration. Only legal while the duration is still the
    /// sentinel; finalized durations never change.
    pub(crate) fn resolve_unknown(&mut self, fallback_us: i64) {
        debug_assert!(!self.duration_known(), "resolving an already-known duration");
        self.duration_us = fallback_us;
    }
}
