//! Error types for the playout timing library.

/// Errors that can occur in the playout timing library.
///
/// Variants map to specific failure modes across the pipeline:
///
/// - **Ingest**: [`NegativeTimestamp`](Self::NegativeTimestamp),
///   [`OutOfOrderBeyondWindow`](Self::OutOfOrderBeyondWindow) show the source
///   handed over timestamps the inference window can never repair.
/// - **Lifecycle**: [`StreamEnded`](Self::StreamEnded),
///   [`ShutDown`](Self::ShutDown).
/// - **Setup**: [`InvalidConfig`](Self::InvalidConfig).
#[derive(Debug, thiserror::Error)]
pub enum PlayoutError {
    /// Presentation timestamps must be non-negative microseconds.
    #[error("negative presentation timestamp: {pts_us}us")]
    NegativeTimestamp {
        /// The offending timestamp.
        pts_us: i64,
    },

    /// A unit arrived with a timestamp behind samples that already left the
    /// inference window. Reordering that deep cannot be corrected.
    #[error("timestamp {pts_us}us regresses behind finalized horizon {horizon_us}us")]
    OutOfOrderBeyondWindow {
        /// The offending timestamp.
        pts_us: i64,
        /// Highest timestamp among already-finalized samples.
        horizon_us: i64,
    },

    /// A unit was ingested after the end-of-stream terminator.
    #[error("access unit ingested after end of stream")]
    StreamEnded,

    /// The pipeline was shut down; it accepts no further input.
    #[error("pipeline has been shut down")]
    ShutDown,

    /// Rejected configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience alias for `Result<T, PlayoutError>`.
pub type Result<T> = std::result::Result<T, PlayoutError>;
