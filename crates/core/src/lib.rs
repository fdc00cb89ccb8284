pub mod clock;
pub mod error;
pub mod infer;
pub mod pacing;
pub mod pipeline;
pub mod queue;
pub mod sample;
pub mod stats;

pub use error::{PlayoutError, Result};
pub use pacing::{Disposition, ReleaseAdjuster};
pub use pipeline::{PipelineConfig, TickResult, TrackPipeline};
pub use sample::{AccessUnit, Sample, TrackKind};
