/// Game Scout - Rust Implementation
///
/// Scouting reports from game footage: a short frame sequence is sampled from
/// a window of the video, sent to a vision backend in small batches, and the
/// per-batch judgments are merged into one deduplicated report.

pub mod video;
pub mod sampling;
pub mod batching;
pub mod analysis;
pub mod aggregate;
pub mod pipeline;
pub mod config;
pub mod error;

#[cfg(feature = "api")]
pub mod api;

// Re-export main types for easy access
pub use crate::config::{Config, ConfigBuilder};
pub use crate::error::{BackendErrorKind, BackendFailure, PipelineError};
pub use crate::video::{FfmpegVideoSource, SyntheticVideoSource, VideoHandle, VideoSource};
pub use crate::sampling::{FrameSample, FrameSampler, SamplingWindow};
pub use crate::batching::{partition, AnalysisBatch};
pub use crate::analysis::{
    create_backend, AnalysisBackend, AnalysisContext, EvidenceItem, MockBackend, RemoteVisionBackend,
    StructuredResult, VisionProvider,
};
pub use crate::aggregate::{merge, AggregatedReport, Aggregator};
pub use crate::pipeline::{run_analysis, PipelineOrchestrator, PipelineRun, PipelineState};
