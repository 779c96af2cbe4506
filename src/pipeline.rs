//! Request orchestration: sample, partition, analyze each batch, aggregate

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::aggregate::{AggregatedReport, Aggregator};
use crate::analysis::{create_backend, AnalysisBackend, AnalysisContext};
use crate::batching::partition;
use crate::config::{AggregationConfig, Config};
use crate::error::{PipelineError, Result};
use crate::sampling::{FrameSampler, SamplingWindow};
use crate::video::{FfmpegVideoSource, VideoHandle, VideoSource};

/// Where a request is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    Idle,
    Sampling,
    Partitioning,
    AnalyzingBatch(usize),
    Aggregating,
    Done,
    Failed(String),
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed(_))
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Idle => write!(f, "idle"),
            PipelineState::Sampling => write!(f, "sampling"),
            PipelineState::Partitioning => write!(f, "partitioning"),
            PipelineState::AnalyzingBatch(index) => write!(f, "analyzing batch {}", index),
            PipelineState::Aggregating => write!(f, "aggregating"),
            PipelineState::Done => write!(f, "done"),
            PipelineState::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Result of one request plus what happened along the way
#[derive(Debug)]
pub struct PipelineRun {
    pub outcome: Result<AggregatedReport>,
    pub started_at: DateTime<Utc>,
    pub frames_sampled: usize,
    pub batch_count: usize,
    pub elapsed: Duration,
    /// Every state entered, starting with `Idle`
    pub transitions: Vec<PipelineState>,
}

impl PipelineRun {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn final_state(&self) -> &PipelineState {
        self.transitions.last().unwrap_or(&PipelineState::Idle)
    }

    pub fn into_report(self) -> Result<AggregatedReport> {
        self.outcome
    }
}

#[derive(Debug)]
struct StateTracker {
    history: Vec<PipelineState>,
}

impl StateTracker {
    fn new() -> Self {
        Self {
            history: vec![PipelineState::Idle],
        }
    }

    fn current(&self) -> &PipelineState {
        self.history.last().unwrap_or(&PipelineState::Idle)
    }

    fn transition(&mut self, next: PipelineState) {
        if self.current().is_terminal() {
            return;
        }
        debug!("Pipeline: {} -> {}", self.current(), next);
        self.history.push(next);
    }
}

/// An open handle that is closed even if the request future is dropped
struct OpenVideo {
    source: Arc<dyn VideoSource>,
    handle: VideoHandle,
}

impl OpenVideo {
    async fn close(mut self) {
        self.source.close(&mut self.handle).await;
    }
}

impl Drop for OpenVideo {
    fn drop(&mut self) {
        if self.handle.is_released() {
            return;
        }

        let placeholder = VideoHandle::new(self.handle.path.clone(), 0.0, 0.0, false);
        let mut handle = std::mem::replace(&mut self.handle, placeholder);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!("Closing {} after an abandoned request", handle.path.display());
                let source = Arc::clone(&self.source);
                runtime.spawn(async move {
                    source.close(&mut handle).await;
                });
            }
            Err(_) => warn!("{} dropped outside a runtime, not closed", handle.path.display()),
        }
    }
}

#[derive(Debug, Default)]
struct RunStats {
    frames_sampled: usize,
    batch_count: usize,
}

/// Drives one analysis request from video path to report.
///
/// Holds its collaborators and configuration from construction on; nothing is
/// read from the process environment while a request runs.
pub struct PipelineOrchestrator {
    source: Arc<dyn VideoSource>,
    backend: Arc<dyn AnalysisBackend>,
    sampler: FrameSampler,
    batch_size: usize,
    max_in_flight: usize,
    limits: AggregationConfig,
}

impl PipelineOrchestrator {
    pub fn new(config: &Config, source: Arc<dyn VideoSource>, backend: Arc<dyn AnalysisBackend>) -> Result<Self> {
        if config.batching.batch_size == 0 {
            return Err(PipelineError::InvalidBatchSize(0));
        }

        Ok(Self {
            source,
            backend,
            sampler: FrameSampler::from_config(&config.sampling),
            batch_size: config.batching.batch_size,
            max_in_flight: config.batching.max_in_flight.max(1),
            limits: config.aggregation.clone(),
        })
    }

    /// FFmpeg-backed source and the backend selected by `config.backend`
    pub async fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let source: Arc<dyn VideoSource> = Arc::new(FfmpegVideoSource::from_config(&config.video));
        let backend = create_backend(&config.backend).await?;
        Self::new(config, source, backend)
    }

    pub fn backend(&self) -> &dyn AnalysisBackend {
        self.backend.as_ref()
    }

    pub fn source(&self) -> &dyn VideoSource {
        self.source.as_ref()
    }

    /// Analyze `video_path` and report the run, successful or not
    pub async fn execute(&self, video_path: &Path, context: AnalysisContext, window: SamplingWindow) -> PipelineRun {
        let started_at = Utc::now();
        let started = Instant::now();
        let mut tracker = StateTracker::new();
        let mut stats = RunStats::default();

        info!(
            "🚀 Analyzing {} for {} #{} ({} backend)",
            video_path.display(),
            context.team_name,
            context.player_number,
            self.backend.name()
        );

        let outcome = self
            .drive(video_path, context, window, &mut tracker, &mut stats)
            .await;

        match &outcome {
            Ok(report) => info!(
                "✅ Report ready: {} frames, {} batches, {} evidence items in {:.2}s",
                stats.frames_sampled,
                stats.batch_count,
                report.evidence.len(),
                started.elapsed().as_secs_f64()
            ),
            Err(e) => {
                error!("❌ Analysis of {} failed: {}", video_path.display(), e);
                tracker.transition(PipelineState::Failed(e.to_string()));
            }
        }

        PipelineRun {
            outcome,
            started_at,
            frames_sampled: stats.frames_sampled,
            batch_count: stats.batch_count,
            elapsed: started.elapsed(),
            transitions: tracker.history,
        }
    }

    /// Analyze `video_path`, returning only the report
    pub async fn run_analysis(
        &self,
        video_path: &Path,
        context: AnalysisContext,
        window: SamplingWindow,
    ) -> Result<AggregatedReport> {
        self.execute(video_path, context, window).await.into_report()
    }

    async fn drive(
        &self,
        video_path: &Path,
        context: AnalysisContext,
        window: SamplingWindow,
        tracker: &mut StateTracker,
        stats: &mut RunStats,
    ) -> Result<AggregatedReport> {
        window.validate()?;

        tracker.transition(PipelineState::Sampling);
        let video = OpenVideo {
            handle: self.source.open(video_path).await?,
            source: Arc::clone(&self.source),
        };
        info!(
            "📹 Opened {} via {} ({:.1}s, {:.2} fps)",
            video_path.display(),
            self.source.name(),
            video.handle.duration_seconds,
            video.handle.frame_rate
        );

        // Frames are fully decoded and encoded here, so the handle is not
        // needed by any later stage.
        let sampled = self.sampler.sample(self.source.as_ref(), &video.handle, &window).await;
        video.close().await;
        let samples = sampled?;
        stats.frames_sampled = samples.len();

        tracker.transition(PipelineState::Partitioning);
        let batches = partition(samples, self.batch_size, Arc::new(context), window)?;
        stats.batch_count = batches.len();
        debug!("Partitioned {} frames into {} batches", stats.frames_sampled, stats.batch_count);

        let mut aggregator = Aggregator::new(&self.limits);

        if self.max_in_flight <= 1 {
            for batch in batches {
                tracker.transition(PipelineState::AnalyzingBatch(batch.index));
                let index = batch.index;
                let result = self.backend.analyze(batch).await?;
                debug!("Batch {} analyzed", index);
                aggregator.push(result);
            }
        } else {
            let backend = &self.backend;
            // `buffered` yields in submission order, so merging stays in batch order
            let mut results = stream::iter(batches.into_iter().map(|batch| async move {
                let index = batch.index;
                (index, backend.analyze(batch).await)
            }))
            .buffered(self.max_in_flight);

            while let Some((index, result)) = results.next().await {
                tracker.transition(PipelineState::AnalyzingBatch(index));
                aggregator.push(result?);
            }
        }

        tracker.transition(PipelineState::Aggregating);
        let report = aggregator.finalize();
        tracker.transition(PipelineState::Done);

        Ok(report)
    }
}

/// One-shot analysis with the FFmpeg source and the configured backend
pub async fn run_analysis(
    video_path: &Path,
    context: AnalysisContext,
    window: SamplingWindow,
    config: &Config,
) -> Result<AggregatedReport> {
    window.validate()?;
    let orchestrator = PipelineOrchestrator::from_config(config).await?;
    orchestrator.run_analysis(video_path, context, window).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::MockBackend;
    use crate::config::ConfigBuilder;
    use crate::video::SyntheticVideoSource;

    fn orchestrator(source: Arc<SyntheticVideoSource>, config: &Config) -> PipelineOrchestrator {
        PipelineOrchestrator::new(config, source, Arc::new(MockBackend::new())).unwrap()
    }

    fn context() -> AnalysisContext {
        AnalysisContext::new("Harbor City", Some("#1d4ed8"), 9)
    }

    #[tokio::test]
    async fn test_successful_run_walks_every_state() {
        let source = Arc::new(SyntheticVideoSource::new(60.0).with_resolution(160, 90));
        let config = Config::default();
        let run = orchestrator(source.clone(), &config)
            .execute(Path::new("match.mp4"), context(), SamplingWindow::default())
            .await;

        assert!(run.is_success());
        assert_eq!(run.frames_sampled, 6);
        assert_eq!(run.batch_count, 2);
        assert_eq!(
            run.transitions,
            vec![
                PipelineState::Idle,
                PipelineState::Sampling,
                PipelineState::Partitioning,
                PipelineState::AnalyzingBatch(0),
                PipelineState::AnalyzingBatch(1),
                PipelineState::Aggregating,
                PipelineState::Done,
            ]
        );
        assert_eq!(source.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_failed_open_ends_in_failed_state() {
        let source = Arc::new(SyntheticVideoSource::unavailable());
        let run = orchestrator(source, &Config::default())
            .execute(Path::new("missing.mp4"), context(), SamplingWindow::default())
            .await;

        assert!(matches!(run.outcome, Err(PipelineError::SourceUnavailable(_))));
        assert!(matches!(run.final_state(), PipelineState::Failed(_)));
        assert_eq!(run.batch_count, 0);
    }

    #[tokio::test]
    async fn test_invalid_window_rejected_before_open() {
        let source = Arc::new(SyntheticVideoSource::new(60.0));
        let window = SamplingWindow {
            start_fraction: 0.8,
            end_fraction: 0.2,
            ..SamplingWindow::default()
        };
        let run = orchestrator(source.clone(), &Config::default())
            .execute(Path::new("match.mp4"), context(), window)
            .await;

        assert!(matches!(run.outcome, Err(PipelineError::InvalidConfig(_))));
        assert_eq!(source.opened_total(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_request_releases_handle() {
        let source = Arc::new(SyntheticVideoSource::new(600.0).with_resolution(1920, 1080));
        let orchestrator = orchestrator(source.clone(), &Config::default());

        let run = orchestrator.execute(Path::new("match.mp4"), context(), SamplingWindow::full_video(50));
        let outcome = tokio::time::timeout(Duration::from_millis(20), run).await;
        assert!(outcome.is_err());
        assert_eq!(source.opened_total(), 1);

        // The close is spawned when the request future is dropped
        for _ in 0..100 {
            if source.open_handles() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(source.open_handles(), 0);
    }

    #[test]
    fn test_zero_batch_size_rejected_at_construction() {
        let config = ConfigBuilder::new().with_batch_size(0).build();
        let result = PipelineOrchestrator::new(
            &config,
            Arc::new(SyntheticVideoSource::new(10.0)),
            Arc::new(MockBackend::new()),
        );
        assert!(matches!(result, Err(PipelineError::InvalidBatchSize(0))));
    }

    #[test]
    fn test_terminal_state_is_sticky() {
        let mut tracker = StateTracker::new();
        tracker.transition(PipelineState::Sampling);
        tracker.transition(PipelineState::Failed("boom".to_string()));
        tracker.transition(PipelineState::Done);
        assert_eq!(tracker.current(), &PipelineState::Failed("boom".to_string()));
        assert_eq!(tracker.history.len(), 3);
    }
}
