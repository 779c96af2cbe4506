use async_trait::async_trait;
use image::{DynamicImage, Rgb, RgbImage};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

use super::{FrameRead, VideoHandle, VideoSource};
use crate::error::{PipelineError, Result};

/// Deterministic in-memory video stream.
///
/// Frames are gradients tinted by frame number. The stream can advertise a
/// duration different from its real length (including "unknown") to exercise
/// the sampler's fallbacks, and it counts open handles so callers can check
/// that every handle was released.
#[derive(Debug)]
pub struct SyntheticVideoSource {
    length_seconds: f64,
    advertised_duration: f64,
    frame_rate: f64,
    width: u32,
    height: u32,
    unavailable: bool,
    open_handles: AtomicUsize,
    opened_total: AtomicUsize,
    frames_read: AtomicUsize,
}

impl SyntheticVideoSource {
    /// A stream of `length_seconds` that reports its duration correctly
    pub fn new(length_seconds: f64) -> Self {
        Self {
            length_seconds: length_seconds.max(0.0),
            advertised_duration: length_seconds.max(0.0),
            frame_rate: 30.0,
            width: 1280,
            height: 720,
            unavailable: false,
            open_handles: AtomicUsize::new(0),
            opened_total: AtomicUsize::new(0),
            frames_read: AtomicUsize::new(0),
        }
    }

    /// A stream whose container carries no duration metadata
    pub fn without_duration(length_seconds: f64) -> Self {
        Self::new(length_seconds).with_advertised_duration(0.0)
    }

    /// A source that refuses to open anything
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::new(0.0)
        }
    }

    pub fn with_advertised_duration(mut self, seconds: f64) -> Self {
        self.advertised_duration = seconds;
        self
    }

    pub fn with_frame_rate(mut self, frame_rate: f64) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width.max(1);
        self.height = height.max(1);
        self
    }

    /// Handles opened and not yet closed
    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }

    pub fn opened_total(&self) -> usize {
        self.opened_total.load(Ordering::SeqCst)
    }

    pub fn frames_read(&self) -> usize {
        self.frames_read.load(Ordering::SeqCst)
    }
}

fn render_frame(width: u32, height: u32, frame_number: u64) -> DynamicImage {
    let tint = (frame_number % 256) as u8;
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            tint,
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
        ])
    });
    DynamicImage::ImageRgb8(image)
}

#[async_trait]
impl VideoSource for SyntheticVideoSource {
    async fn open(&self, path: &Path) -> Result<VideoHandle> {
        if self.unavailable {
            return Err(PipelineError::SourceUnavailable(format!(
                "{}: synthetic source is unavailable",
                path.display()
            )));
        }

        self.open_handles.fetch_add(1, Ordering::SeqCst);
        self.opened_total.fetch_add(1, Ordering::SeqCst);

        Ok(
            VideoHandle::new(path, self.advertised_duration, self.frame_rate, true)
                .with_dimensions(self.width, self.height),
        )
    }

    async fn seek_and_read(&self, handle: &VideoHandle, timestamp_seconds: f64) -> Result<FrameRead> {
        if handle.is_released() {
            return Err(PipelineError::SourceUnavailable(format!(
                "{} was already closed",
                handle.path.display()
            )));
        }

        // Nearest frame at or after the requested timestamp
        let frame_number = (timestamp_seconds.max(0.0) * self.frame_rate - 1e-6).ceil().max(0.0);
        let frame_time = frame_number / self.frame_rate;
        if frame_time >= self.length_seconds {
            return Ok(FrameRead::EndOfStream);
        }

        self.frames_read.fetch_add(1, Ordering::SeqCst);
        let (width, height) = (self.width, self.height);
        let frame = tokio::task::spawn_blocking(move || render_frame(width, height, frame_number as u64))
            .await
            .map_err(|e| PipelineError::SourceUnavailable(format!("frame renderer stopped: {}", e)))?;
        Ok(FrameRead::Frame(frame))
    }

    async fn close(&self, handle: &mut VideoHandle) {
        if handle.mark_released() {
            self.open_handles.fetch_sub(1, Ordering::SeqCst);
            debug!("Closed synthetic video: {}", handle.path.display());
        }
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    #[tokio::test]
    async fn test_reads_until_end_of_stream() {
        let source = SyntheticVideoSource::new(2.0).with_resolution(64, 36);
        let mut handle = source.open(Path::new("synthetic.mp4")).await.unwrap();

        match source.seek_and_read(&handle, 1.5).await.unwrap() {
            FrameRead::Frame(frame) => assert_eq!(frame.dimensions(), (64, 36)),
            FrameRead::EndOfStream => panic!("expected a frame"),
        }
        assert!(matches!(
            source.seek_and_read(&handle, 2.0).await.unwrap(),
            FrameRead::EndOfStream
        ));

        source.close(&mut handle).await;
        assert_eq!(source.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let source = SyntheticVideoSource::new(5.0);
        let mut handle = source.open(Path::new("a.mp4")).await.unwrap();
        source.close(&mut handle).await;
        source.close(&mut handle).await;
        assert_eq!(source.open_handles(), 0);
        assert_eq!(source.opened_total(), 1);
    }

    #[tokio::test]
    async fn test_read_after_close_fails() {
        let source = SyntheticVideoSource::new(5.0);
        let mut handle = source.open(Path::new("a.mp4")).await.unwrap();
        source.close(&mut handle).await;
        assert!(source.seek_and_read(&handle, 0.0).await.is_err());
    }

    #[tokio::test]
    async fn test_without_duration_reports_unknown() {
        let source = SyntheticVideoSource::without_duration(30.0);
        let handle = source.open(Path::new("live.ts")).await.unwrap();
        assert!(!handle.has_known_duration());
    }
}
