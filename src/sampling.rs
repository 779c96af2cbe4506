//! Frame sampling
//!
//! Turns a video handle into a short, ordered sequence of encoded frames
//! drawn from a fractional time window of the video.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::SamplingConfig;
use crate::error::{PipelineError, Result};
use crate::video::{FrameRead, VideoHandle, VideoSource};

/// Fractional time range of a video plus the frame budget for one request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingWindow {
    pub start_fraction: f64,
    pub end_fraction: f64,
    pub max_frames: usize,
    /// Lower bound on the spacing between two samples
    pub min_step_seconds: f64,
}

impl Default for SamplingWindow {
    fn default() -> Self {
        Self {
            start_fraction: 0.0,
            end_fraction: 0.5,
            max_frames: 6,
            min_step_seconds: 0.5,
        }
    }
}

impl SamplingWindow {
    pub fn new(start_fraction: f64, end_fraction: f64, max_frames: usize, min_step_seconds: f64) -> Result<Self> {
        let window = Self {
            start_fraction,
            end_fraction,
            max_frames,
            min_step_seconds,
        };
        window.validate()?;
        Ok(window)
    }

    /// The whole video instead of its first half
    pub fn full_video(max_frames: usize) -> Self {
        Self {
            start_fraction: 0.0,
            end_fraction: 1.0,
            max_frames,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let fractions_ok = self.start_fraction.is_finite()
            && self.end_fraction.is_finite()
            && self.start_fraction >= 0.0
            && self.start_fraction < self.end_fraction
            && self.end_fraction <= 1.0;
        if !fractions_ok {
            return Err(PipelineError::InvalidConfig(format!(
                "sampling window must satisfy 0 <= start < end <= 1 (got {} .. {})",
                self.start_fraction, self.end_fraction
            )));
        }
        if self.max_frames == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_frames must be greater than 0".to_string(),
            ));
        }
        if !(self.min_step_seconds.is_finite() && self.min_step_seconds > 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "min_step_seconds must be positive (got {})",
                self.min_step_seconds
            )));
        }
        Ok(())
    }

    /// Window bounds in seconds for a video of `duration` seconds
    pub fn bounds(&self, duration: f64) -> (f64, f64) {
        (duration * self.start_fraction, duration * self.end_fraction)
    }
}

/// One extracted, resized and compressed frame
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSample {
    pub sequence_index: usize,
    pub timestamp_seconds: f64,
    pub width: u32,
    pub height: u32,
    /// JPEG bytes
    #[serde(skip)]
    pub encoded_image: Vec<u8>,
}

impl FrameSample {
    pub fn timestamp_label(&self) -> String {
        format_timestamp(self.timestamp_seconds)
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.encoded_image)
    }

    pub fn mime_type(&self) -> &'static str {
        "image/jpeg"
    }
}

impl std::fmt::Debug for FrameSample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSample")
            .field("sequence_index", &self.sequence_index)
            .field("timestamp_seconds", &self.timestamp_seconds)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("encoded_bytes", &self.encoded_image.len())
            .finish()
    }
}

/// Format seconds as `m:ss`
pub fn format_timestamp(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

/// Resize and compression settings for sampled frames
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameEncoding {
    /// Longest edge after resizing; frames are only ever downscaled
    pub max_edge_pixels: u32,
    pub jpeg_quality: u8,
}

impl Default for FrameEncoding {
    fn default() -> Self {
        Self {
            max_edge_pixels: 640,
            jpeg_quality: 85,
        }
    }
}

/// Downscale `image` to fit the encoding bounds and compress it to JPEG
pub fn encode_frame(image: &DynamicImage, encoding: FrameEncoding) -> Result<(Vec<u8>, u32, u32)> {
    let (width, height) = image.dimensions();
    let longest = width.max(height);

    let resized;
    let frame = if longest > encoding.max_edge_pixels {
        let scale = encoding.max_edge_pixels as f64 / longest as f64;
        let target_w = ((width as f64 * scale).round() as u32).max(1);
        let target_h = ((height as f64 * scale).round() as u32).max(1);
        resized = image.resize_exact(target_w, target_h, FilterType::Triangle);
        &resized
    } else {
        image
    };

    let rgb = frame.to_rgb8();
    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, encoding.jpeg_quality);
    rgb.write_with_encoder(encoder)
        .map_err(|e| PipelineError::SourceUnavailable(format!("frame encoding failed: {}", e)))?;

    Ok((buffer, rgb.width(), rgb.height()))
}

/// Timestamps the sampler will try, in order.
///
/// `step = max(window / max_frames, min_step_seconds)`; timestamps past the
/// window end are never produced.
pub fn sample_schedule(duration: f64, window: &SamplingWindow) -> Vec<f64> {
    let (start, end) = window.bounds(duration);
    let step = ((end - start) / window.max_frames as f64).max(window.min_step_seconds);

    (0..window.max_frames)
        .map(|i| start + i as f64 * step)
        .take_while(|t| *t <= end + 1e-9)
        .collect()
}

/// Computes the sampling schedule and extracts frames from a video source
#[derive(Debug, Clone)]
pub struct FrameSampler {
    encoding: FrameEncoding,
    /// Assumed duration for streams that do not report one
    default_duration_seconds: f64,
}

impl FrameSampler {
    pub fn new(encoding: FrameEncoding, default_duration_seconds: f64) -> Self {
        Self {
            encoding,
            default_duration_seconds,
        }
    }

    pub fn from_config(config: &SamplingConfig) -> Self {
        Self::new(
            FrameEncoding {
                max_edge_pixels: config.max_edge_pixels,
                jpeg_quality: config.jpeg_quality,
            },
            config.default_duration_seconds,
        )
    }

    pub fn encoding(&self) -> FrameEncoding {
        self.encoding
    }

    /// Duration used for scheduling, falling back when metadata is missing
    pub fn resolve_duration(&self, handle: &VideoHandle) -> f64 {
        if handle.has_known_duration() {
            handle.duration_seconds
        } else {
            warn!(
                "Unknown duration for {}, assuming {:.1}s",
                handle.path.display(),
                self.default_duration_seconds
            );
            self.default_duration_seconds
        }
    }

    /// Extract frames for `window`. Every call seeks from scratch.
    pub async fn sample(
        &self,
        source: &dyn VideoSource,
        handle: &VideoHandle,
        window: &SamplingWindow,
    ) -> Result<Vec<FrameSample>> {
        window.validate()?;

        let duration = self.resolve_duration(handle);
        let schedule = sample_schedule(duration, window);
        let mut samples: Vec<FrameSample> = Vec::with_capacity(schedule.len());

        for timestamp in schedule {
            let image = match source.seek_and_read(handle, timestamp).await? {
                FrameRead::Frame(image) => image,
                FrameRead::EndOfStream => {
                    debug!("Stream ended before {:.2}s", timestamp);
                    break;
                }
            };

            // Resize and JPEG encode are CPU-bound; keep them off the async workers
            let encoding = self.encoding;
            let encoded = tokio::task::spawn_blocking(move || encode_frame(&image, encoding))
                .await
                .unwrap_or_else(|e| Err(PipelineError::SourceUnavailable(format!("frame encoder stopped: {}", e))));

            match encoded {
                Ok((encoded_image, width, height)) => {
                    debug!(
                        "Sampled frame {} at {:.2}s ({}x{}, {} bytes)",
                        samples.len(),
                        timestamp,
                        width,
                        height,
                        encoded_image.len()
                    );
                    samples.push(FrameSample {
                        sequence_index: samples.len(),
                        timestamp_seconds: timestamp,
                        width,
                        height,
                        encoded_image,
                    });
                }
                Err(e) => warn!("Skipping frame at {:.2}s: {}", timestamp, e),
            }
        }

        if samples.is_empty() {
            return Err(PipelineError::NoFramesExtracted(format!(
                "no decodable frames in {} (window {:.0}%..{:.0}%)",
                handle.path.display(),
                window.start_fraction * 100.0,
                window.end_fraction * 100.0
            )));
        }

        info!(
            "🎞️ Sampled {} frames from {} ({:.1}s window)",
            samples.len(),
            handle.path.display(),
            duration * (window.end_fraction - window.start_fraction)
        );

        Ok(samples)
    }
}

impl Default for FrameSampler {
    fn default() -> Self {
        Self::from_config(&SamplingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::SyntheticVideoSource;
    use std::path::Path;

    fn window(start: f64, end: f64, max_frames: usize) -> SamplingWindow {
        SamplingWindow::new(start, end, max_frames, 0.5).unwrap()
    }

    #[test]
    fn test_schedule_first_half_of_a_minute() {
        let schedule = sample_schedule(60.0, &window(0.0, 0.5, 6));
        assert_eq!(schedule, vec![0.0, 5.0, 10.0, 15.0, 20.0, 25.0]);
    }

    #[test]
    fn test_schedule_clamps_step_on_short_clips() {
        let schedule = sample_schedule(2.0, &window(0.0, 1.0, 20));
        assert_eq!(schedule, vec![0.0, 0.5, 1.0, 1.5, 2.0]);
    }

    #[test]
    fn test_schedule_stays_inside_window() {
        for &(duration, start, end, max_frames) in &[
            (90.0, 0.25, 0.75, 7),
            (3.3, 0.1, 0.9, 12),
            (7200.0, 0.0, 1.0, 50),
            (1.0, 0.5, 1.0, 3),
        ] {
            let w = window(start, end, max_frames);
            let schedule = sample_schedule(duration, &w);
            let (lo, hi) = w.bounds(duration);
            assert!(!schedule.is_empty());
            assert!(schedule.len() <= max_frames);
            assert!(schedule.iter().all(|t| *t >= lo && *t <= hi + 1e-9));
            assert!(schedule.windows(2).all(|pair| pair[0] < pair[1]));
        }
    }

    #[test]
    fn test_window_validation() {
        assert!(SamplingWindow::new(0.5, 0.5, 6, 0.5).is_err());
        assert!(SamplingWindow::new(-0.1, 0.5, 6, 0.5).is_err());
        assert!(SamplingWindow::new(0.0, 1.1, 6, 0.5).is_err());
        assert!(SamplingWindow::new(0.0, 0.5, 0, 0.5).is_err());
        assert!(SamplingWindow::new(0.0, 0.5, 6, 0.0).is_err());
        assert!(SamplingWindow::full_video(10).validate().is_ok());
    }

    #[test]
    fn test_encode_frame_downscales_only() {
        let large = DynamicImage::new_rgb8(1920, 1080);
        let (bytes, w, h) = encode_frame(&large, FrameEncoding::default()).unwrap();
        assert_eq!((w, h), (640, 360));
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);

        let small = DynamicImage::new_rgb8(320, 240);
        let (_, w, h) = encode_frame(&small, FrameEncoding::default()).unwrap();
        assert_eq!((w, h), (320, 240));
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "0:00");
        assert_eq!(format_timestamp(65.4), "1:05");
        assert_eq!(format_timestamp(600.0), "10:00");
    }

    #[tokio::test]
    async fn test_sample_synthetic_stream() {
        let source = SyntheticVideoSource::new(60.0).with_resolution(1280, 720);
        let handle = source.open(Path::new("match.mp4")).await.unwrap();
        let sampler = FrameSampler::default();

        let samples = sampler.sample(&source, &handle, &window(0.0, 0.5, 6)).await.unwrap();
        let timestamps: Vec<f64> = samples.iter().map(|s| s.timestamp_seconds).collect();
        assert_eq!(timestamps, vec![0.0, 5.0, 10.0, 15.0, 20.0, 25.0]);
        assert!(samples.iter().enumerate().all(|(i, s)| s.sequence_index == i));
        assert!(samples.iter().all(|s| s.width.max(s.height) <= 640));
    }

    #[tokio::test]
    async fn test_window_past_real_end_yields_fewer_frames() {
        // Container claims 60s but the stream stops after 12s
        let source = SyntheticVideoSource::new(12.0).with_advertised_duration(60.0);
        let handle = source.open(Path::new("truncated.mp4")).await.unwrap();
        let samples = FrameSampler::default()
            .sample(&source, &handle, &window(0.0, 0.5, 6))
            .await
            .unwrap();
        assert_eq!(samples.len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_duration_uses_default_window_length() {
        let source = SyntheticVideoSource::without_duration(30.0);
        let handle = source.open(Path::new("live.ts")).await.unwrap();
        let sampler = FrameSampler::new(FrameEncoding::default(), 10.0);

        let samples = sampler.sample(&source, &handle, &window(0.0, 1.0, 5)).await.unwrap();
        let timestamps: Vec<f64> = samples.iter().map(|s| s.timestamp_seconds).collect();
        assert_eq!(timestamps, vec![0.0, 2.0, 4.0, 6.0, 8.0]);
    }

    #[tokio::test]
    async fn test_empty_stream_fails_with_no_frames() {
        let source = SyntheticVideoSource::new(0.0);
        let handle = source.open(Path::new("empty.mp4")).await.unwrap();
        let err = FrameSampler::default()
            .sample(&source, &handle, &SamplingWindow::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoFramesExtracted(_)));
    }
}
