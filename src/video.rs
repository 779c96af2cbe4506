//! Video source adapters
//!
//! A [`VideoSource`] opens a decodable video, reports its duration and frame
//! rate, and decodes single frames by timestamp. The pipeline only ever talks
//! to the trait, so the FFmpeg-backed adapter and the in-memory synthetic
//! stream are interchangeable.

pub mod ffmpeg;
pub mod synthetic;

use async_trait::async_trait;
use image::DynamicImage;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::error::Result;

pub use ffmpeg::FfmpegVideoSource;
pub use synthetic::SyntheticVideoSource;

/// Frame rate assumed when the container does not report a usable one
pub const DEFAULT_FRAME_RATE: f64 = 30.0;

/// Opaque reference to an opened video, owned by one analysis request
#[derive(Debug, Serialize)]
pub struct VideoHandle {
    pub path: PathBuf,
    /// Reported duration; 0 means unknown
    pub duration_seconds: f64,
    pub frame_rate: f64,
    pub is_seekable: bool,
    pub width: u32,
    pub height: u32,
    #[serde(skip)]
    released: bool,
}

impl VideoHandle {
    pub fn new(path: impl Into<PathBuf>, duration_seconds: f64, frame_rate: f64, is_seekable: bool) -> Self {
        let duration_seconds = if duration_seconds.is_finite() && duration_seconds > 0.0 {
            duration_seconds
        } else {
            0.0
        };
        let frame_rate = if frame_rate.is_finite() && frame_rate > 0.0 {
            frame_rate
        } else {
            DEFAULT_FRAME_RATE
        };

        Self {
            path: path.into(),
            duration_seconds,
            frame_rate,
            is_seekable,
            width: 0,
            height: 0,
            released: false,
        }
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn has_known_duration(&self) -> bool {
        self.duration_seconds > 0.0
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Marks the handle released. Returns `false` if it already was.
    pub fn mark_released(&mut self) -> bool {
        !std::mem::replace(&mut self.released, true)
    }
}

/// Outcome of a single seek-and-decode
#[derive(Debug)]
pub enum FrameRead {
    Frame(DynamicImage),
    EndOfStream,
}

/// Random-access frame reader over a video resource
#[async_trait]
pub trait VideoSource: Send + Sync {
    /// Open a video; fails with `SourceUnavailable` if it cannot be decoded
    async fn open(&self, path: &Path) -> Result<VideoHandle>;

    /// Decode the first frame at or after `timestamp_seconds`.
    ///
    /// Callers must not assume any sequential read position survives a seek.
    async fn seek_and_read(&self, handle: &VideoHandle, timestamp_seconds: f64) -> Result<FrameRead>;

    /// Release everything held for `handle`. Idempotent.
    async fn close(&self, handle: &mut VideoHandle);

    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_normalizes_metadata() {
        let handle = VideoHandle::new("game.mp4", f64::NAN, 0.0, true);
        assert_eq!(handle.duration_seconds, 0.0);
        assert!(!handle.has_known_duration());
        assert_eq!(handle.frame_rate, DEFAULT_FRAME_RATE);
    }

    #[test]
    fn test_mark_released_is_idempotent() {
        let mut handle = VideoHandle::new("game.mp4", 60.0, 25.0, true);
        assert!(handle.mark_released());
        assert!(!handle.mark_released());
        assert!(handle.is_released());
    }
}
