use async_trait::async_trait;
use image::ImageFormat;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{FrameRead, VideoHandle, VideoSource};
use crate::config::VideoConfig;
use crate::error::{PipelineError, Result};

/// Video source backed by the `ffprobe` and `ffmpeg` command line tools
#[derive(Debug, Clone)]
pub struct FfmpegVideoSource {
    ffmpeg_path: PathBuf,
    ffprobe_path: PathBuf,
}

impl FfmpegVideoSource {
    pub fn new() -> Self {
        Self::from_config(&VideoConfig::default())
    }

    pub fn from_config(config: &VideoConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            ffprobe_path: config.ffprobe_path.clone(),
        }
    }
}

impl Default for FfmpegVideoSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VideoSource for FfmpegVideoSource {
    async fn open(&self, path: &Path) -> Result<VideoHandle> {
        let metadata = tokio::fs::metadata(path).await.map_err(|e| {
            PipelineError::SourceUnavailable(format!("{}: {}", path.display(), e))
        })?;

        if !metadata.is_file() {
            return Err(PipelineError::SourceUnavailable(format!(
                "{} is not a regular file",
                path.display()
            )));
        }
        if metadata.len() == 0 {
            return Err(PipelineError::SourceUnavailable(format!(
                "{} is empty",
                path.display()
            )));
        }

        let output = tokio::process::Command::new(&self.ffprobe_path)
            .arg("-v")
            .arg("quiet")
            .arg("-print_format")
            .arg("json")
            .arg("-show_format")
            .arg("-show_streams")
            .arg(path)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                PipelineError::SourceUnavailable(format!(
                    "failed to run {}: {}",
                    self.ffprobe_path.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(PipelineError::SourceUnavailable(format!(
                "ffprobe could not decode {}",
                path.display()
            )));
        }

        let json_str = String::from_utf8_lossy(&output.stdout);
        let handle = parse_probe_output(path, &json_str)?;

        info!(
            "📹 Opened video: {} ({}x{}, {:.1}fps, {:.1}s)",
            path.display(),
            handle.width,
            handle.height,
            handle.frame_rate,
            handle.duration_seconds
        );

        Ok(handle)
    }

    async fn seek_and_read(&self, handle: &VideoHandle, timestamp_seconds: f64) -> Result<FrameRead> {
        if handle.is_released() {
            return Err(PipelineError::SourceUnavailable(format!(
                "{} was already closed",
                handle.path.display()
            )));
        }

        // -ss before -i for fast seeking
        let output = tokio::process::Command::new(&self.ffmpeg_path)
            .arg("-v")
            .arg("error")
            .arg("-ss")
            .arg(format!("{:.3}", timestamp_seconds.max(0.0)))
            .arg("-i")
            .arg(&handle.path)
            .args(["-frames:v", "1", "-f", "image2pipe", "-c:v", "png", "-"])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                PipelineError::SourceUnavailable(format!(
                    "failed to run {}: {}",
                    self.ffmpeg_path.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::SourceUnavailable(format!(
                "frame extraction failed at {:.3}s: {}",
                timestamp_seconds,
                stderr.trim()
            )));
        }

        if output.stdout.is_empty() {
            debug!("End of stream at {:.3}s in {}", timestamp_seconds, handle.path.display());
            return Ok(FrameRead::EndOfStream);
        }

        let png = output.stdout;
        let image = tokio::task::spawn_blocking(move || image::load_from_memory_with_format(&png, ImageFormat::Png))
            .await
            .map_err(|e| PipelineError::SourceUnavailable(format!("frame decoder stopped: {}", e)))?
            .map_err(|e| {
                PipelineError::SourceUnavailable(format!(
                    "undecodable frame at {:.3}s: {}",
                    timestamp_seconds, e
                ))
            })?;

        Ok(FrameRead::Frame(image))
    }

    async fn close(&self, handle: &mut VideoHandle) {
        // Every read is its own ffmpeg process, so there is nothing left running.
        if handle.mark_released() {
            debug!("Closed video: {}", handle.path.display());
        }
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

/// Build a handle from `ffprobe -print_format json -show_format -show_streams` output
pub fn parse_probe_output(path: &Path, json_str: &str) -> Result<VideoHandle> {
    let probe: serde_json::Value = serde_json::from_str(json_str).map_err(|e| {
        PipelineError::SourceUnavailable(format!("unreadable probe output for {}: {}", path.display(), e))
    })?;

    let video_stream = probe["streams"]
        .as_array()
        .and_then(|streams| streams.iter().find(|s| s["codec_type"] == "video"))
        .ok_or_else(|| {
            PipelineError::SourceUnavailable(format!("no video stream found in {}", path.display()))
        })?;

    let duration_seconds = parse_seconds(&probe["format"]["duration"])
        .or_else(|| parse_seconds(&video_stream["duration"]))
        .unwrap_or(0.0);

    let frame_rate = video_stream["avg_frame_rate"]
        .as_str()
        .and_then(parse_frame_rate)
        .or_else(|| video_stream["r_frame_rate"].as_str().and_then(parse_frame_rate))
        .unwrap_or(0.0);

    let width = video_stream["width"].as_u64().unwrap_or(0) as u32;
    let height = video_stream["height"].as_u64().unwrap_or(0) as u32;

    Ok(VideoHandle::new(path, duration_seconds, frame_rate, true).with_dimensions(width, height))
}

fn parse_seconds(value: &serde_json::Value) -> Option<f64> {
    value
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .or_else(|| value.as_f64())
        .filter(|d| d.is_finite() && *d > 0.0)
}

/// Parse "30000/1001" or "25" style rates; zero denominators yield `None`
fn parse_frame_rate(rate: &str) -> Option<f64> {
    let fps = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse().ok()?,
    };

    (fps.is_finite() && fps > 0.0).then_some(fps)
}
