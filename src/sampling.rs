//! Evenly spaced still-frame sampling.
//!
//! Frames are taken at `duration / (n + 1) * i` for `i = 1..=n`, which keeps
//! every capture strictly inside the clip: the first and last instants of a
//! recording are often black or frozen.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::config::SamplingConfig;
use crate::error::SamplingError;
use crate::video::{extension_for_mime, VideoProbe};

pub const FRAME_MIME_TYPE: &str = "image/jpeg";

/// Still image dimensions for sampled frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FramePreset {
    #[serde(rename = "360p")]
    P360,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "540p")]
    P540,
    #[serde(rename = "720p")]
    P720,
}

impl FramePreset {
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            FramePreset::P360 => (640, 360),
            FramePreset::P480 => (854, 480),
            FramePreset::P540 => (960, 540),
            FramePreset::P720 => (1280, 720),
        }
    }
}

impl fmt::Display for FramePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (w, h) = self.dimensions();
        write!(f, "{}x{}", w, h)
    }
}

impl FromStr for FramePreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_end_matches('p') {
            "360" => Ok(FramePreset::P360),
            "480" => Ok(FramePreset::P480),
            "540" => Ok(FramePreset::P540),
            "720" => Ok(FramePreset::P720),
            other => Err(format!("unknown frame preset: {}", other)),
        }
    }
}

/// One still JPEG image taken from a video
#[derive(Debug, Clone, PartialEq)]
pub struct SampledFrame {
    pub timestamp_seconds: f64,
    pub image_bytes: Vec<u8>,
    pub mime_type: String,
}

/// Where the video comes from
#[derive(Debug, Clone)]
pub enum VideoSource {
    Path(PathBuf),
    Bytes { bytes: Vec<u8>, mime_type: String },
}

/// Image settings for one capture
#[derive(Debug, Clone, Copy)]
pub struct CaptureSettings {
    pub preset: FramePreset,
    pub jpeg_quality: f32,
}

impl CaptureSettings {
    /// ffmpeg `-q:v` scale: 2 is best, 31 is worst
    pub fn ffmpeg_qscale(&self) -> u32 {
        let quality = self.jpeg_quality.clamp(0.0, 1.0);
        (2.0 + (1.0 - quality) * 29.0).round() as u32
    }
}

/// Timestamps (seconds) of `frame_count` frames evenly spaced strictly inside `(0, duration)`
pub fn sample_timestamps(duration: f64, frame_count: usize) -> Vec<f64> {
    if frame_count == 0 || !(duration > 0.0) {
        return Vec::new();
    }
    let step = duration / (frame_count + 1) as f64;
    (1..=frame_count).map(|i| step * i as f64).collect()
}

/// A seekable picture source with single-threaded seek semantics
#[async_trait]
pub trait DecodeSurface: Send {
    /// Clip duration in seconds
    fn duration(&self) -> f64;

    /// Seek to `timestamp` and capture the rendered picture as JPEG.
    /// `Ok(None)` means the seek completed without producing a picture.
    async fn capture(
        &mut self,
        timestamp: f64,
        settings: &CaptureSettings,
    ) -> Result<Option<Vec<u8>>, SamplingError>;
}

/// In-memory input written to a temporary file for the decoder.
/// The file is removed when this value is dropped.
#[derive(Debug)]
pub struct StagedInput {
    file: NamedTempFile,
}

impl StagedInput {
    pub async fn write(bytes: &[u8], mime_type: &str) -> Result<Self, SamplingError> {
        let extension = extension_for_mime(mime_type).ok_or_else(|| {
            SamplingError::UnsupportedFormat(format!("unsupported video type: {}", mime_type))
        })?;
        let file = tempfile::Builder::new()
            .prefix("surfcoach-")
            .suffix(&format!(".{}", extension))
            .tempfile()?;
        tokio::fs::write(file.path(), bytes).await?;
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Decode surface backed by ffprobe/ffmpeg subprocesses
pub struct FfmpegSurface {
    input: PathBuf,
    duration: f64,
    ffmpeg_path: PathBuf,
    _staged: Option<StagedInput>,
}

impl FfmpegSurface {
    pub async fn open(
        source: &VideoSource,
        ffmpeg_path: &Path,
        ffprobe_path: &Path,
    ) -> Result<Self, SamplingError> {
        let (input, staged) = match source {
            VideoSource::Path(path) => (path.clone(), None),
            VideoSource::Bytes { bytes, mime_type } => {
                let staged = StagedInput::write(bytes, mime_type).await?;
                (staged.path().to_path_buf(), Some(staged))
            }
        };

        let duration = VideoProbe::new(ffprobe_path).duration(&input).await?;
        debug!("Opened decode surface for {} ({:.2}s)", input.display(), duration);

        Ok(Self {
            input,
            duration,
            ffmpeg_path: ffmpeg_path.to_path_buf(),
            _staged: staged,
        })
    }
}

#[async_trait]
impl DecodeSurface for FfmpegSurface {
    fn duration(&self) -> f64 {
        self.duration
    }

    async fn capture(
        &mut self,
        timestamp: f64,
        settings: &CaptureSettings,
    ) -> Result<Option<Vec<u8>>, SamplingError> {
        let (width, height) = settings.preset.dimensions();
        let output = tokio::process::Command::new(&self.ffmpeg_path)
            .args(["-hide_banner", "-loglevel", "error", "-ss", &format!("{:.3}", timestamp), "-i"])
            .arg(&self.input)
            .args([
                "-frames:v",
                "1",
                "-vf",
                &format!(
                    "scale={}:{}:force_original_aspect_ratio=decrease",
                    width, height
                ),
                "-q:v",
                &settings.ffmpeg_qscale().to_string(),
                "-f",
                "image2pipe",
                "-vcodec",
                "mjpeg",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            debug!(
                "ffmpeg produced no picture at {:.3}s: {}",
                timestamp,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Ok(None);
        }

        Ok((!output.stdout.is_empty()).then_some(output.stdout))
    }
}

/// Turns a video into `frame_count` representative still frames
#[derive(Debug, Clone)]
pub struct FrameSampler {
    frame_count: usize,
    settings: CaptureSettings,
    timeout: Duration,
    frame_timeout: Duration,
    seek_attempts: u32,
    ffmpeg_path: PathBuf,
    ffprobe_path: PathBuf,
}

impl FrameSampler {
    pub fn new(config: &SamplingConfig) -> Self {
        Self {
            frame_count: config.frame_count,
            settings: CaptureSettings {
                preset: config.preset,
                jpeg_quality: config.jpeg_quality.clamp(0.5, 0.7),
            },
            timeout: config.timeout(),
            frame_timeout: config.frame_timeout(),
            seek_attempts: config.seek_attempts.max(1),
            ffmpeg_path: config.ffmpeg_path.clone(),
            ffprobe_path: config.ffprobe_path.clone(),
        }
    }

    pub fn with_frame_count(mut self, frame_count: usize) -> Self {
        self.frame_count = frame_count;
        self
    }

    pub fn with_timeouts(mut self, total: Duration, per_frame: Duration) -> Self {
        self.timeout = total;
        self.frame_timeout = per_frame;
        self
    }

    pub fn with_seek_attempts(mut self, attempts: u32) -> Self {
        self.seek_attempts = attempts.max(1);
        self
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Sample frames from a file or in-memory video through ffmpeg.
    ///
    /// The surface and any staged temporary file live only inside this call,
    /// including when it fails, times out or is dropped mid-flight.
    pub async fn sample(&self, source: &VideoSource) -> Result<Vec<SampledFrame>, SamplingError> {
        self.check_frame_count()?;
        let started = Instant::now();

        let frames = self
            .within_budget(async {
                let mut surface =
                    FfmpegSurface::open(source, &self.ffmpeg_path, &self.ffprobe_path).await?;
                self.capture_all(&mut surface).await
            })
            .await?;

        info!(
            "🖼️ Sampled {} frames in {:.2}s",
            frames.len(),
            started.elapsed().as_secs_f64()
        );
        Ok(frames)
    }

    /// Sample frames from an already opened surface
    pub async fn sample_surface<S: DecodeSurface>(
        &self,
        surface: &mut S,
    ) -> Result<Vec<SampledFrame>, SamplingError> {
        self.check_frame_count()?;
        self.within_budget(self.capture_all(surface)).await
    }

    fn check_frame_count(&self) -> Result<(), SamplingError> {
        if self.frame_count == 0 {
            return Err(SamplingError::InvalidParameters(
                "frame_count must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    async fn within_budget<F>(&self, work: F) -> Result<Vec<SampledFrame>, SamplingError>
    where
        F: std::future::Future<Output = Result<Vec<SampledFrame>, SamplingError>>,
    {
        match tokio::time::timeout(self.timeout, work).await {
            Ok(result) => result,
            Err(_) => {
                warn!("⏰ Sampling exceeded {:.1}s budget", self.timeout.as_secs_f64());
                Err(SamplingError::Timeout(self.timeout.as_secs_f64()))
            }
        }
    }

    async fn capture_all<S: DecodeSurface + ?Sized>(
        &self,
        surface: &mut S,
    ) -> Result<Vec<SampledFrame>, SamplingError> {
        let duration = surface.duration();
        if !(duration > 0.0) {
            return Err(SamplingError::UnsupportedFormat(format!(
                "clip duration must be positive, got {}",
                duration
            )));
        }

        let timestamps = sample_timestamps(duration, self.frame_count);
        let mut frames = Vec::with_capacity(timestamps.len());

        // Sequential: the surface can only seek to one timestamp at a time
        for timestamp in timestamps {
            let image_bytes = self.capture_frame(surface, timestamp).await?;
            frames.push(SampledFrame {
                timestamp_seconds: timestamp,
                image_bytes,
                mime_type: FRAME_MIME_TYPE.to_string(),
            });
        }

        Ok(frames)
    }

    async fn capture_frame<S: DecodeSurface + ?Sized>(
        &self,
        surface: &mut S,
        timestamp: f64,
    ) -> Result<Vec<u8>, SamplingError> {
        for attempt in 1..=self.seek_attempts {
            match tokio::time::timeout(self.frame_timeout, surface.capture(timestamp, &self.settings))
                .await
            {
                Ok(Ok(Some(bytes))) if !bytes.is_empty() => {
                    debug!(
                        "Captured frame at {:.3}s ({} bytes, attempt {})",
                        timestamp,
                        bytes.len(),
                        attempt
                    );
                    return Ok(bytes);
                }
                Ok(Ok(_)) => {
                    debug!("No picture at {:.3}s (attempt {})", timestamp, attempt);
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    debug!(
                        "Seek to {:.3}s timed out after {:.1}s (attempt {})",
                        timestamp,
                        self.frame_timeout.as_secs_f64(),
                        attempt
                    );
                }
            }
        }

        Err(SamplingError::SeekFailure {
            timestamp,
            attempts: self.seek_attempts,
        })
    }
}
