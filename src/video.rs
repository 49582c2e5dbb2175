use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::SamplingError;

/// Video information extracted from file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    pub path: PathBuf,
    pub filename: String,
    pub duration: Duration,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub format: String,
    pub file_size: u64,
    pub mime_type: String,
}

/// Map a file extension to the MIME type the model API expects
pub fn mime_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    let mime = match ext.as_str() {
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "m4v" => "video/x-m4v",
        "3gp" => "video/3gpp",
        _ => return None,
    };
    Some(mime)
}

/// File extension the decoder should see for a staged in-memory video
pub fn extension_for_mime(mime_type: &str) -> Option<&'static str> {
    let ext = match mime_type.to_lowercase().as_str() {
        "video/mp4" => "mp4",
        "video/quicktime" => "mov",
        "video/webm" => "webm",
        "video/x-matroska" => "mkv",
        "video/x-msvideo" => "avi",
        "video/x-m4v" => "m4v",
        "video/3gpp" => "3gp",
        _ => return None,
    };
    Some(ext)
}

/// Parse an ffprobe rational such as "30000/1001"
fn parse_frame_rate(value: &str) -> Option<f64> {
    match value.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            (den != 0.0).then(|| num / den)
        }
        None => value.parse().ok(),
    }
}

/// Video inspection through the ffprobe command line tool
#[derive(Debug, Clone)]
pub struct VideoProbe {
    ffprobe_path: PathBuf,
}

impl VideoProbe {
    pub fn new(ffprobe_path: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
        }
    }

    /// Extract video information using ffprobe
    pub async fn probe(&self, video_path: &Path) -> Result<VideoInfo, SamplingError> {
        let mime_type = mime_type_for(video_path).ok_or_else(|| {
            SamplingError::UnsupportedFormat(format!(
                "unrecognized video extension: {}",
                video_path.display()
            ))
        })?;

        let file_size = tokio::fs::metadata(video_path).await?.len();
        let ffprobe_data = self.run_ffprobe(video_path).await?;

        let streams = ffprobe_data["streams"]
            .as_array()
            .ok_or_else(|| SamplingError::UnsupportedFormat("ffprobe reported no streams".into()))?;

        let video_stream = streams
            .iter()
            .find(|s| s["codec_type"] == "video")
            .ok_or_else(|| SamplingError::UnsupportedFormat("no video stream found".into()))?;

        let duration_seconds = Self::duration_seconds(&ffprobe_data)
            .ok_or_else(|| SamplingError::UnsupportedFormat("clip has no usable duration".into()))?;

        let video_info = VideoInfo {
            path: video_path.to_path_buf(),
            filename: video_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            duration: Duration::from_secs_f64(duration_seconds),
            width: video_stream["width"].as_u64().unwrap_or(0) as u32,
            height: video_stream["height"].as_u64().unwrap_or(0) as u32,
            fps: video_stream["r_frame_rate"]
                .as_str()
                .and_then(parse_frame_rate)
                .unwrap_or(0.0),
            format: ffprobe_data["format"]["format_name"]
                .as_str()
                .unwrap_or("unknown")
                .to_string(),
            file_size,
            mime_type: mime_type.to_string(),
        };

        info!(
            "📹 Analyzed video: {} ({}x{}, {:.1}fps, {:.1}s)",
            video_info.filename,
            video_info.width,
            video_info.height,
            video_info.fps,
            video_info.duration.as_secs_f64()
        );

        Ok(video_info)
    }

    /// Read only the duration of a clip, in seconds
    pub async fn duration(&self, video_path: &Path) -> Result<f64, SamplingError> {
        let ffprobe_data = self.run_ffprobe(video_path).await?;
        Self::duration_seconds(&ffprobe_data)
            .ok_or_else(|| SamplingError::UnsupportedFormat("clip has no usable duration".into()))
    }

    async fn run_ffprobe(&self, video_path: &Path) -> Result<serde_json::Value, SamplingError> {
        debug!("Probing {}", video_path.display());

        let output = tokio::process::Command::new(&self.ffprobe_path)
            .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(video_path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(SamplingError::UnsupportedFormat(format!(
                "ffprobe could not open {}",
                video_path.display()
            )));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| {
            SamplingError::UnsupportedFormat(format!("unreadable ffprobe output: {}", e))
        })
    }

    /// First finite, positive duration reported by ffprobe
    fn duration_seconds(ffprobe_data: &serde_json::Value) -> Option<f64> {
        let usable = |value: &serde_json::Value| {
            value
                .as_str()
                .and_then(|s| s.parse::<f64>().ok())
                .filter(|d| d.is_finite() && *d > 0.0)
        };

        // Some containers only report duration on the stream
        usable(&ffprobe_data["format"]["duration"]).or_else(|| {
            ffprobe_data["streams"]
                .as_array()?
                .iter()
                .find_map(|s| usable(&s["duration"]))
        })
    }
}

impl Default for VideoProbe {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mime_type_for_extensions() {
        assert_eq!(mime_type_for(Path::new("wave.mp4")), Some("video/mp4"));
        assert_eq!(mime_type_for(Path::new("wave.MOV")), Some("video/quicktime"));
        assert_eq!(mime_type_for(Path::new("wave.webm")), Some("video/webm"));
        assert_eq!(mime_type_for(Path::new("notes.txt")), None);
        assert_eq!(mime_type_for(Path::new("no_extension")), None);
    }

    #[test]
    fn test_extension_for_mime() {
        assert_eq!(extension_for_mime("video/mp4"), Some("mp4"));
        assert_eq!(extension_for_mime("Video/QuickTime"), Some("mov"));
        assert_eq!(extension_for_mime("image/jpeg"), None);
    }

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("0/0"), None);
    }

    #[test]
    fn test_duration_falls_back_to_stream() {
        let data = json!({
            "format": { "format_name": "webm" },
            "streams": [{ "codec_type": "video", "duration": "12.5" }]
        });
        assert_eq!(VideoProbe::duration_seconds(&data), Some(12.5));

        let data = json!({ "format": { "duration": "11.000000" }, "streams": [] });
        assert_eq!(VideoProbe::duration_seconds(&data), Some(11.0));
    }

    #[test]
    fn test_non_finite_duration_is_unusable() {
        let data = json!({
            "format": { "duration": "inf" },
            "streams": [{ "codec_type": "video", "duration": "NaN" }]
        });
        assert_eq!(VideoProbe::duration_seconds(&data), None);

        let data = json!({
            "format": { "duration": "inf" },
            "streams": [{ "codec_type": "video", "duration": "8.25" }]
        });
        assert_eq!(VideoProbe::duration_seconds(&data), Some(8.25));

        let data = json!({ "format": { "duration": "0.000000" }, "streams": [] });
        assert_eq!(VideoProbe::duration_seconds(&data), None);
    }

    #[tokio::test]
    async fn test_unknown_extension_is_rejected_before_ffprobe() {
        let probe = VideoProbe::default();
        let err = probe.probe(Path::new("clip.txt")).await.unwrap_err();
        assert!(matches!(err, SamplingError::UnsupportedFormat(_)));
    }
}
