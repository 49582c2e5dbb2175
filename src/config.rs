use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sampling::FramePreset;

/// Configuration for the SurfCoach analyzer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Frame sampling settings
    pub sampling: SamplingConfig,

    /// Hosted model settings
    pub model: ModelConfig,

    /// Input limits and raw-vs-frames policy
    pub policy: PolicyConfig,

    /// Prompt text settings
    pub prompts: PromptConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Number of frames to sample from a clip
    pub frame_count: usize,

    /// Still image dimensions
    pub preset: FramePreset,

    /// JPEG quality factor (0.5 - 0.7)
    pub jpeg_quality: f32,

    /// Wall-clock budget for the whole sampling run (seconds)
    pub timeout_seconds: u64,

    /// Budget for one seek-and-capture attempt (seconds)
    pub frame_timeout_seconds: u64,

    /// Attempts per timestamp before giving up with a seek failure
    pub seek_attempts: u32,

    /// ffmpeg executable
    pub ffmpeg_path: PathBuf,

    /// ffprobe executable
    pub ffprobe_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model identifier
    pub model: String,

    /// Base URL of the generative language API
    pub endpoint: String,

    /// Environment variable holding the API key, read on every attempt
    pub credential_env: String,

    /// Temperature for generation
    pub temperature: f32,

    /// Deadline for the whole request, retry included (seconds)
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    /// Raw video when small enough, sampled frames otherwise
    Auto,
    /// Always upload the raw video bytes
    Raw,
    /// Always sample frames
    Frames,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Maximum accepted file size in MB (0 = no limit)
    pub max_file_size_mb: u64,

    /// Maximum accepted clip duration in seconds (0 = no limit)
    pub max_duration_seconds: u64,

    /// Files at or under this size are sent as raw video in auto mode (MB)
    pub raw_video_max_mb: u64,

    /// Input mode selection
    pub mode: InputMode,
}

/// Prompt configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Optional file overriding the built-in coaching instruction
    pub instruction_file: Option<PathBuf>,

    /// Language the coach should answer in
    pub language: String,
}

impl PromptConfig {
    /// Load the instruction text, falling back to the built-in prompt
    pub async fn load_instruction(&self) -> Result<String> {
        let base = match &self.instruction_file {
            Some(path) => tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to load prompt from {}", path.display()))?
                .trim()
                .to_string(),
            None => crate::analysis::schema::DEFAULT_INSTRUCTION.to_string(),
        };
        Ok(format!("{}\n\nWrite every text field in {}.", base, self.language))
    }
}

impl SamplingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_secs(self.frame_timeout_seconds)
    }
}

impl ModelConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl PolicyConfig {
    pub fn max_file_size_bytes(&self) -> Option<u64> {
        (self.max_file_size_mb > 0).then(|| self.max_file_size_mb * 1024 * 1024)
    }

    pub fn raw_video_max_bytes(&self) -> u64 {
        self.raw_video_max_mb * 1024 * 1024
    }

    pub fn max_duration(&self) -> Option<Duration> {
        (self.max_duration_seconds > 0).then(|| Duration::from_secs(self.max_duration_seconds))
    }
}

impl Config {
    /// Load configuration from the first file found, then apply environment overrides
    pub fn load() -> Result<Self> {
        let config_paths = ["surfcoach.toml", "config/surfcoach.toml"];

        for path in &config_paths {
            if Path::new(path).exists() {
                return Self::from_file(Path::new(path));
            }
        }

        Self::from_env()
    }

    /// Load configuration from an explicit file, then apply environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        tracing::info!("📄 Loaded configuration from: {}", path.display());
        config.apply_env_overrides();
        Ok(config)
    }

    /// Defaults with environment overrides
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(model) = std::env::var("SURFCOACH_MODEL") {
            self.model.model = model;
        }

        if let Ok(endpoint) = std::env::var("SURFCOACH_ENDPOINT") {
            self.model.endpoint = endpoint;
        }

        if let Ok(frames) = std::env::var("SURFCOACH_FRAME_COUNT") {
            match frames.parse() {
                Ok(n) => self.sampling.frame_count = n,
                Err(_) => tracing::warn!("Ignoring invalid SURFCOACH_FRAME_COUNT: {}", frames),
            }
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let config_str = toml::to_string_pretty(self)?;
        std::fs::write(path, config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.sampling.frame_count == 0 {
            return Err(anyhow!("frame_count must be greater than 0"));
        }

        if !(0.5..=0.7).contains(&self.sampling.jpeg_quality) {
            return Err(anyhow!(
                "jpeg_quality must be between 0.5 and 0.7, got {}",
                self.sampling.jpeg_quality
            ));
        }

        if self.sampling.timeout_seconds == 0 || self.sampling.frame_timeout_seconds == 0 {
            return Err(anyhow!("sampling timeouts must be greater than 0"));
        }

        if self.sampling.seek_attempts == 0 {
            return Err(anyhow!("seek_attempts must be at least 1"));
        }

        if self.model.model.trim().is_empty() {
            return Err(anyhow!("model identifier must not be empty"));
        }

        if self.model.credential_env.trim().is_empty() {
            return Err(anyhow!("credential_env must name an environment variable"));
        }

        if self.model.timeout_seconds == 0 {
            return Err(anyhow!("model timeout_seconds must be greater than 0"));
        }

        if self.policy.max_file_size_mb > 0 && self.policy.raw_video_max_mb > self.policy.max_file_size_mb {
            return Err(anyhow!(
                "raw_video_max_mb ({}) exceeds max_file_size_mb ({})",
                self.policy.raw_video_max_mb,
                self.policy.max_file_size_mb
            ));
        }

        tracing::debug!("✅ Configuration validation passed");
        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "SurfCoach Configuration:\n\
            - Model: {}\n\
            - Frames: {} @ {}\n\
            - JPEG Quality: {:.2}\n\
            - Sampling Timeout: {}s\n\
            - Request Timeout: {}s\n\
            - Input Mode: {:?}",
            self.model.model,
            self.sampling.frame_count,
            self.sampling.preset,
            self.sampling.jpeg_quality,
            self.sampling.timeout_seconds,
            self.model.timeout_seconds,
            self.policy.mode,
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sampling: SamplingConfig {
                frame_count: 12,
                preset: FramePreset::P540,
                jpeg_quality: 0.6,
                timeout_seconds: 30,
                frame_timeout_seconds: 5,
                seek_attempts: 2,
                ffmpeg_path: PathBuf::from("ffmpeg"),
                ffprobe_path: PathBuf::from("ffprobe"),
            },
            model: ModelConfig {
                model: "gemini-2.5-flash".to_string(),
                endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
                credential_env: "GEMINI_API_KEY".to_string(),
                temperature: 0.4,
                timeout_seconds: 120,
            },
            policy: PolicyConfig {
                max_file_size_mb: 100,
                max_duration_seconds: 0,
                raw_video_max_mb: 20,
                mode: InputMode::Auto,
            },
            prompts: PromptConfig {
                instruction_file: None,
                language: "English".to_string(),
            },
        }
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_frame_count(mut self, frame_count: usize) -> Self {
        self.config.sampling.frame_count = frame_count;
        self
    }

    pub fn with_preset(mut self, preset: FramePreset) -> Self {
        self.config.sampling.preset = preset;
        self
    }

    pub fn with_jpeg_quality(mut self, quality: f32) -> Self {
        self.config.sampling.jpeg_quality = quality;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.config.model.model = model.into();
        self
    }

    pub fn with_request_timeout(mut self, seconds: u64) -> Self {
        self.config.model.timeout_seconds = seconds;
        self
    }

    pub fn with_mode(mut self, mode: InputMode) -> Self {
        self.config.policy.mode = mode;
        self
    }

    pub fn with_max_file_size_mb(mut self, mb: u64) -> Self {
        self.config.policy.max_file_size_mb = mb;
        self
    }

    pub fn with_raw_video_max_mb(mut self, mb: u64) -> Self {
        self.config.policy.raw_video_max_mb = mb;
        self
    }

    pub fn with_max_duration_seconds(mut self, seconds: u64) -> Self {
        self.config.policy.max_duration_seconds = seconds;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sampling.frame_count, 12);
        assert_eq!(config.sampling.timeout_seconds, 30);
        assert_eq!(config.policy.mode, InputMode::Auto);
        assert_eq!(config.policy.max_file_size_bytes(), Some(100 * 1024 * 1024));
        assert_eq!(config.policy.max_duration(), None);
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .with_frame_count(18)
            .with_preset(FramePreset::P720)
            .with_mode(InputMode::Frames)
            .build();

        assert_eq!(config.sampling.frame_count, 18);
        assert_eq!(config.sampling.preset, FramePreset::P720);
        assert_eq!(config.policy.mode, InputMode::Frames);
    }

    #[test]
    fn test_config_validation() {
        assert!(Config::default().validate().is_ok());

        let zero_frames = ConfigBuilder::new().with_frame_count(0).build();
        assert!(zero_frames.validate().is_err());

        let bad_quality = ConfigBuilder::new().with_jpeg_quality(0.95).build();
        assert!(bad_quality.validate().is_err());

        let raw_over_limit = ConfigBuilder::new()
            .with_max_file_size_mb(10)
            .with_raw_video_max_mb(20)
            .build();
        assert!(raw_over_limit.validate().is_err());
    }

    #[test]
    fn test_config_file_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("surfcoach.toml");

        let config = ConfigBuilder::new().with_frame_count(10).build();
        config.save(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.sampling.preset, config.sampling.preset);
        assert_eq!(loaded.policy.raw_video_max_mb, 20);
    }

    #[tokio::test]
    async fn test_prompt_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("coach.txt");
        tokio::fs::write(&path, "  Judge the bottom turn only.  \n").await.unwrap();

        let prompts = PromptConfig {
            instruction_file: Some(path),
            language: "Spanish".to_string(),
        };
        let text = prompts.load_instruction().await.unwrap();
        assert!(text.starts_with("Judge the bottom turn only."));
        assert!(text.ends_with("Write every text field in Spanish."));
    }
}
