use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, info, warn};

use crate::analysis::{AnalysisRequest, AnalysisRequester, RequestOutcome};
use crate::config::{Config, InputMode, PolicyConfig};
use crate::error::{ErrorKind, PipelineError};
use crate::sampling::{FrameSampler, VideoSource};
use crate::video::{VideoInfo, VideoProbe};

/// How a clip is handed to the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputPlan {
    RawVideo,
    Frames,
}

/// Apply input limits and the raw-vs-frames policy to a probed clip
pub fn plan_input(policy: &PolicyConfig, info: &VideoInfo) -> Result<InputPlan, String> {
    if let Some(max) = policy.max_file_size_bytes() {
        if info.file_size > max {
            return Err(format!(
                "{} is {:.1} MB, limit is {} MB",
                info.filename,
                info.file_size as f64 / 1_048_576.0,
                policy.max_file_size_mb
            ));
        }
    }

    if let Some(max) = policy.max_duration() {
        if info.duration > max {
            return Err(format!(
                "{} runs {:.1}s, limit is {}s",
                info.filename,
                info.duration.as_secs_f64(),
                policy.max_duration_seconds
            ));
        }
    }

    let plan = match policy.mode {
        InputMode::Raw => InputPlan::RawVideo,
        InputMode::Frames => InputPlan::Frames,
        InputMode::Auto if info.file_size <= policy.raw_video_max_bytes() => InputPlan::RawVideo,
        InputMode::Auto => InputPlan::Frames,
    };
    Ok(plan)
}

/// Take the only run permit, or fail fast if a run holds it.
/// The permit is returned when the run ends, however it ends.
fn acquire_run(gate: &Semaphore) -> Result<SemaphorePermit<'_>, PipelineError> {
    gate.try_acquire().map_err(|_| PipelineError::AlreadyRunning)
}

/// Probe → plan → optional sampling → request, one run at a time
pub struct AnalysisPipeline {
    policy: PolicyConfig,
    probe: VideoProbe,
    sampler: FrameSampler,
    requester: AnalysisRequester,
    run_gate: Semaphore,
}

impl AnalysisPipeline {
    pub fn new(config: &Config, requester: AnalysisRequester) -> Self {
        info!(
            "🔧 Initializing pipeline ({} frames @ {}, mode {:?})",
            config.sampling.frame_count, config.sampling.preset, config.policy.mode
        );

        Self {
            policy: config.policy.clone(),
            probe: VideoProbe::new(config.sampling.ffprobe_path.clone()),
            sampler: FrameSampler::new(&config.sampling),
            requester,
            run_gate: Semaphore::new(1),
        }
    }

    pub fn is_running(&self) -> bool {
        self.run_gate.available_permits() == 0
    }

    pub fn plan(&self, info: &VideoInfo) -> Result<InputPlan, String> {
        plan_input(&self.policy, info)
    }

    /// Analyze a video file.
    ///
    /// Dropping the returned future cancels the run: decoder processes,
    /// staged files and the pending HTTP call are all released with it.
    pub async fn run(&self, video_path: &Path) -> Result<RequestOutcome, PipelineError> {
        let _permit = acquire_run(&self.run_gate)?;

        let info = match self.probe.probe(video_path).await {
            Ok(info) => info,
            Err(e) => {
                warn!("Video analysis failed for {}: {}", video_path.display(), e);
                return Ok(RequestOutcome::failure(e.kind(), e.to_string()));
            }
        };

        self.analyze_probed(&info).await
    }

    /// Analyze a clip that has already been probed
    pub async fn run_probed(&self, info: &VideoInfo) -> Result<RequestOutcome, PipelineError> {
        let _permit = acquire_run(&self.run_gate)?;
        self.analyze_probed(info).await
    }

    async fn analyze_probed(&self, info: &VideoInfo) -> Result<RequestOutcome, PipelineError> {
        let start_time = Instant::now();

        let plan = match self.plan(info) {
            Ok(plan) => plan,
            Err(reason) => {
                warn!("🚫 Rejected input: {}", reason);
                return Ok(RequestOutcome::failure(ErrorKind::InputTooLarge, reason));
            }
        };
        debug!("Input plan for {}: {:?}", info.filename, plan);

        let request = match plan {
            InputPlan::RawVideo => match tokio::fs::read(&info.path).await {
                Ok(bytes) => AnalysisRequest::RawVideo {
                    bytes,
                    mime_type: info.mime_type.clone(),
                },
                Err(e) => {
                    warn!("Could not read {}: {}", info.path.display(), e);
                    return Ok(RequestOutcome::failure(
                        ErrorKind::UnsupportedFormat,
                        format!("could not read {}: {}", info.filename, e),
                    ));
                }
            },
            InputPlan::Frames => {
                match self.sampler.sample(&VideoSource::Path(info.path.clone())).await {
                    Ok(frames) => AnalysisRequest::FrameSequence { frames },
                    Err(e) => {
                        // No request goes out with a partial frame set
                        warn!("Frame sampling failed for {}: {}", info.filename, e);
                        return Ok(RequestOutcome::failure(e.kind(), e.to_string()));
                    }
                }
            }
        };

        let outcome = self.requester.analyze(&request).await;

        info!(
            "🎉 Pipeline finished for {} in {:.2}s",
            info.filename,
            start_time.elapsed().as_secs_f64()
        );

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use std::path::PathBuf;
    use std::time::Duration;

    fn info(file_size: u64, duration_secs: u64) -> VideoInfo {
        VideoInfo {
            path: PathBuf::from("ride.mp4"),
            filename: "ride.mp4".to_string(),
            duration: Duration::from_secs(duration_secs),
            width: 1920,
            height: 1080,
            fps: 30.0,
            format: "mov,mp4,m4a,3gp,3g2,mj2".to_string(),
            file_size,
            mime_type: "video/mp4".to_string(),
        }
    }

    const MB: u64 = 1024 * 1024;

    #[test]
    fn test_auto_mode_switches_on_size() {
        let policy = Config::default().policy;
        assert_eq!(plan_input(&policy, &info(5 * MB, 30)), Ok(InputPlan::RawVideo));
        assert_eq!(plan_input(&policy, &info(20 * MB, 30)), Ok(InputPlan::RawVideo));
        assert_eq!(plan_input(&policy, &info(20 * MB + 1, 30)), Ok(InputPlan::Frames));
    }

    #[test]
    fn test_forced_modes() {
        let raw = ConfigBuilder::new().with_mode(InputMode::Raw).build().policy;
        assert_eq!(plan_input(&raw, &info(80 * MB, 30)), Ok(InputPlan::RawVideo));

        let frames = ConfigBuilder::new().with_mode(InputMode::Frames).build().policy;
        assert_eq!(plan_input(&frames, &info(MB, 30)), Ok(InputPlan::Frames));
    }

    #[test]
    fn test_limits_reject_input() {
        let policy = ConfigBuilder::new().with_max_duration_seconds(60).build().policy;
        assert!(plan_input(&policy, &info(150 * MB, 30)).is_err());
        assert!(plan_input(&policy, &info(MB, 61)).unwrap_err().contains("61.0s"));
        assert!(plan_input(&policy, &info(MB, 60)).is_ok());
    }

    #[test]
    fn test_zero_limits_mean_unlimited() {
        let policy = ConfigBuilder::new()
            .with_max_file_size_mb(0)
            .with_max_duration_seconds(0)
            .build()
            .policy;
        assert_eq!(plan_input(&policy, &info(4096 * MB, 7200)), Ok(InputPlan::Frames));
    }

    #[test]
    fn test_run_gate_is_exclusive_and_released() {
        let gate = Semaphore::new(1);
        let permit = acquire_run(&gate).unwrap();
        assert!(matches!(acquire_run(&gate), Err(PipelineError::AlreadyRunning)));
        drop(permit);
        assert!(acquire_run(&gate).is_ok());
    }
}
