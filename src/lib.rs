/// SurfCoach Analyzer - Rust Implementation
///
/// Turns a surf video into a coaching analysis: samples evenly spaced frames
/// when the clip is too large to upload whole, sends the clip or its frames to
/// a hosted multimodal model behind a fixed JSON schema, and classifies every
/// failure so callers can retry, re-authenticate or explain it.

pub mod analysis;
pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod sampling;
pub mod video;

// Re-export main types for easy access
pub use crate::analysis::{
    AnalysisRequest, AnalysisRequester, AnalysisResult, Drill, Maneuver, PostureMetric,
    RequestOutcome, RequestState, TelemetryPoint,
};
pub use crate::config::{Config, ConfigBuilder, InputMode};
pub use crate::error::{ErrorKind, ModelError, PipelineError, SamplingError};
pub use crate::llm::{
    CredentialProvider, EnvCredential, GeminiClient, LogReauth, ModelCall, ModelClient, ModelPart,
    ReauthHandler,
};
pub use crate::pipeline::{AnalysisPipeline, InputPlan};
pub use crate::sampling::{
    sample_timestamps, DecodeSurface, FramePreset, FrameSampler, SampledFrame, VideoSource,
};
pub use crate::video::{VideoInfo, VideoProbe};
