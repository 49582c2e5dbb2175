pub mod classify;
pub mod requester;
pub mod response;
pub mod schema;

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::sampling::SampledFrame;

pub use classify::classify_error;
pub use requester::{AnalysisRequester, RequestState};
pub use response::{extract_json_object, parse_analysis};

/// What gets sent to the model: the whole clip or a sampled frame sequence
#[derive(Debug, Clone)]
pub enum AnalysisRequest {
    RawVideo { bytes: Vec<u8>, mime_type: String },
    FrameSequence { frames: Vec<SampledFrame> },
}

impl AnalysisRequest {
    pub fn describe(&self) -> String {
        match self {
            AnalysisRequest::RawVideo { bytes, mime_type } => {
                format!("raw video ({}, {:.1} MB)", mime_type, bytes.len() as f64 / 1_048_576.0)
            }
            AnalysisRequest::FrameSequence { frames } => format!("{} sampled frames", frames.len()),
        }
    }
}

/// One axis of the posture radar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostureMetric {
    pub subject: String,
    pub value: f64,
    #[serde(rename = "fullMark")]
    pub full_mark: f64,
}

/// One telemetry sample along the ride
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPoint {
    pub time: String,
    pub flow: f64,
    pub power: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Maneuver {
    pub time: String,
    pub name: String,
    pub execution: f64,
}

/// Training exercise recommended by the coach
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drill {
    pub title: String,
    pub description: String,
    pub focus: String,
}

/// Validated coaching analysis of one ride
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub score: f64,
    pub summary: String,
    pub posture: Vec<PostureMetric>,
    pub telemetry: Vec<TelemetryPoint>,
    pub maneuvers: Vec<Maneuver>,
    pub drills: Vec<Drill>,
}

/// Result of one requested analysis
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RequestOutcome {
    Success(AnalysisResult),
    Failure { kind: ErrorKind, message: String },
}

impl RequestOutcome {
    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        RequestOutcome::Failure {
            kind,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RequestOutcome::Success(_))
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            RequestOutcome::Success(_) => None,
            RequestOutcome::Failure { kind, .. } => Some(*kind),
        }
    }

    pub fn into_result(self) -> Result<AnalysisResult, (ErrorKind, String)> {
        match self {
            RequestOutcome::Success(result) => Ok(result),
            RequestOutcome::Failure { kind, message } => Err((kind, message)),
        }
    }
}
