use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure taxonomy shared by sampling, requesting and the pipeline policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The decoder could not open the input, or the format is not a video we accept
    UnsupportedFormat,
    /// Sampling or the model request exceeded its time budget
    Timeout,
    /// A timestamp never produced a decoded picture
    SeekFailure,
    /// The model returned no text at all
    EmptyResponse,
    /// The model text did not contain a valid analysis object
    MalformedResponse,
    /// The provider refused the content (safety filters)
    ContentBlocked,
    /// Provider quota or rate limit hit
    RateLimited,
    /// Credential missing, rejected or pointing at an unknown model/project
    CredentialInvalid,
    /// Anything else; the only kind that is retried
    TransientFailure,
    /// The input exceeds the configured size or duration limits
    InputTooLarge,
}

impl ErrorKind {
    /// Only transient failures are worth sending the identical payload again.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::TransientFailure)
    }

    /// Whether the caller should ask the host for a fresh credential.
    pub fn needs_reauthentication(self) -> bool {
        matches!(self, ErrorKind::CredentialInvalid)
    }

    /// Message suitable for showing to the person who uploaded the video.
    pub fn user_message(self) -> &'static str {
        match self {
            ErrorKind::UnsupportedFormat => {
                "This video format could not be read. Try exporting the clip as MP4 (H.264)."
            }
            ErrorKind::Timeout => {
                "The analysis took too long. Try a shorter clip or fewer frames."
            }
            ErrorKind::SeekFailure => {
                "Some moments of the video could not be decoded. Try re-exporting the clip."
            }
            ErrorKind::EmptyResponse => "The coach returned an empty answer. Please try again.",
            ErrorKind::MalformedResponse => {
                "The coach's answer could not be understood. Try another clip or angle."
            }
            ErrorKind::ContentBlocked => {
                "The video was blocked by the provider's safety filters. Try a different clip."
            }
            ErrorKind::RateLimited => {
                "The analysis quota is exhausted for now. Wait a minute before trying again."
            }
            ErrorKind::CredentialInvalid => {
                "The API key was rejected. Select or configure a valid key and try again."
            }
            ErrorKind::TransientFailure => {
                "The analysis service had a temporary problem. Please try again."
            }
            ErrorKind::InputTooLarge => {
                "The video is too large or too long. Trim it and upload a shorter clip."
            }
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::UnsupportedFormat => "unsupported format",
            ErrorKind::Timeout => "timeout",
            ErrorKind::SeekFailure => "seek failure",
            ErrorKind::EmptyResponse => "empty response",
            ErrorKind::MalformedResponse => "malformed response",
            ErrorKind::ContentBlocked => "content blocked",
            ErrorKind::RateLimited => "rate limited",
            ErrorKind::CredentialInvalid => "credential invalid",
            ErrorKind::TransientFailure => "transient failure",
            ErrorKind::InputTooLarge => "input too large",
        };
        f.write_str(name)
    }
}

/// Error types for frame sampling
#[derive(thiserror::Error, Debug)]
pub enum SamplingError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Sampling timed out after {0:.1}s")]
    Timeout(f64),

    #[error("No picture decoded at {timestamp:.3}s after {attempts} attempts")]
    SeekFailure { timestamp: f64, attempts: u32 },

    #[error("Invalid sampling parameters: {0}")]
    InvalidParameters(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SamplingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SamplingError::UnsupportedFormat(_) | SamplingError::InvalidParameters(_) => {
                ErrorKind::UnsupportedFormat
            }
            SamplingError::Timeout(_) => ErrorKind::Timeout,
            SamplingError::SeekFailure { .. } => ErrorKind::SeekFailure,
            // Staging or spawning the decoder failed; the input was never opened
            SamplingError::Io(_) => ErrorKind::UnsupportedFormat,
        }
    }
}

/// Raw failure reported by a model collaborator. The text is what
/// classification matches against, unless the collaborator already knows
/// the kind.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ModelError {
    pub message: String,
    pub kind: Option<ErrorKind>,
}

impl ModelError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: None,
        }
    }

    /// Failure whose kind is known without looking at the text
    pub fn with_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: Some(kind),
        }
    }
}

impl From<reqwest::Error> for ModelError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            Some(ErrorKind::Timeout)
        } else if err.is_decode() {
            Some(ErrorKind::MalformedResponse)
        } else {
            None
        };
        let status = err.status();

        // Keep the whole cause chain: connect, DNS and TLS details live in sources
        let mut message = format!("{:#}", anyhow::Error::from(err));
        if let Some(status) = status {
            message = format!("{}: {}", status.as_u16(), message);
        }
        Self { message, kind }
    }
}

/// Errors raised by the pipeline itself rather than reported as an outcome
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("An analysis is already running")]
    AlreadyRunning,
}
