pub mod gemini;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ModelError;

pub use gemini::GeminiClient;

/// One part of a multimodal request
#[derive(Debug, Clone, PartialEq)]
pub enum ModelPart {
    Text(String),
    InlineData { mime_type: String, data: Vec<u8> },
}

/// A single structured-output generation call
#[derive(Debug, Clone)]
pub struct ModelCall {
    pub model: String,
    pub parts: Vec<ModelPart>,
    pub response_schema: serde_json::Value,
    pub response_mime_type: String,
    pub temperature: f32,
}

impl ModelCall {
    /// Number of inline media parts carried by the call
    pub fn media_parts(&self) -> usize {
        self.parts
            .iter()
            .filter(|p| matches!(p, ModelPart::InlineData { .. }))
            .count()
    }

    /// Total inline payload size in bytes
    pub fn payload_bytes(&self) -> usize {
        self.parts
            .iter()
            .map(|p| match p {
                ModelPart::Text(text) => text.len(),
                ModelPart::InlineData { data, .. } => data.len(),
            })
            .sum()
    }
}

/// Hosted model providers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ModelProvider {
    Gemini,
}

/// Trait for hosted multimodal model collaborators.
///
/// `Ok(None)` means the provider answered without any text.
/// Errors carry the provider's raw message so it can be classified.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(&self, call: &ModelCall, credential: &str) -> Result<Option<String>, ModelError>;
    fn provider_type(&self) -> ModelProvider;
}

/// Source of the API credential. Consulted on every attempt, never cached,
/// so a key rotated between attempts is picked up.
pub trait CredentialProvider: Send + Sync {
    fn current(&self) -> Option<String>;
}

impl<F> CredentialProvider for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn current(&self) -> Option<String> {
        self()
    }
}

/// Reads the credential from an environment variable at call time
#[derive(Debug, Clone)]
pub struct EnvCredential {
    var: String,
}

impl EnvCredential {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }

    pub fn var(&self) -> &str {
        &self.var
    }
}

impl CredentialProvider for EnvCredential {
    fn current(&self) -> Option<String> {
        std::env::var(&self.var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

/// Host capability invoked when the provider rejects the credential.
/// The host decides how a new credential is obtained.
#[async_trait]
pub trait ReauthHandler: Send + Sync {
    async fn request_reauthentication(&self, reason: &str);
}

/// Re-auth handler for hosts without an interactive key selector
#[derive(Debug, Clone)]
pub struct LogReauth {
    credential_env: String,
}

impl LogReauth {
    pub fn new(credential_env: impl Into<String>) -> Self {
        Self {
            credential_env: credential_env.into(),
        }
    }
}

#[async_trait]
impl ReauthHandler for LogReauth {
    async fn request_reauthentication(&self, reason: &str) {
        warn!(
            "🔑 Credential rejected ({}). Set a valid key in ${} and retry.",
            reason, self.credential_env
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_credential_reads_fresh_value() {
        let var = "SURFCOACH_TEST_CREDENTIAL_ROTATION";
        let credential = EnvCredential::new(var);

        std::env::remove_var(var);
        assert_eq!(credential.current(), None);

        std::env::set_var(var, "first-key");
        assert_eq!(credential.current().as_deref(), Some("first-key"));

        std::env::set_var(var, "  rotated-key \n");
        assert_eq!(credential.current().as_deref(), Some("rotated-key"));

        std::env::set_var(var, "   ");
        assert_eq!(credential.current(), None);
        std::env::remove_var(var);
    }

    #[test]
    fn test_closure_credential_provider() {
        let provider = || Some("inline".to_string());
        assert_eq!(provider.current().as_deref(), Some("inline"));
    }

    #[test]
    fn test_model_call_payload_accounting() {
        let call = ModelCall {
            model: "m".into(),
            parts: vec![
                ModelPart::Text("abcd".into()),
                ModelPart::InlineData { mime_type: "image/jpeg".into(), data: vec![0; 10] },
                ModelPart::InlineData { mime_type: "image/jpeg".into(), data: vec![0; 6] },
            ],
            response_schema: serde_json::json!({}),
            response_mime_type: "application/json".into(),
            temperature: 0.4,
        };
        assert_eq!(call.media_parts(), 2);
        assert_eq!(call.payload_bytes(), 20);
    }
}
