use anyhow::Result;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ModelCall, ModelClient, ModelPart, ModelProvider};
use crate::config::ModelConfig;
use crate::error::{ErrorKind, ModelError};

/// Finish reasons that mean the provider withheld the answer
const BLOCKING_FINISH_REASONS: &[&str] = &["SAFETY", "PROHIBITED_CONTENT", "BLOCKLIST", "SPII", "RECITATION"];

/// Gemini `generateContent` client
pub struct GeminiClient {
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: &'static str,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum GeminiPart {
    Text(String),
    InlineData(GeminiBlob),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiBlob {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    response_mime_type: String,
    response_schema: serde_json::Value,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    prompt_feedback: Option<GeminiPromptFeedback>,
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    total_token_count: Option<u32>,
}

impl GeminiClient {
    /// No per-call timeout is set here: the caller's deadline bounds the
    /// whole request, retry included.
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;

        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, model)
    }
}

fn build_request(call: &ModelCall) -> GeminiRequest {
    let parts = call
        .parts
        .iter()
        .map(|part| match part {
            ModelPart::Text(text) => GeminiPart::Text(text.clone()),
            ModelPart::InlineData { mime_type, data } => GeminiPart::InlineData(GeminiBlob {
                mime_type: mime_type.clone(),
                data: STANDARD.encode(data),
            }),
        })
        .collect();

    GeminiRequest {
        contents: vec![GeminiContent { role: "user", parts }],
        generation_config: GeminiGenerationConfig {
            response_mime_type: call.response_mime_type.clone(),
            response_schema: call.response_schema.clone(),
            temperature: call.temperature,
        },
    }
}

/// Decode the response envelope. A body that is not one (proxy pages,
/// truncated JSON) cannot improve on resend.
fn parse_envelope(body: &str) -> Result<GeminiResponse, ModelError> {
    serde_json::from_str(body).map_err(|e| {
        ModelError::with_kind(
            ErrorKind::MalformedResponse,
            format!("unreadable Gemini response envelope: {}", e),
        )
    })
}

/// Pull the answer text out of a response, surfacing provider-side blocks as errors
fn response_text(response: GeminiResponse) -> Result<Option<String>, ModelError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ModelError::new(format!(
            "Request blocked by safety filters: {}",
            reason
        )));
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Ok(None);
    };

    if let Some(reason) = candidate.finish_reason.as_deref() {
        if BLOCKING_FINISH_REASONS.contains(&reason) {
            return Err(ModelError::new(format!(
                "Response candidate blocked (finish reason: {})",
                reason
            )));
        }
    }

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    Ok((!text.trim().is_empty()).then_some(text))
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn generate(&self, call: &ModelCall, credential: &str) -> Result<Option<String>, ModelError> {
        let request = build_request(call);

        debug!(
            "Sending request to Gemini ({}, {} media parts, {} bytes)",
            call.model,
            call.media_parts(),
            call.payload_bytes()
        );

        let response = self
            .client
            .post(self.url(&call.model))
            .header("x-goog-api-key", credential)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ModelError::new(format!("{}: {}", status, text)));
        }

        let body = response.text().await?;
        let gemini_response = parse_envelope(&body)?;

        if let Some(tokens) = gemini_response
            .usage_metadata
            .as_ref()
            .and_then(|u| u.total_token_count)
        {
            debug!("Gemini response received (tokens: {})", tokens);
        }

        response_text(gemini_response)
    }

    fn provider_type(&self) -> ModelProvider {
        ModelProvider::Gemini
    }
}
