use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::schema::{build_parts, response_schema, DEFAULT_INSTRUCTION, RESPONSE_MIME_TYPE};
use super::{classify_error, parse_analysis, AnalysisRequest, RequestOutcome};
use crate::config::ModelConfig;
use crate::error::ErrorKind;
use crate::llm::{CredentialProvider, LogReauth, ModelCall, ModelClient, ReauthHandler};

/// Retries granted to a transient failure. Never more than one.
const MAX_RETRIES: u32 = 1;

/// Lifecycle of one requested analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    Submitting,
    WaitingForResponse,
    Completed,
    Failed(ErrorKind),
}

impl RequestState {
    /// Whether `next` is a legal step from this state
    pub fn can_advance_to(self, next: RequestState) -> bool {
        use RequestState::*;
        match (self, next) {
            (Idle, Submitting) => true,
            (Submitting, WaitingForResponse) => true,
            // Missing credential fails before anything is sent
            (Submitting, Failed(_)) => true,
            (WaitingForResponse, Completed) | (WaitingForResponse, Failed(_)) => true,
            (Failed(ErrorKind::TransientFailure), Submitting) => true,
            // Deadline expiry can interrupt any in-progress state
            (_, Failed(ErrorKind::Timeout)) => !self.is_terminal(),
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        match self {
            RequestState::Completed => true,
            RequestState::Failed(kind) => !kind.is_retryable(),
            _ => false,
        }
    }
}

/// Builds one multimodal request per analysis, submits it behind the fixed
/// output schema and turns the answer into a validated outcome.
pub struct AnalysisRequester {
    client: Arc<dyn ModelClient>,
    credentials: Arc<dyn CredentialProvider>,
    reauth: Arc<dyn ReauthHandler>,
    model: String,
    temperature: f32,
    timeout: Duration,
    instruction: String,
    state: watch::Sender<RequestState>,
}

impl AnalysisRequester {
    pub fn new(
        client: Arc<dyn ModelClient>,
        credentials: Arc<dyn CredentialProvider>,
        config: &ModelConfig,
    ) -> Self {
        Self {
            client,
            credentials,
            reauth: Arc::new(LogReauth::new(config.credential_env.clone())),
            model: config.model.clone(),
            temperature: config.temperature,
            timeout: config.timeout(),
            instruction: DEFAULT_INSTRUCTION.to_string(),
            state: watch::channel(RequestState::Idle).0,
        }
    }

    pub fn with_reauth_handler(mut self, reauth: Arc<dyn ReauthHandler>) -> Self {
        self.reauth = reauth;
        self
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    /// Publish state changes on a watch channel
    pub fn with_state_observer(mut self, state: watch::Sender<RequestState>) -> Self {
        self.state = state;
        self
    }

    /// State of the latest request
    pub fn state(&self) -> RequestState {
        *self.state.borrow()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Assemble the call sent on every attempt
    pub fn build_call(&self, request: &AnalysisRequest) -> ModelCall {
        ModelCall {
            model: self.model.clone(),
            parts: build_parts(request, &self.instruction),
            response_schema: response_schema(),
            response_mime_type: RESPONSE_MIME_TYPE.to_string(),
            temperature: self.temperature,
        }
    }

    /// Analyze within the configured deadline
    pub async fn analyze(&self, request: &AnalysisRequest) -> RequestOutcome {
        self.analyze_within(request, self.timeout).await
    }

    /// Analyze within `deadline`, retry included
    pub async fn analyze_within(&self, request: &AnalysisRequest, deadline: Duration) -> RequestOutcome {
        let started = Instant::now();
        let call = self.build_call(request);
        // Each request starts over, whatever the previous one ended in
        self.state.send_replace(RequestState::Idle);

        info!("🏄 Requesting analysis of {} from {}", request.describe(), self.model);

        let outcome = match tokio::time::timeout(deadline, self.run_attempts(&call)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!("⏰ Analysis request exceeded {:.1}s deadline", deadline.as_secs_f64());
                self.advance(RequestState::Failed(ErrorKind::Timeout));
                RequestOutcome::failure(
                    ErrorKind::Timeout,
                    format!("no answer within {:.1}s", deadline.as_secs_f64()),
                )
            }
        };

        match &outcome {
            RequestOutcome::Success(result) => info!(
                "✅ Analysis completed in {:.2}s (score {:.1})",
                started.elapsed().as_secs_f64(),
                result.score
            ),
            RequestOutcome::Failure { kind, message } => {
                warn!("❌ Analysis failed ({}): {}", kind, message)
            }
        }

        outcome
    }

    async fn run_attempts(&self, call: &ModelCall) -> RequestOutcome {
        let mut retries = 0;
        loop {
            self.advance(RequestState::Submitting);
            let outcome = self.attempt(call).await;

            let Some(kind) = outcome.error_kind() else {
                self.advance(RequestState::Completed);
                return outcome;
            };

            if kind.is_retryable() && retries < MAX_RETRIES {
                self.advance(RequestState::Failed(kind));
                retries += 1;
                warn!("🔁 Transient failure, retrying once with the same payload");
                continue;
            }

            // The host is asked before the state turns terminal, so a deadline
            // hit while it answers still reads as a timeout
            if kind.needs_reauthentication() {
                if let RequestOutcome::Failure { message, .. } = &outcome {
                    self.reauth.request_reauthentication(message).await;
                }
            }

            self.advance(RequestState::Failed(kind));
            return outcome;
        }
    }

    async fn attempt(&self, call: &ModelCall) -> RequestOutcome {
        let Some(credential) = self.credentials.current().filter(|c| !c.trim().is_empty()) else {
            return RequestOutcome::failure(ErrorKind::CredentialInvalid, "no API key configured");
        };

        self.advance(RequestState::WaitingForResponse);

        match self.client.generate(call, &credential).await {
            Ok(Some(text)) if !text.trim().is_empty() => match parse_analysis(&text) {
                Ok(result) => RequestOutcome::Success(result),
                Err(reason) => RequestOutcome::failure(ErrorKind::MalformedResponse, reason),
            },
            Ok(_) => RequestOutcome::failure(ErrorKind::EmptyResponse, "model returned no text"),
            Err(e) => {
                let kind = e.kind.unwrap_or_else(|| classify_error(&e.message));
                RequestOutcome::failure(kind, e.message)
            }
        }
    }

    fn advance(&self, next: RequestState) {
        let previous = self.state.send_replace(next);
        debug!("Request state {:?} -> {:?}", previous, next);
        debug_assert!(
            previous.can_advance_to(next),
            "illegal request state step {:?} -> {:?}",
            previous,
            next
        );
    }
}
