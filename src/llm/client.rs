//! OpenAI-compatible gateway client.
//!
//! A thin transport: builds the request, enforces the profile deadline,
//! classifies transport failures, and hands back the raw completion text.
//! Response content is never interpreted here — the agents own parsing.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;

use crate::config::LlmSettings;

use super::errors::LlmError;
use super::types::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, GenerationProfile,
};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on any single request, regardless of profile deadline.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Deadline for the health probe.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(3);

// ─── Trait Seam ──────────────────────────────────────────────────────────────

/// The generation seam the agents depend on.
///
/// Production uses [`LlmGateway`]; orchestrator tests substitute a scripted
/// implementation so turns run without a live endpoint.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Run one completion and return the raw text.
    async fn generate(
        &self,
        messages: Vec<ChatMessage>,
        profile: GenerationProfile,
    ) -> Result<String, LlmError>;

    /// Probe whether the endpoint is reachable.
    async fn health_check(&self) -> bool;
}

// ─── LlmGateway ──────────────────────────────────────────────────────────────

/// Client for the configured chat-completions endpoint.
pub struct LlmGateway {
    http: HttpClient,
    settings: LlmSettings,
}

impl LlmGateway {
    /// Build a gateway from validated settings.
    ///
    /// Does NOT check connectivity — that happens on the first request or
    /// via [`TextGenerator::health_check`].
    pub fn new(settings: LlmSettings) -> Result<Self, LlmError> {
        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LlmError::ConnectionFailed {
                endpoint: settings.base_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { http, settings })
    }

    /// The model tag requests are issued against.
    pub fn model(&self) -> &str {
        &self.settings.model
    }

    async fn send_request(
        &self,
        messages: Vec<ChatMessage>,
        profile: GenerationProfile,
    ) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.settings.base_url);

        let body = ChatCompletionRequest {
            model: self.settings.model.clone(),
            messages,
            temperature: profile.temperature,
            max_tokens: profile.max_output_tokens.min(self.settings.max_tokens),
            stream: false,
        };

        // Log request metadata only — prompt bodies stay out of the logs.
        tracing::debug!(
            url = %url,
            model = %body.model,
            message_count = body.messages.len(),
            temperature = body.temperature,
            max_tokens = body.max_tokens,
            "gateway request"
        );

        let mut request = self.http.post(&url).json(&body);
        if !self.settings.api_key.is_empty() {
            request = request.bearer_auth(&self.settings.api_key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout {
                    duration_secs: REQUEST_TIMEOUT.as_secs(),
                }
            } else {
                LlmError::ConnectionFailed {
                    endpoint: url.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status(status.as_u16(), body_text));
        }

        let parsed: ChatCompletionResponse =
            response.json().await.map_err(|e| LlmError::Unknown {
                reason: format!("malformed completion body: {e}"),
            })?;

        parsed
            .first_text()
            .map(|s| s.to_string())
            .ok_or(LlmError::EmptyResponse)
    }
}

#[async_trait]
impl TextGenerator for LlmGateway {
    async fn generate(
        &self,
        messages: Vec<ChatMessage>,
        profile: GenerationProfile,
    ) -> Result<String, LlmError> {
        match tokio::time::timeout(profile.deadline, self.send_request(messages, profile)).await
        {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout {
                duration_secs: profile.deadline.as_secs(),
            }),
        }
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/models", self.settings.base_url);
        let mut request = self.http.get(&url).timeout(HEALTH_TIMEOUT);
        if !self.settings.api_key.is_empty() {
            request = request.bearer_auth(&self.settings.api_key);
        }
        match request.send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> LlmSettings {
        LlmSettings {
            base_url: "http://localhost:1".into(),
            api_key: String::new(),
            model: "test-model".into(),
            temperature: 0.7,
            max_tokens: 256,
        }
    }

    #[test]
    fn test_gateway_builds_from_settings() {
        let gateway = LlmGateway::new(settings()).unwrap();
        assert_eq!(gateway.model(), "test-model");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_connection_failure() {
        // Port 1 is never listening; the connect attempt must classify as
        // unavailable rather than panicking or hanging past the deadline.
        let gateway = LlmGateway::new(settings()).unwrap();
        let err = gateway
            .generate(vec![ChatMessage::user("hi")], GenerationProfile::extraction())
            .await
            .unwrap_err();
        assert!(err.is_unavailable(), "got: {err}");
    }

    #[tokio::test]
    async fn test_health_check_false_when_unreachable() {
        let gateway = LlmGateway::new(settings()).unwrap();
        assert!(!gateway.health_check().await);
    }
}
