//! Shared types for the LLM gateway.
//!
//! These mirror the OpenAI Chat Completions API types, used for both
//! request building and response parsing. Streaming variants are absent:
//! every call is a single round trip.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ─── Request Types ───────────────────────────────────────────────────────────

/// A single message in the prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Request body for `POST /v1/chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

// ─── Generation Profiles ────────────────────────────────────────────────────

/// Per-call generation settings.
///
/// Two presets exist: *extraction* (low temperature, short budget,
/// deterministic JSON expected) and *conversation* (higher temperature,
/// medium budget, prose expected). The deadline is enforced by the client
/// with `tokio::time::timeout` — a breached call is aborted, not awaited.
#[derive(Debug, Clone, Copy)]
pub struct GenerationProfile {
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub deadline: Duration,
}

impl GenerationProfile {
    /// Deterministic profile for parameter mining and acknowledgements.
    pub fn extraction() -> Self {
        Self {
            temperature: 0.1,
            max_output_tokens: 512,
            deadline: Duration::from_secs(10),
        }
    }

    /// Creative profile for user-facing replies.
    pub fn conversation() -> Self {
        Self {
            temperature: 0.7,
            max_output_tokens: 1024,
            deadline: Duration::from_secs(30),
        }
    }
}

// ─── Response Types ──────────────────────────────────────────────────────────

/// Response body from `POST /v1/chat/completions` (non-streaming).
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<CompletionChoice>,
}

/// A single completion choice.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionChoice {
    pub message: CompletionMessage,
    #[serde(default)]
    #[allow(dead_code)]
    pub finish_reason: Option<String>,
}

/// The assistant message inside a choice.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatCompletionResponse {
    /// Pull the first choice's text, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .filter(|s| !s.trim().is_empty())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_presets() {
        let extraction = GenerationProfile::extraction();
        let conversation = GenerationProfile::conversation();
        assert!(extraction.temperature < conversation.temperature);
        assert!(extraction.deadline < conversation.deadline);
        assert!(extraction.max_output_tokens < conversation.max_output_tokens);
    }

    #[test]
    fn test_request_serializes_roles_lowercase() {
        let req = ChatCompletionRequest {
            model: "test".into(),
            messages: vec![ChatMessage::system("s"), ChatMessage::user("u")],
            temperature: 0.1,
            max_tokens: 64,
            stream: false,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"role\":\"system\""));
        assert!(json.contains("\"role\":\"user\""));
        assert!(json.contains("\"stream\":false"));
    }

    #[test]
    fn test_first_text_skips_empty_content() {
        let resp: ChatCompletionResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"content":"   "}}]}"#,
        )
        .unwrap();
        assert!(resp.first_text().is_none());

        let resp: ChatCompletionResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"content":"hello"},"finish_reason":"stop"}]}"#,
        )
        .unwrap();
        assert_eq!(resp.first_text(), Some("hello"));
    }

    #[test]
    fn test_response_tolerates_missing_content() {
        let resp: ChatCompletionResponse =
            serde_json::from_str(r#"{"choices":[{"message":{}}]}"#).unwrap();
        assert!(resp.first_text().is_none());
    }
}
