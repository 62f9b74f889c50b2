//! LLM gateway — transport to an OpenAI-compatible text endpoint.
//!
//! Submodules:
//! - `client`: HTTP client with per-profile deadlines and health checks
//! - `types`: Chat Completions request/response types and generation profiles
//! - `errors`: transport error classification

pub mod client;
pub mod errors;
pub mod types;

pub use client::{LlmGateway, TextGenerator};
pub use errors::LlmError;
pub use types::{ChatMessage, GenerationProfile, Role};

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted generator for agent and orchestrator tests.

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{ChatMessage, GenerationProfile, LlmError, TextGenerator};

    /// Replays a fixed sequence of replies; an exhausted script answers with
    /// `EmptyResponse` errors.
    pub struct ScriptedGenerator {
        replies: Mutex<VecDeque<Result<String, LlmError>>>,
        pub prompts: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedGenerator {
        pub fn new(replies: Vec<Result<String, LlmError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn always_failing() -> Self {
            Self::new(Vec::new())
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(
            &self,
            messages: Vec<ChatMessage>,
            _profile: GenerationProfile,
        ) -> Result<String, LlmError> {
            self.prompts.lock().unwrap().push(messages);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(LlmError::EmptyResponse))
        }

        async fn health_check(&self) -> bool {
            true
        }
    }
}
