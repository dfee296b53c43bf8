use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A chat message for the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Trait for LLM providers. Each backend implements this.
///
/// The returned text is untrusted: callers parse it defensively.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a chat completion request and return the assistant's response text.
    async fn complete(
        &self,
        messages: Vec<Message>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, LlmError>;

    /// Short backend name for logs.
    fn name(&self) -> &str;
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("API error: {status}: {body}")]
    ApiError { status: u16, body: String },
    #[error("failed to parse response: {0}")]
    ParseError(String),
    #[error("provider not configured: {0}")]
    NotConfigured(String),
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),
}

/// Run a completion under a deadline, folding expiry into [`LlmError::Timeout`].
pub async fn complete_within(
    provider: &dyn LlmProvider,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
) -> Result<String, LlmError> {
    let call = provider.complete(messages, temperature, max_tokens);
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(provider = provider.name(), ?timeout, "model call timed out");
            Err(LlmError::Timeout(timeout))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProvider;

    #[tokio::test(start_paused = true)]
    async fn complete_within_times_out() {
        let provider = ScriptedProvider::new(vec![Ok("late".into())])
            .with_delay(Duration::from_secs(60));
        let result = complete_within(
            &provider,
            vec![Message::user("hi")],
            0.1,
            64,
            Duration::from_secs(5),
        )
        .await;
        assert!(matches!(result, Err(LlmError::Timeout(d)) if d == Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn complete_within_passes_through() {
        let provider = ScriptedProvider::new(vec![Ok("ok".into())]);
        let result = complete_within(
            &provider,
            vec![Message::user("hi")],
            0.1,
            64,
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(result, "ok");
    }

    #[test]
    fn message_constructors() {
        let m = Message::system("rules");
        assert_eq!(m.role, Role::System);
        let m = Message::user("question");
        assert_eq!(m.role, Role::User);
        assert_eq!(m.content, "question");
    }
}
