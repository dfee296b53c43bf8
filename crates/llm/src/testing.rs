//! Deterministic provider stand-in for tests.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::provider::{LlmError, LlmProvider, Message};

/// Replays a fixed script of responses and records every prompt it receives.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    prompts: Mutex<Vec<Vec<Message>>>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<Result<String, LlmError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Sleep before answering (pair with a paused tokio clock).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every message list received so far, in call order.
    pub fn prompts(&self) -> Vec<Vec<Message>> {
        lock(&self.prompts).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.prompts).len()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(
        &self,
        messages: Vec<Message>,
        _temperature: f32,
        _max_tokens: u32,
    ) -> Result<String, LlmError> {
        lock(&self.prompts).push(messages);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        lock(&self.responses)
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::NotConfigured("script exhausted".into())))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
