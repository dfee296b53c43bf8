use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::provider::{LlmError, LlmProvider, Message, Role};
use crate::providers::send_json;

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";

pub struct ClaudeProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl ClaudeProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
        }
    }

    fn build_request_body(&self, messages: &[Message], temperature: f32, max_tokens: u32) -> Value {
        // Messages API takes the system prompt as a top-level field
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        let api_messages: Vec<Value> = messages
            .iter()
            .filter_map(|m| {
                let role = match m.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::System => return None,
                };
                Some(json!({ "role": role, "content": m.content }))
            })
            .collect();

        let mut body = json!({
            "model": self.model,
            "messages": api_messages,
            "temperature": temperature,
            "max_tokens": max_tokens,
        });

        if !system.is_empty() {
            body["system"] = json!(system.join("\n\n"));
        }

        body
    }

    fn parse_response(resp: &Value) -> Result<String, LlmError> {
        let text: String = resp["content"]
            .as_array()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b["type"] == "text")
                    .filter_map(|b| b["text"].as_str())
                    .collect()
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(LlmError::ParseError("missing text content block".into()));
        }
        Ok(text)
    }
}

#[async_trait]
impl LlmProvider for ClaudeProvider {
    async fn complete(
        &self,
        messages: Vec<Message>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let body = self.build_request_body(&messages, temperature, max_tokens);

        debug!(model = %self.model, "Claude request");

        let resp = send_json(
            self.client
                .post(MESSAGES_URL)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01")
                .json(&body),
        )
        .await?;

        Self::parse_response(&resp)
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}
