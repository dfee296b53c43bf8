use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::provider::{LlmError, LlmProvider, Message, Role};
use crate::providers::send_json;

/// Local models served by Ollama's `/api/chat`.
pub struct OllamaProvider {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl OllamaProvider {
    pub fn new(url: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.trim_end_matches('/').to_string(),
            model,
        }
    }

    fn build_request_body(&self, messages: &[Message], temperature: f32, max_tokens: u32) -> Value {
        let api_messages: Vec<Value> = messages
            .iter()
            .map(|m| {
                json!({
                    "role": match m.role {
                        Role::System => "system",
                        Role::User => "user",
                        Role::Assistant => "assistant",
                    },
                    "content": m.content,
                })
            })
            .collect();

        json!({
            "model": self.model,
            "messages": api_messages,
            "stream": false,
            "options": {
                "temperature": temperature,
                "num_predict": max_tokens,
            },
        })
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn complete(
        &self,
        messages: Vec<Message>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let url = format!("{}/api/chat", self.url);
        let body = self.build_request_body(&messages, temperature, max_tokens);

        debug!(%url, model = %self.model, "Ollama request");

        let resp = send_json(self.client.post(&url).json(&body)).await?;
        resp["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LlmError::ParseError("missing message.content".into()))
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_budget_maps_to_num_predict() {
        let provider = OllamaProvider::new("http://localhost:11434/".into(), "llama3.2".into());
        let body = provider.build_request_body(&[Message::user("hi")], 0.1, 300);
        assert_eq!(body["options"]["num_predict"], 300);
        assert_eq!(body["stream"], false);
        assert_eq!(provider.url, "http://localhost:11434");
    }
}
