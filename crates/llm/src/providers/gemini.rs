use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::provider::{LlmError, LlmProvider, Message, Role};
use crate::providers::send_json;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
        }
    }

    /// Build the request body for the Gemini generateContent API.
    fn build_request_body(messages: &[Message], temperature: f32, max_tokens: u32) -> Value {
        // System prompts go into a separate system_instruction field
        let system_text: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        let contents: Vec<Value> = messages
            .iter()
            .filter_map(|m| {
                let role = match m.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                    Role::System => return None,
                };
                Some(json!({ "role": role, "parts": [{ "text": m.content }] }))
            })
            .collect();

        let mut body = json!({
            "contents": contents,
            "generationConfig": {
                "temperature": temperature,
                "maxOutputTokens": max_tokens,
            },
        });

        if !system_text.is_empty() {
            body["system_instruction"] = json!({
                "parts": [{ "text": system_text.join("\n\n") }],
            });
        }

        body
    }

    /// Concatenate the text parts of the first candidate.
    ///
    /// A candidate with no text (safety block, empty stop) is a parse error
    /// carrying the finish reason so the caller's fallback log says why.
    fn parse_response(resp: &Value) -> Result<String, LlmError> {
        let candidate = &resp["candidates"][0];
        let text: String = candidate["content"]["parts"]
            .as_array()
            .map(|parts| parts.iter().filter_map(|p| p["text"].as_str()).collect())
            .unwrap_or_default();

        if text.is_empty() {
            let reason = candidate["finishReason"]
                .as_str()
                .or_else(|| resp["promptFeedback"]["blockReason"].as_str())
                .unwrap_or("no candidates");
            return Err(LlmError::ParseError(format!(
                "empty Gemini response (reason: {reason})"
            )));
        }

        Ok(text)
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn complete(
        &self,
        messages: Vec<Message>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let url = format!("{}/models/{}:generateContent", GEMINI_BASE_URL, self.model);
        let body = Self::build_request_body(&messages, temperature, max_tokens);

        debug!(model = %self.model, "Gemini request");

        let resp = send_json(
            self.client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(&body),
        )
        .await?;

        Self::parse_response(&resp)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_structure() {
        let messages = vec![
            Message::system("You are an incident response orchestrator."),
            Message::user("Any incidents?"),
            Message { role: Role::Assistant, content: "{}".into() },
            Message::user("Last 30 minutes only."),
        ];

        let body = GeminiProvider::build_request_body(&messages, 0.1, 2048);

        assert_eq!(
            body["system_instruction"]["parts"][0]["text"].as_str().unwrap(),
            "You are an incident response orchestrator.",
        );

        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["parts"][0]["text"], "Last 30 minutes only.");

        let temp = body["generationConfig"]["temperature"].as_f64().unwrap();
        assert!((temp - 0.1).abs() < 1e-6, "temperature should be ~0.1, got {temp}");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 2048);
    }

    #[test]
    fn test_request_body_without_system() {
        let body = GeminiProvider::build_request_body(&[Message::user("Hello")], 0.5, 256);
        assert!(body.get("system_instruction").is_none());
        assert_eq!(body["contents"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn parse_joins_text_parts() {
        let resp = json!({
            "candidates": [{
                "content": {
                    "parts": [{ "text": "CRITICAL: " }, { "text": "payment-service down" }]
                },
                "finishReason": "STOP"
            }]
        });
        assert_eq!(
            GeminiProvider::parse_response(&resp).unwrap(),
            "CRITICAL: payment-service down"
        );
    }

    #[test]
    fn parse_reports_block_reason() {
        let resp = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        match GeminiProvider::parse_response(&resp) {
            Err(LlmError::ParseError(msg)) => assert!(msg.contains("SAFETY")),
            other => panic!("expected ParseError, got {other:?}"),
        }
    }
}
