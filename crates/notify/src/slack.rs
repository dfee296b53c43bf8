//! Slack incoming-webhook notifier with Block Kit formatting.

use serde_json::{json, Value};

use crate::traits::{Notification, Notifier, NotifyError};
use crate::webhook::resolve_env_vars;

/// Slack caps header blocks at 150 characters.
const HEADER_LIMIT: usize = 150;
/// Slack caps section text at 3000 characters.
const SECTION_LIMIT: usize = 3000;

/// Sends notifications to a Slack incoming webhook.
#[derive(Debug)]
pub struct SlackNotifier {
    webhook_url: String,
    client: reqwest::Client,
}

impl SlackNotifier {
    /// `${VAR}` references in the URL are resolved from the environment.
    /// Returns [`NotifyError::Config`] if the URL is empty or a variable is missing.
    pub fn from_config(webhook_url: String) -> Result<Self, NotifyError> {
        let resolved = resolve_env_vars(&webhook_url)?;
        if resolved.trim().is_empty() {
            return Err(NotifyError::Config(
                "Slack webhook URL must not be empty".to_string(),
            ));
        }
        Ok(Self {
            webhook_url: resolved,
            client: reqwest::Client::new(),
        })
    }
}

/// Build the Block Kit payload: header, mrkdwn body, context line.
pub fn block_kit_payload(notification: &Notification) -> Value {
    let mut context = format!("severity: *{}*", notification.severity);
    if let Some(id) = notification.metadata.get("report_id") {
        context.push_str(&format!(" | report `{id}`"));
    }

    json!({
        "text": notification.subject,
        "blocks": [
            {
                "type": "header",
                "text": {
                    "type": "plain_text",
                    "text": truncate(&notification.subject, HEADER_LIMIT),
                    "emoji": true
                }
            },
            {
                "type": "section",
                "text": { "type": "mrkdwn", "text": truncate(&notification.body, SECTION_LIMIT) }
            },
            {
                "type": "context",
                "elements": [{ "type": "mrkdwn", "text": context }]
            }
        ]
    })
}

/// Cut `text` to at most `limit` characters, marking the cut with `…`.
fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(limit.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

#[async_trait::async_trait]
impl Notifier for SlackNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::debug!(severity = %notification.severity, "Sending Slack notification");

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&block_kit_payload(notification))
            .send()
            .await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(30);
            return Err(NotifyError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!("Slack notification sent");
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "slack"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commander_core::Severity;
    use std::collections::HashMap;

    fn notification(body: &str) -> Notification {
        Notification {
            subject: "🟡 WARNING: latency?".into(),
            body: body.into(),
            severity: Severity::Warning,
            metadata: HashMap::from([("report_id".to_string(), "abc".to_string())]),
        }
    }

    #[test]
    fn payload_has_header_section_and_context() {
        let payload = block_kit_payload(&notification("*Query:* latency?"));
        assert_eq!(payload["text"], "🟡 WARNING: latency?");
        assert_eq!(payload["blocks"][0]["type"], "header");
        assert_eq!(payload["blocks"][0]["text"]["text"], "🟡 WARNING: latency?");
        assert_eq!(payload["blocks"][1]["text"]["type"], "mrkdwn");
        assert_eq!(payload["blocks"][1]["text"]["text"], "*Query:* latency?");
        assert_eq!(
            payload["blocks"][2]["elements"][0]["text"],
            "severity: *WARNING* | report `abc`"
        );
    }

    #[test]
    fn long_body_is_truncated() {
        let long = "x".repeat(SECTION_LIMIT + 500);
        let payload = block_kit_payload(&notification(&long));
        let text = payload["blocks"][1]["text"]["text"].as_str().unwrap();
        assert_eq!(text.chars().count(), SECTION_LIMIT);
        assert!(text.ends_with('…'));
    }

    #[test]
    fn env_url_resolution() {
        std::env::set_var("CMD_TEST_SLACK_HOOK", "https://hooks.slack.test/T000/B000/xyz");
        let notifier = SlackNotifier::from_config("${CMD_TEST_SLACK_HOOK}".into()).unwrap();
        assert_eq!(notifier.webhook_url, "https://hooks.slack.test/T000/B000/xyz");
        assert_eq!(notifier.channel_name(), "slack");
        std::env::remove_var("CMD_TEST_SLACK_HOOK");
    }

    #[test]
    fn empty_url_rejected() {
        let err = SlackNotifier::from_config("  ".into()).unwrap_err();
        assert!(err.to_string().contains("must not be empty"));
    }
}
