//! Generic HTTP webhook notifier.
//!
//! POSTs the rendered notification as JSON to `ALERT_WEBHOOK_URL`, with any
//! headers listed in `ALERT_WEBHOOK_HEADERS`.

use crate::traits::{Notification, Notifier, NotifyError};

/// Delivers notifications as a JSON document over HTTP.
///
/// `${VAR_NAME}` references in the URL and header values are resolved when
/// the notifier is built, so a missing secret fails at startup rather than
/// on the first incident.
#[derive(Debug)]
pub struct WebhookNotifier {
    url: String,
    headers: Vec<(String, String)>,
    client: reqwest::Client,
}

impl WebhookNotifier {
    /// Missing env vars produce [`NotifyError::Config`].
    pub fn from_config(url: &str, headers: &[(String, String)]) -> Result<Self, NotifyError> {
        let url = resolve_env_vars(url)?;
        if url.trim().is_empty() {
            return Err(NotifyError::Config("webhook URL is empty".into()));
        }
        let headers = headers
            .iter()
            .map(|(name, value)| Ok((name.clone(), resolve_env_vars(value)?)))
            .collect::<Result<Vec<_>, NotifyError>>()?;

        Ok(Self { url, headers, client: reqwest::Client::new() })
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let request = self
            .headers
            .iter()
            .fold(self.client.post(&self.url).json(notification), |req, (name, value)| {
                req.header(name.as_str(), value.as_str())
            });

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "<unreadable body>".to_string());
            tracing::warn!(
                url = %self.url,
                %status,
                body = %body,
                "webhook returned non-2xx status"
            );
            return Err(NotifyError::Rejected { status: status.as_u16(), body });
        }

        tracing::debug!(url = %self.url, %status, "webhook notification delivered");
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "webhook"
    }
}

/// Substitute `${VAR_NAME}` references from the process environment.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, NotifyError> {
    let mut resolved = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(open) = rest.find("${") {
        resolved.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let close = after.find('}').ok_or_else(|| {
            NotifyError::Config(format!("unclosed env var reference in: {input}"))
        })?;
        let name = &after[..close];
        let value = std::env::var(name)
            .map_err(|_| NotifyError::Config(format!("env var not found: {name}")))?;
        resolved.push_str(&value);
        rest = &after[close + 1..];
    }
    resolved.push_str(rest);

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_env_vars_multiple() {
        std::env::set_var("CMD_WT_PROTO", "https");
        std::env::set_var("CMD_WT_HOST", "alerts.test");
        let result = resolve_env_vars("${CMD_WT_PROTO}://${CMD_WT_HOST}/v1").unwrap();
        assert_eq!(result, "https://alerts.test/v1");
        std::env::remove_var("CMD_WT_PROTO");
        std::env::remove_var("CMD_WT_HOST");
    }

    #[test]
    fn resolve_env_vars_missing() {
        match resolve_env_vars("https://${CMD_ABSOLUTELY_NOT_SET_12345}/hook") {
            Err(NotifyError::Config(msg)) => assert!(msg.contains("CMD_ABSOLUTELY_NOT_SET_12345")),
            other => panic!("expected Config error, got: {other:?}"),
        }
    }

    #[test]
    fn resolve_env_vars_unclosed() {
        match resolve_env_vars("https://${UNCLOSED/hook") {
            Err(NotifyError::Config(msg)) => assert!(msg.contains("unclosed")),
            other => panic!("expected Config error, got: {other:?}"),
        }
    }

    #[test]
    fn resolve_env_vars_leaves_plain_dollars() {
        let result = resolve_env_vars("https://plain.example.com/$hook").unwrap();
        assert_eq!(result, "https://plain.example.com/$hook");
    }

    #[test]
    fn from_config_resolves_headers() {
        std::env::set_var("CMD_WT_API_KEY", "secret-key-123");
        let headers = vec![
            ("X-Api-Key".to_string(), "${CMD_WT_API_KEY}".to_string()),
            ("X-Static".to_string(), "fixed-value".to_string()),
        ];
        let notifier = WebhookNotifier::from_config("https://example.com", &headers).unwrap();
        assert_eq!(
            notifier.headers,
            vec![
                ("X-Api-Key".to_string(), "secret-key-123".to_string()),
                ("X-Static".to_string(), "fixed-value".to_string()),
            ]
        );
        std::env::remove_var("CMD_WT_API_KEY");
    }

    #[test]
    fn from_config_rejects_missing_header_secret() {
        let headers = vec![("X-Api-Key".to_string(), "${CMD_WT_NOT_SET_67890}".to_string())];
        match WebhookNotifier::from_config("https://example.com", &headers) {
            Err(NotifyError::Config(msg)) => assert!(msg.contains("CMD_WT_NOT_SET_67890")),
            other => panic!("expected Config error, got: {other:?}"),
        }
    }

    #[test]
    fn from_config_rejects_empty_url() {
        std::env::set_var("CMD_WT_EMPTY", "");
        let result = WebhookNotifier::from_config("${CMD_WT_EMPTY}", &[]);
        assert!(matches!(result, Err(NotifyError::Config(_))));
        std::env::remove_var("CMD_WT_EMPTY");
    }
}
