//! Routes notifications to configured channels.
//!
//! The dispatcher delivers a notification to every configured channel.
//! Individual channel failures don't block other channels and never
//! propagate to the caller.

use commander_agent::IncidentReport;
use commander_core::config::NotifyConfig;
use commander_core::Severity;

use crate::slack::SlackNotifier;
use crate::templating::TemplateRenderer;
use crate::traits::{DispatchResult, Notification, Notifier, NotifyError};
use crate::webhook::WebhookNotifier;

/// Dispatches notifications to a fixed set of channels.
pub struct Dispatcher {
    channels: Vec<Box<dyn Notifier>>,
    /// Notifications below this severity are dropped.
    min_severity: Severity,
}

impl Dispatcher {
    pub fn new(channels: Vec<Box<dyn Notifier>>, min_severity: Severity) -> Self {
        Self {
            channels,
            min_severity,
        }
    }

    /// Create an empty dispatcher.
    pub fn empty() -> Self {
        Self::new(Vec::new(), Severity::Info)
    }

    /// Build channels from the `notify` config section.
    pub fn from_config(config: &NotifyConfig) -> Result<Self, NotifyError> {
        let mut channels: Vec<Box<dyn Notifier>> = Vec::new();
        if let Some(url) = &config.slack_webhook_url {
            channels.push(Box::new(SlackNotifier::from_config(url.clone())?));
        }
        if let Some(url) = &config.webhook_url {
            channels.push(Box::new(WebhookNotifier::from_config(url, &config.webhook_headers)?));
        }
        Ok(Self::new(channels, config.min_severity))
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.channel_name()).collect()
    }

    /// Deliver to every channel in order.
    ///
    /// Returns one result per channel; empty when no channel is configured
    /// or the notification is below the minimum severity.
    pub async fn dispatch(&self, notification: &Notification) -> Vec<DispatchResult> {
        if self.channels.is_empty() {
            tracing::debug!("No notification channels configured");
            return Vec::new();
        }
        if notification.severity < self.min_severity {
            tracing::info!(
                severity = %notification.severity,
                min_severity = %self.min_severity,
                "Notification below minimum severity, not sent"
            );
            return Vec::new();
        }

        let mut results = Vec::with_capacity(self.channels.len());

        for channel in &self.channels {
            let start = std::time::Instant::now();
            let result = channel.send(notification).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            let (success, error) = match result {
                Ok(()) => {
                    tracing::info!(
                        channel = channel.channel_name(),
                        duration_ms,
                        "Notification delivered"
                    );
                    (true, None)
                }
                Err(e) => {
                    tracing::warn!(
                        channel = channel.channel_name(),
                        error = %e,
                        duration_ms,
                        "Notification delivery failed"
                    );
                    (false, Some(e.to_string()))
                }
            };

            results.push(DispatchResult {
                channel: channel.channel_name().to_string(),
                success,
                error,
                duration_ms,
            });
        }

        results
    }

    /// Render a report and deliver it. A render failure is logged and
    /// yields no results, so delivery never fails the caller.
    pub async fn dispatch_report(
        &self,
        renderer: &TemplateRenderer,
        report: &IncidentReport,
    ) -> Vec<DispatchResult> {
        match renderer.render_report(report) {
            Ok(notification) => self.dispatch(&notification).await,
            Err(e) => {
                tracing::warn!(report_id = %report.id, error = %e, "Failed to render notification");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commander_agent::ToolDecision;
    use indexmap::IndexMap;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockNotifier {
        name: String,
        send_count: Arc<AtomicUsize>,
        should_fail: bool,
    }

    #[async_trait::async_trait]
    impl Notifier for MockNotifier {
        async fn send(&self, _notification: &Notification) -> Result<(), NotifyError> {
            self.send_count.fetch_add(1, Ordering::SeqCst);
            if self.should_fail {
                Err(NotifyError::Rejected {
                    status: 500,
                    body: "mock failure".to_string(),
                })
            } else {
                Ok(())
            }
        }
        fn channel_name(&self) -> &str {
            &self.name
        }
    }

    fn mock(name: &str, count: &Arc<AtomicUsize>, should_fail: bool) -> Box<dyn Notifier> {
        Box::new(MockNotifier {
            name: name.to_string(),
            send_count: count.clone(),
            should_fail,
        })
    }

    fn notification(severity: Severity) -> Notification {
        Notification {
            subject: "test".to_string(),
            body: "test body".to_string(),
            severity,
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn dispatch_to_all_channels() {
        let count_a = Arc::new(AtomicUsize::new(0));
        let count_b = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::new(
            vec![mock("a", &count_a, false), mock("b", &count_b, false)],
            Severity::Info,
        );

        let results = dispatcher.dispatch(&notification(Severity::Info)).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.success));
        assert_eq!(count_a.load(Ordering::SeqCst), 1);
        assert_eq!(count_b.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn partial_failure_doesnt_block() {
        let count = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::new(
            vec![
                mock("fail", &Arc::new(AtomicUsize::new(0)), true),
                mock("ok", &count, false),
            ],
            Severity::Info,
        );

        let results = dispatcher.dispatch(&notification(Severity::Critical)).await;
        assert_eq!(results.len(), 2);
        assert!(!results[0].success);
        assert_eq!(
            results[0].error.as_deref(),
            Some("Channel rejected notification with 500: mock failure")
        );
        assert!(results[1].success);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn below_min_severity_is_skipped() {
        let count = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::new(vec![mock("a", &count, false)], Severity::Warning);

        assert!(dispatcher.dispatch(&notification(Severity::Info)).await.is_empty());
        assert_eq!(dispatcher.dispatch(&notification(Severity::Warning)).await.len(), 1);
        assert_eq!(dispatcher.dispatch(&notification(Severity::Critical)).await.len(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_dispatcher_returns_empty() {
        let dispatcher = Dispatcher::empty();
        assert!(dispatcher.is_empty());
        assert!(dispatcher.dispatch(&notification(Severity::Critical)).await.is_empty());
    }

    #[tokio::test]
    async fn report_delivery_failures_are_results_not_errors() {
        let count = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::new(
            vec![mock("down", &count, true), mock("up", &count, false)],
            Severity::Info,
        );
        let report = IncidentReport::new(
            "is checkout down?",
            ToolDecision::fallback(),
            IndexMap::new(),
            "CRITICAL: checkout gateway is down".into(),
        );

        let results = dispatcher.dispatch_report(&TemplateRenderer::new(), &report).await;
        assert_eq!(results.len(), 2);
        assert!(!results[0].success);
        assert!(results[1].success);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn from_config_builds_channels() {
        let config = NotifyConfig {
            slack_webhook_url: Some("https://hooks.slack.test/T/B/x".into()),
            webhook_url: Some("https://alerts.test/hook".into()),
            webhook_headers: vec![("X-Source".into(), "commander".into())],
            min_severity: Severity::Warning,
        };
        let dispatcher = Dispatcher::from_config(&config).unwrap();
        assert_eq!(dispatcher.channel_names(), vec!["slack", "webhook"]);

        let none = NotifyConfig {
            slack_webhook_url: None,
            webhook_url: None,
            webhook_headers: Vec::new(),
            min_severity: Severity::Info,
        };
        assert!(Dispatcher::from_config(&none).unwrap().is_empty());
    }

    #[test]
    fn from_config_surfaces_unresolved_header_secret() {
        let config = NotifyConfig {
            slack_webhook_url: None,
            webhook_url: Some("https://alerts.test/hook".into()),
            webhook_headers: vec![("Authorization".into(), "${CMD_DISPATCH_NOT_SET_24680}".into())],
            min_severity: Severity::Info,
        };
        match Dispatcher::from_config(&config) {
            Err(NotifyError::Config(msg)) => assert!(msg.contains("CMD_DISPATCH_NOT_SET_24680")),
            Err(other) => panic!("expected Config error, got: {other:?}"),
            Ok(_) => panic!("expected Config error, got a dispatcher"),
        }
    }
}
