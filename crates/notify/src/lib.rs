//! Delivery boundary for incident reports.
//!
//! This crate provides:
//! - `Notifier` trait for pluggable delivery channels
//! - Slack incoming-webhook and generic JSON webhook notifiers
//! - Minijinja rendering of reports into notifications
//! - Dispatcher that fans a notification out to every configured channel

pub mod dispatcher;
pub mod slack;
pub mod templating;
pub mod traits;
pub mod webhook;

pub use dispatcher::Dispatcher;
pub use slack::SlackNotifier;
pub use templating::{TemplateContext, TemplateRenderer};
pub use traits::{DispatchResult, Notification, Notifier, NotifyError};
pub use webhook::WebhookNotifier;
