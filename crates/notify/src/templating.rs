//! Minijinja template rendering for notification messages.
//!
//! Renders an [`IncidentReport`] into a [`Notification`] using a subject
//! and a body template. The defaults are Slack-flavoured mrkdwn.
//!
//! A fresh [`minijinja::Environment`] is created per render call.

use std::collections::HashMap;

use commander_agent::IncidentReport;
use serde::Serialize;

use crate::traits::{Notification, NotifyError};

/// Default subject line.
pub const DEFAULT_SUBJECT: &str = "{{ emoji }} {{ severity }}: {{ query }}";

/// Default body: severity, the question, the operations run, the summary.
pub const DEFAULT_BODY: &str = concat!(
    "{{ emoji }} *{{ severity }}* incident report\n",
    "*Query:* {{ query }}\n",
    "*Operations:* ",
    "{% for op in operations %}`{{ op.name }}`{% if not op.success %} (failed){% endif %}",
    "{% if not loop.last %}, {% endif %}{% else %}none{% endfor %}\n",
    "\n",
    "{{ summary }}"
);

/// Context data available to notification templates.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateContext {
    pub report_id: String,
    /// Report creation time in RFC 3339.
    pub created_at: String,
    pub query: String,
    /// `CRITICAL`, `WARNING` or `INFO`.
    pub severity: String,
    pub emoji: String,
    pub summary: String,
    pub rationale: String,
    /// Operations in the order they were run.
    pub operations: Vec<OperationContext>,
}

/// One executed operation as seen by templates.
#[derive(Debug, Clone, Serialize)]
pub struct OperationContext {
    pub name: String,
    pub success: bool,
    pub rows: usize,
    pub error: Option<String>,
}

impl TemplateContext {
    pub fn from_report(report: &IncidentReport) -> Self {
        Self {
            report_id: report.id.to_string(),
            created_at: report.created_at.to_rfc3339(),
            query: report.query.clone(),
            severity: report.severity.as_str().to_string(),
            emoji: report.severity.emoji().to_string(),
            summary: report.summary.clone(),
            rationale: report.decision.rationale.clone(),
            operations: report
                .results
                .iter()
                .map(|(name, result)| OperationContext {
                    name: name.clone(),
                    success: result.success,
                    rows: result.row_count(),
                    error: result.error.clone(),
                })
                .collect(),
        }
    }
}

/// Renders reports with the default subject and body templates.
#[derive(Debug, Clone, Default)]
pub struct TemplateRenderer;

impl TemplateRenderer {
    pub fn new() -> Self {
        Self
    }

    fn render<S: Serialize>(&self, template_str: &str, ctx: &S) -> Result<String, NotifyError> {
        minijinja::Environment::new()
            .render_str(template_str, ctx)
            .map_err(|e| NotifyError::Template(e.to_string()))
    }

    /// Render a report into a deliverable notification.
    pub fn render_report(&self, report: &IncidentReport) -> Result<Notification, NotifyError> {
        let ctx = TemplateContext::from_report(report);
        let subject = self.render(DEFAULT_SUBJECT, &ctx)?;
        let body = self.render(DEFAULT_BODY, &ctx)?;

        let metadata = HashMap::from([
            ("report_id".to_string(), ctx.report_id.clone()),
            ("query".to_string(), ctx.query.clone()),
            ("operations".to_string(), report.operations_run().join(",")),
            ("failed_operations".to_string(), report.failed_operations().join(",")),
        ]);

        Ok(Notification { subject, body, severity: report.severity, metadata })
    }
}
