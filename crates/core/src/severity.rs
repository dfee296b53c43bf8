use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Severity tag attached to an incident report.
///
/// Derived from the generated summary text, not from a structured field:
/// the summarizer is asked to mark its findings and we scan for the marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    /// Classify a summary by literal keyword presence.
    ///
    /// `CRITICAL` anywhere wins over `WARNING` anywhere; neither means `Info`.
    /// The scan is case-sensitive.
    pub fn from_summary(summary: &str) -> Self {
        if summary.contains("CRITICAL") {
            Severity::Critical
        } else if summary.contains("WARNING") {
            Severity::Warning
        } else {
            Severity::Info
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        }
    }

    /// Status emoji used by chat-style renderers.
    pub fn emoji(&self) -> &'static str {
        match self {
            Severity::Info => "🟢",
            Severity::Warning => "🟡",
            Severity::Critical => "🔴",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown severity: '{0}'")]
pub struct ParseSeverityError(String);

impl FromStr for Severity {
    type Err = ParseSeverityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" | "warn" => Ok(Severity::Warning),
            "critical" | "crit" => Ok(Severity::Critical),
            _ => Err(ParseSeverityError(s.to_string())),
        }
    }
}
