use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CatalogError;

/// The fixed set of analytical operations the catalog can compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalyticalOperation {
    ErrorSpike,
    MetricAnomaly,
    EnrichedAnalysis,
    IngestionTrend,
    RunbookSearch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    TimeWindow,
    Integer,
    Text,
}

impl ParamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::TimeWindow => "time_window",
            ParamKind::Integer => "integer",
            ParamKind::Text => "string",
        }
    }
}

/// One named parameter of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub default: Option<&'static str>,
    pub description: &'static str,
}

pub const TIME_WINDOW: &str = "time_window";
pub const THRESHOLD: &str = "threshold";
pub const SEARCH_TERM: &str = "search_term";

pub const DEFAULT_THRESHOLD: u64 = 10;

const WINDOW_PARAM: ParamSpec = ParamSpec {
    name: TIME_WINDOW,
    kind: ParamKind::TimeWindow,
    default: Some("1h"),
    description: "lookback window: 15m, 30m, 1h, 6h, 12h, 24h or 7d",
};

const ERROR_SPIKE_PARAMS: &[ParamSpec] = &[
    WINDOW_PARAM,
    ParamSpec {
        name: THRESHOLD,
        kind: ParamKind::Integer,
        default: Some("10"),
        description: "minimum error count per service and error code",
    },
];

const WINDOW_ONLY_PARAMS: &[ParamSpec] = &[WINDOW_PARAM];

const RUNBOOK_PARAMS: &[ParamSpec] = &[ParamSpec {
    name: SEARCH_TERM,
    kind: ParamKind::Text,
    default: None,
    description: "error text or symptom to look up",
}];

impl AnalyticalOperation {
    pub const ALL: [AnalyticalOperation; 5] = [
        AnalyticalOperation::ErrorSpike,
        AnalyticalOperation::MetricAnomaly,
        AnalyticalOperation::EnrichedAnalysis,
        AnalyticalOperation::IngestionTrend,
        AnalyticalOperation::RunbookSearch,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AnalyticalOperation::ErrorSpike => "error-spike",
            AnalyticalOperation::MetricAnomaly => "metric-anomaly",
            AnalyticalOperation::EnrichedAnalysis => "enriched-analysis",
            AnalyticalOperation::IngestionTrend => "ingestion-trend",
            AnalyticalOperation::RunbookSearch => "runbook-search",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            AnalyticalOperation::ErrorSpike => {
                "count ERROR and CRITICAL events per service and error code, \
                 keep groups above the threshold"
            }
            AnalyticalOperation::MetricAnomaly => {
                "find services whose cpu, memory, latency or error-rate metrics \
                 exceeded their ceilings"
            }
            AnalyticalOperation::EnrichedAnalysis => {
                "analyze CRITICAL events with owning team, on-call channel and criticality attached"
            }
            AnalyticalOperation::IngestionTrend => {
                "compare event volume of the last 24 hours with the 24 hours before"
            }
            AnalyticalOperation::RunbookSearch => "search runbooks for a known fix",
        }
    }

    pub fn params(&self) -> &'static [ParamSpec] {
        match self {
            AnalyticalOperation::ErrorSpike => ERROR_SPIKE_PARAMS,
            AnalyticalOperation::MetricAnomaly | AnalyticalOperation::EnrichedAnalysis => {
                WINDOW_ONLY_PARAMS
            }
            AnalyticalOperation::IngestionTrend => &[],
            AnalyticalOperation::RunbookSearch => RUNBOOK_PARAMS,
        }
    }

    /// Whether result rows are joined against the service inventory.
    pub fn needs_enrichment(&self) -> bool {
        matches!(self, AnalyticalOperation::EnrichedAnalysis)
    }

    /// Resolve a canonical name, a legacy tool alias, or an underscore/case
    /// variant of either.
    pub fn from_name(raw: &str) -> Option<Self> {
        let name = raw.trim().to_lowercase().replace(['_', ' '], "-");
        let op = match name.as_str() {
            "error-spike" | "detect-errors" | "error-spikes" => AnalyticalOperation::ErrorSpike,
            "metric-anomaly" | "detect-metrics" | "metric-anomalies" => {
                AnalyticalOperation::MetricAnomaly
            }
            "enriched-analysis" | "analyze-incident" => AnalyticalOperation::EnrichedAnalysis,
            "ingestion-trend" | "ingestion-trends" => AnalyticalOperation::IngestionTrend,
            "runbook-search" | "search-runbook" | "search-runbooks" => {
                AnalyticalOperation::RunbookSearch
            }
            _ => return None,
        };
        Some(op)
    }
}

impl fmt::Display for AnalyticalOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AnalyticalOperation {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| CatalogError::UnknownOperation(s.to_string()))
    }
}

impl Serialize for AnalyticalOperation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for AnalyticalOperation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// An operation name as emitted by the resolver. Names outside the catalog
/// are kept verbatim so the caller can log and skip them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ToolChoice {
    Known(AnalyticalOperation),
    Unrecognized(String),
}

impl ToolChoice {
    pub fn parse(raw: &str) -> Self {
        match AnalyticalOperation::from_name(raw) {
            Some(op) => ToolChoice::Known(op),
            None => ToolChoice::Unrecognized(raw.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ToolChoice::Known(op) => op.name(),
            ToolChoice::Unrecognized(raw) => raw,
        }
    }

    pub fn known(&self) -> Option<AnalyticalOperation> {
        match self {
            ToolChoice::Known(op) => Some(*op),
            ToolChoice::Unrecognized(_) => None,
        }
    }
}

impl From<AnalyticalOperation> for ToolChoice {
    fn from(op: AnalyticalOperation) -> Self {
        ToolChoice::Known(op)
    }
}

impl Serialize for ToolChoice {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for ToolChoice {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(ToolChoice::parse(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_names_resolve() {
        for op in AnalyticalOperation::ALL {
            assert_eq!(AnalyticalOperation::from_name(op.name()), Some(op));
        }
    }

    #[test]
    fn legacy_aliases_and_variants() {
        use AnalyticalOperation::*;
        assert_eq!(AnalyticalOperation::from_name("detect_errors"), Some(ErrorSpike));
        assert_eq!(AnalyticalOperation::from_name("detect_metrics"), Some(MetricAnomaly));
        assert_eq!(AnalyticalOperation::from_name("analyze_incident"), Some(EnrichedAnalysis));
        assert_eq!(AnalyticalOperation::from_name("search_runbook"), Some(RunbookSearch));
        assert_eq!(AnalyticalOperation::from_name("INGESTION_TREND"), Some(IngestionTrend));
        assert_eq!(AnalyticalOperation::from_name(" Error Spike "), Some(ErrorSpike));
        assert_eq!(AnalyticalOperation::from_name("delete_index"), None);
        assert!(matches!(
            "reboot".parse::<AnalyticalOperation>(),
            Err(CatalogError::UnknownOperation(name)) if name == "reboot"
        ));
    }

    #[test]
    fn tool_choice_keeps_unknown_names() {
        let choices: Vec<ToolChoice> =
            serde_json::from_value(json!(["detect_errors", "launch_missiles"])).unwrap();
        assert_eq!(choices[0], ToolChoice::Known(AnalyticalOperation::ErrorSpike));
        assert_eq!(choices[1], ToolChoice::Unrecognized("launch_missiles".into()));
        assert_eq!(choices[1].known(), None);
        assert_eq!(
            serde_json::to_value(&choices).unwrap(),
            json!(["error-spike", "launch_missiles"])
        );
    }

    #[test]
    fn param_schemas() {
        let names: Vec<&str> =
            AnalyticalOperation::ErrorSpike.params().iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["time_window", "threshold"]);
        assert!(AnalyticalOperation::IngestionTrend.params().is_empty());
        assert_eq!(AnalyticalOperation::RunbookSearch.params()[0].default, None);
        assert!(AnalyticalOperation::EnrichedAnalysis.needs_enrichment());
        assert!(!AnalyticalOperation::ErrorSpike.needs_enrichment());
    }
}
