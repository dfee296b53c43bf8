use std::time::Duration;

use commander_store::query::TIMESTAMP_FIELD;
use commander_store::{
    AggFn, AggregateQuery, Condition, Predicate, Query, SearchQuery, Sort, TimeRange, WeightedField,
};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::catalog::CatalogConfig;
use crate::error::CatalogError;
use crate::operation::{AnalyticalOperation, DEFAULT_THRESHOLD, SEARCH_TERM, THRESHOLD, TIME_WINDOW};
use crate::window::TimeWindow;

/// Untyped per-operation parameters, as produced by the resolver.
pub type Params = Map<String, Value>;

/// Period labels of the two ingestion-trend queries per source.
pub const LAST_24H: &str = "last_24h";
pub const PREVIOUS_24H: &str = "previous_24h";

const ERROR_SPIKE_LIMIT: usize = 20;
const ENRICHED_MIN_COUNT: f64 = 5.0;
const ENRICHED_LIMIT: usize = 10;
const RUNBOOK_RESULTS: usize = 3;

/// Per-metric ceilings for metric-anomaly.
const METRIC_CEILINGS: &[(&str, f64)] = &[
    ("cpu_usage", 85.0),
    ("memory_usage", 85.0),
    ("request_latency", 2000.0),
    ("error_rate", 5.0),
];

/// Columns copied out of runbook documents.
pub const RUNBOOK_FIELDS: &[&str] = &["title", "error_pattern", "solution", "commands", "service"];

/// A store query tagged with the source it reads and what it measures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelledQuery {
    pub label: String,
    pub source: String,
    pub query: Query,
}

/// Everything needed to execute one operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationPlan {
    pub operation: AnalyticalOperation,
    pub queries: Vec<LabelledQuery>,
}

impl OperationPlan {
    fn single(operation: AnalyticalOperation, query: Query) -> Self {
        Self {
            operation,
            queries: vec![LabelledQuery {
                label: operation.name().to_string(),
                source: query.source().to_string(),
                query,
            }],
        }
    }
}

/// Compile an operation and its parameters into store queries.
///
/// Pure: no clock is read, time filters are relative to the store's `NOW()`.
pub fn compile(
    config: &CatalogConfig,
    operation: AnalyticalOperation,
    params: &Params,
) -> Result<OperationPlan, CatalogError> {
    let plan = match operation {
        AnalyticalOperation::ErrorSpike => {
            let window = TimeWindow::from_param(params.get(TIME_WINDOW));
            let threshold = threshold_param(params.get(THRESHOLD));
            OperationPlan::single(operation, error_spike(config, window, threshold))
        }
        AnalyticalOperation::MetricAnomaly => {
            let window = TimeWindow::from_param(params.get(TIME_WINDOW));
            OperationPlan::single(operation, metric_anomaly(config, window))
        }
        AnalyticalOperation::EnrichedAnalysis => {
            let window = TimeWindow::from_param(params.get(TIME_WINDOW));
            OperationPlan::single(operation, enriched_analysis(config, window))
        }
        AnalyticalOperation::IngestionTrend => ingestion_trend(config),
        AnalyticalOperation::RunbookSearch => {
            let term = params
                .get(SEARCH_TERM)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .ok_or(CatalogError::MissingParameter {
                    operation: operation.name(),
                    parameter: SEARCH_TERM,
                })?;
            OperationPlan::single(operation, runbook_search(config, term))
        }
    };
    Ok(plan)
}

/// Accepts JSON integers, non-negative whole floats and numeric strings.
/// Anything else falls back to the default threshold.
pub fn threshold_param(value: Option<&Value>) -> u64 {
    let parsed = match value {
        None | Some(Value::Null) => return DEFAULT_THRESHOLD,
        Some(Value::Number(n)) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        }),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        Some(_) => None,
    };
    parsed.unwrap_or_else(|| {
        warn!(threshold = ?value, fallback = DEFAULT_THRESHOLD, "invalid threshold");
        DEFAULT_THRESHOLD
    })
}

fn error_spike(config: &CatalogConfig, window: TimeWindow, threshold: u64) -> Query {
    Query::Aggregate(
        AggregateQuery::new(&config.logs_index, TimeRange::last(window.duration()))
            .filter(Predicate::In {
                field: "severity".into(),
                values: vec!["ERROR".into(), "CRITICAL".into()],
            })
            .aggregate("error_count", AggFn::Count)
            .group_by(["service_name", "error_code"])
            .having(Condition::gt("error_count", threshold as f64))
            .sort(Sort::desc("error_count"))
            .limit(ERROR_SPIKE_LIMIT),
    )
}

fn metric_anomaly(config: &CatalogConfig, window: TimeWindow) -> Query {
    let ceilings = METRIC_CEILINGS
        .iter()
        .map(|(metric, ceiling)| Condition::And {
            all: vec![Condition::eq("metric_name", *metric), Condition::gt("max_value", *ceiling)],
        })
        .collect();

    Query::Aggregate(
        AggregateQuery::new(&config.metrics_index, TimeRange::last(window.duration()))
            .aggregate("avg_value", AggFn::Avg("value".into()))
            .aggregate("max_value", AggFn::Max("value".into()))
            .aggregate("count", AggFn::Count)
            .group_by(["service_name", "metric_name"])
            .having(Condition::Or { any: ceilings })
            .sort(Sort::desc("max_value")),
    )
}

fn enriched_analysis(config: &CatalogConfig, window: TimeWindow) -> Query {
    Query::Aggregate(
        AggregateQuery::new(&config.logs_index, TimeRange::last(window.duration()))
            .filter(Predicate::Eq { field: "severity".into(), value: "CRITICAL".into() })
            .aggregate("error_count", AggFn::Count)
            .aggregate("first_seen", AggFn::Min(TIMESTAMP_FIELD.into()))
            .aggregate("last_seen", AggFn::Max(TIMESTAMP_FIELD.into()))
            .aggregate("affected_hosts", AggFn::CountDistinct("host".into()))
            .group_by(["service_name", "error_code"])
            .having(Condition::gt("error_count", ENRICHED_MIN_COUNT))
            .sort(Sort::desc("error_count"))
            .limit(ENRICHED_LIMIT),
    )
}

fn ingestion_trend(config: &CatalogConfig) -> OperationPlan {
    let day = Duration::from_secs(24 * 3_600);
    let queries = config
        .tracked_sources
        .iter()
        .flat_map(|source| {
            [
                (LAST_24H, TimeRange::last(day)),
                (PREVIOUS_24H, TimeRange::between(day * 2, day)),
            ]
            .map(|(label, range)| LabelledQuery {
                label: label.to_string(),
                source: source.clone(),
                query: Query::Aggregate(
                    AggregateQuery::new(source, range).aggregate("count", AggFn::Count),
                ),
            })
        })
        .collect();

    OperationPlan { operation: AnalyticalOperation::IngestionTrend, queries }
}

fn runbook_search(config: &CatalogConfig, term: &str) -> Query {
    Query::Search(SearchQuery {
        index: config.runbooks_index.clone(),
        term: term.to_string(),
        fields: vec![
            WeightedField::new("error_pattern", 3.0),
            WeightedField::new("title", 2.0),
            WeightedField::new("solution", 1.0),
            WeightedField::new("service", 1.0),
        ],
        size: RUNBOOK_RESULTS,
        source_fields: RUNBOOK_FIELDS.iter().map(|f| f.to_string()).collect(),
    })
}
