//! Request pipeline: resolve → execute operations → summarize.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use commander_catalog::operation::SEARCH_TERM;
use commander_catalog::plan::{LAST_24H, PREVIOUS_24H};
use commander_catalog::{AnalyticalOperation, Catalog, OperationPlan, Params, ToolChoice};
use commander_llm::{complete_within, LlmProvider, Message};
use commander_store::{Column, EventStore, QueryResult, ReferenceStore, StoreError};
use futures::future::join_all;
use indexmap::IndexMap;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::enrichment::EnrichmentJoiner;
use crate::report::{IncidentReport, OperationResult};
use crate::resolver::{IntentResolver, ModelSettings, ToolDecision};

/// Column joined against the reference dataset.
const ENTITY_COLUMN: &str = "service_name";

const SUMMARY_INSTRUCTIONS: &str =
    "You are an incident commander writing a short report for on-call engineers.
Summarize the tool results below clearly and concisely:
- state the relevant counts (services, errors, anomalies)
- mark the overall severity with exactly one of CRITICAL, WARNING or INFO
- end with the single most useful next action";

/// Ingestion-trend output columns.
const TREND_COLUMNS: [&str; 5] = ["source", LAST_24H, PREVIOUS_24H, "percent_change", "error"];

pub struct Orchestrator {
    catalog: Catalog,
    store: Arc<dyn EventStore>,
    joiner: EnrichmentJoiner,
    resolver: IntentResolver,
    provider: Arc<dyn LlmProvider>,
    settings: ModelSettings,
}

impl Orchestrator {
    pub fn new(
        catalog: Catalog,
        store: Arc<dyn EventStore>,
        reference: Arc<dyn ReferenceStore>,
        provider: Arc<dyn LlmProvider>,
        settings: ModelSettings,
    ) -> Self {
        Self {
            resolver: IntentResolver::new(provider.clone(), catalog.clone(), settings),
            joiner: EnrichmentJoiner::new(reference),
            catalog,
            store,
            provider,
            settings,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Answer one operator question. Always returns a report: every failure
    /// inside the pipeline degrades instead of propagating.
    pub async fn run(&self, text: &str) -> IncidentReport {
        let start = Instant::now();

        info!(query = %text, "resolving intent");
        let decision = self.resolver.resolve(text).await;

        let results = self.execute(&decision, text).await;

        info!(operations = results.len(), "summarizing");
        let summary = self.summarize(text, &results).await;

        let report = IncidentReport::new(text, decision, results, summary);
        info!(
            report_id = %report.id,
            severity = %report.severity,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "incident report ready"
        );
        report
    }

    /// Run every known operation of `decision` concurrently. Results come
    /// back in resolution order; unknown names and repeats are skipped.
    pub async fn execute(
        &self,
        decision: &ToolDecision,
        text: &str,
    ) -> IndexMap<String, OperationResult> {
        let mut seen = HashSet::new();
        let mut operations = Vec::new();
        for choice in &decision.operations {
            match choice {
                ToolChoice::Known(op) => {
                    if seen.insert(*op) {
                        operations.push(*op);
                    } else {
                        debug!(operation = op.name(), "duplicate operation skipped");
                    }
                }
                ToolChoice::Unrecognized(name) => {
                    warn!(operation = %name, "unknown operation skipped");
                }
            }
        }

        info!(
            operations = ?operations.iter().map(AnalyticalOperation::name).collect::<Vec<_>>(),
            "executing"
        );

        let futures = operations.iter().map(|op| {
            let params = self.operation_params(*op, decision, text);
            self.run_operation(*op, params)
        });
        let outcomes = join_all(futures).await;

        operations
            .iter()
            .zip(outcomes)
            .map(|(op, result)| (op.name().to_string(), result))
            .collect()
    }

    fn operation_params(
        &self,
        op: AnalyticalOperation,
        decision: &ToolDecision,
        text: &str,
    ) -> Params {
        let mut params = decision.params_for(op);
        if op == AnalyticalOperation::RunbookSearch {
            let has_term = params
                .get(SEARCH_TERM)
                .and_then(Value::as_str)
                .is_some_and(|t| !t.trim().is_empty());
            if !has_term {
                debug!("runbook search term taken from the query text");
                params.insert(SEARCH_TERM.into(), json!(text));
            }
        }
        params
    }

    async fn run_operation(&self, op: AnalyticalOperation, params: Params) -> OperationResult {
        let start = Instant::now();
        let plan = match self.catalog.compile(op, &params) {
            Ok(plan) => plan,
            Err(e) => {
                warn!(operation = op.name(), error = %e, "operation did not compile");
                return OperationResult::failure(e.to_string());
            }
        };

        let result = match op {
            AnalyticalOperation::IngestionTrend => {
                Ok(OperationResult::table(self.ingestion_trend(&plan).await))
            }
            AnalyticalOperation::RunbookSearch => {
                self.run_single(&plan).await.map(OperationResult::records)
            }
            AnalyticalOperation::ErrorSpike
            | AnalyticalOperation::MetricAnomaly
            | AnalyticalOperation::EnrichedAnalysis => match self.run_single(&plan).await {
                Ok(rows) if op.needs_enrichment() => {
                    Ok(OperationResult::table(self.joiner.enrich_result(rows, ENTITY_COLUMN).await))
                }
                Ok(rows) => Ok(OperationResult::table(rows)),
                Err(e) => Err(e),
            },
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        match result {
            Ok(r) => {
                info!(
                    operation = op.name(),
                    rows = r.row_count(),
                    elapsed_ms,
                    "operation complete"
                );
                r
            }
            Err(e) => {
                warn!(operation = op.name(), error = %e, elapsed_ms, "operation failed");
                OperationResult::failure(e.to_string())
            }
        }
    }

    async fn run_single(&self, plan: &OperationPlan) -> Result<QueryResult, StoreError> {
        let query = plan
            .queries
            .first()
            .ok_or_else(|| {
                StoreError::Query(format!("{} compiled to no queries", plan.operation))
            })?;
        debug!(operation = plan.operation.name(), source = %query.source, "executing query");
        self.store.execute(&query.query).await
    }

    /// Compare the last 24h with the 24h before, per tracked source. A failing
    /// source yields an error row instead of failing the operation.
    async fn ingestion_trend(&self, plan: &OperationPlan) -> QueryResult {
        let outcomes = join_all(plan.queries.iter().map(|q| self.store.execute(&q.query))).await;

        let mut sources: IndexMap<&str, (Option<u64>, Option<u64>, Option<String>)> =
            IndexMap::new();
        for (q, outcome) in plan.queries.iter().zip(outcomes) {
            let entry = sources.entry(q.source.as_str()).or_default();
            match outcome {
                Ok(result) => {
                    let count = count_value(&result);
                    match q.label.as_str() {
                        LAST_24H => entry.0 = Some(count),
                        PREVIOUS_24H => entry.1 = Some(count),
                        other => debug!(label = other, "unexpected trend period"),
                    }
                }
                Err(e) => {
                    warn!(source = %q.source, error = %e, "ingestion count failed");
                    entry.2.get_or_insert_with(|| e.to_string());
                }
            }
        }

        let rows = sources
            .into_iter()
            .map(|(source, (last, prev, error))| match (last, prev, error) {
                (Some(last), Some(prev), None) => {
                    vec![
                        json!(source),
                        json!(last),
                        json!(prev),
                        json!(percent_change(last, prev)),
                        Value::Null,
                    ]
                }
                (_, _, error) => vec![
                    json!(source),
                    Value::Null,
                    Value::Null,
                    Value::Null,
                    json!(error.unwrap_or_else(|| "incomplete counts".to_string())),
                ],
            })
            .collect();

        let columns = TREND_COLUMNS
            .iter()
            .map(|name| {
                let ty = match *name {
                    "source" | "error" => "keyword",
                    "percent_change" => "double",
                    _ => "long",
                };
                Column::new(*name, ty)
            })
            .collect();

        QueryResult::new(columns, rows)
    }

    async fn summarize(&self, text: &str, results: &IndexMap<String, OperationResult>) -> String {
        let pretty = serde_json::to_string_pretty(results).unwrap_or_default();
        let messages = vec![
            Message::system(SUMMARY_INSTRUCTIONS),
            Message::user(format!("User Query: \"{text}\"\nTool Results: {pretty}")),
        ];

        match complete_within(
            self.provider.as_ref(),
            messages,
            self.settings.temperature,
            self.settings.max_tokens,
            self.settings.timeout,
        )
        .await
        {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, "summary failed, returning raw results");
                format!("Formatting error: {e}\n\nRaw Results:\n{pretty}")
            }
        }
    }
}

/// `round((last - prev) / prev * 100, 2)`, or 0.0 with no baseline.
pub fn percent_change(last: u64, prev: u64) -> f64 {
    if prev == 0 {
        return 0.0;
    }
    let pct = (last as f64 - prev as f64) / prev as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}

fn count_value(result: &QueryResult) -> u64 {
    match result.get_value(0, "count") {
        Some(v) => v.as_u64().or_else(|| v.as_f64().map(|f| f.max(0.0) as u64)).unwrap_or(0),
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_change_math() {
        assert_eq!(percent_change(150, 100), 50.0);
        assert_eq!(percent_change(50, 100), -50.0);
        assert_eq!(percent_change(100, 100), 0.0);
        assert_eq!(percent_change(10, 0), 0.0);
        assert_eq!(percent_change(0, 0), 0.0);
        assert_eq!(percent_change(2, 3), -33.33);
        assert_eq!(percent_change(1, 3), -66.67);
    }

    #[test]
    fn count_from_result() {
        let r = QueryResult::new(vec![Column::new("count", "long")], vec![vec![json!(42)]]);
        assert_eq!(count_value(&r), 42);
        assert_eq!(count_value(&QueryResult::default()), 0);
    }
}
