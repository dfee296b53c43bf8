use chrono::{DateTime, Utc};
use commander_core::Severity;
use commander_store::QueryResult;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::resolver::ToolDecision;

/// Outcome of one catalog operation: data on success, a message on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OperationResult {
    /// Column names plus positional rows.
    pub fn table(result: QueryResult) -> Self {
        let columns = result.columns.into_iter().map(|c| c.name).collect();
        let rows = result.rows.into_iter().map(Value::Array).collect();
        Self {
            success: true,
            columns: Some(columns),
            data: Some(Value::Array(rows)),
            error: None,
        }
    }

    /// One JSON object per row, keyed by column name.
    pub fn records(result: QueryResult) -> Self {
        let names: Vec<String> = result.columns.into_iter().map(|c| c.name).collect();
        let records = result
            .rows
            .into_iter()
            .map(|row| {
                let object: Map<String, Value> = names.iter().cloned().zip(row).collect();
                Value::Object(object)
            })
            .collect();
        Self {
            success: true,
            columns: None,
            data: Some(Value::Array(records)),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            columns: None,
            data: None,
            error: Some(message.into()),
        }
    }

    /// Number of data rows, zero on failure.
    pub fn row_count(&self) -> usize {
        self.data.as_ref().and_then(Value::as_array).map_or(0, Vec::len)
    }
}

/// Terminal artifact of one orchestrator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentReport {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub query: String,
    pub decision: ToolDecision,
    /// Keyed by canonical operation name, in resolution order.
    pub results: IndexMap<String, OperationResult>,
    pub summary: String,
    pub severity: Severity,
}

impl IncidentReport {
    pub fn new(
        query: impl Into<String>,
        decision: ToolDecision,
        results: IndexMap<String, OperationResult>,
        summary: String,
    ) -> Self {
        let severity = Severity::from_summary(&summary);
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            query: query.into(),
            decision,
            results,
            summary,
            severity,
        }
    }

    pub fn operations_run(&self) -> Vec<&str> {
        self.results.keys().map(String::as_str).collect()
    }

    pub fn failed_operations(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|(_, r)| !r.success)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commander_store::Column;
    use serde_json::json;

    fn sample() -> QueryResult {
        QueryResult::new(
            vec![Column::new("title", "keyword"), Column::new("score", "double")],
            vec![vec![json!("DB pool"), json!(4.2)]],
        )
    }

    #[test]
    fn table_shape() {
        let r = OperationResult::table(sample());
        assert_eq!(
            serde_json::to_value(&r).unwrap(),
            json!({
                "success": true,
                "columns": ["title", "score"],
                "data": [["DB pool", 4.2]],
            })
        );
        assert_eq!(r.row_count(), 1);
    }

    #[test]
    fn records_shape() {
        let r = OperationResult::records(sample());
        assert_eq!(r.data, Some(json!([{ "title": "DB pool", "score": 4.2 }])));
        assert!(r.columns.is_none());
    }

    #[test]
    fn failure_shape() {
        let r = OperationResult::failure("index missing");
        assert_eq!(
            serde_json::to_value(&r).unwrap(),
            json!({ "success": false, "error": "index missing" })
        );
        assert_eq!(r.row_count(), 0);
    }

    #[test]
    fn report_derives_severity_from_summary() {
        let mut results = IndexMap::new();
        results.insert("error-spike".to_string(), OperationResult::failure("boom"));
        results.insert("metric-anomaly".to_string(), OperationResult::table(sample()));
        let report = IncidentReport::new(
            "anything on fire?",
            ToolDecision::fallback(),
            results,
            "WARNING: latency creeping up. CRITICAL: payments down.".into(),
        );
        assert_eq!(report.severity, Severity::Critical);
        assert_eq!(report.operations_run(), vec!["error-spike", "metric-anomaly"]);
        assert_eq!(report.failed_operations(), vec!["error-spike"]);
    }
}
