use std::collections::HashMap;
use std::sync::Arc;

use commander_store::{Column, QueryResult, ReferenceEntity, ReferenceStore};
use serde_json::Value;
use tracing::{debug, warn};

/// Substituted for every enrichment field when no reference record matches.
pub const UNKNOWN: &str = "unknown";

/// Columns appended to enriched results, in order.
pub const ENRICHMENT_COLUMNS: [&str; 3] = ["team", "slack_channel", "criticality"];

/// Ownership attributes joined onto a result row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrichment {
    pub team: String,
    pub slack_channel: String,
    pub criticality: String,
}

impl Enrichment {
    pub fn unknown() -> Self {
        Self {
            team: UNKNOWN.into(),
            slack_channel: UNKNOWN.into(),
            criticality: UNKNOWN.into(),
        }
    }

    fn from_entity(entity: &ReferenceEntity) -> Self {
        let or_unknown = |v: &Option<String>| v.clone().unwrap_or_else(|| UNKNOWN.to_string());
        Self {
            team: or_unknown(&entity.team),
            slack_channel: or_unknown(&entity.oncall_slack_channel),
            criticality: or_unknown(&entity.criticality),
        }
    }

    fn into_values(self) -> [Value; 3] {
        [
            Value::String(self.team),
            Value::String(self.slack_channel),
            Value::String(self.criticality),
        ]
    }
}

/// Joins result rows against the service reference dataset.
pub struct EnrichmentJoiner {
    reference: Arc<dyn ReferenceStore>,
}

impl EnrichmentJoiner {
    pub fn new(reference: Arc<dyn ReferenceStore>) -> Self {
        Self { reference }
    }

    /// Exact-match lookup of one entity. Never fails: no match and lookup
    /// errors both yield [`Enrichment::unknown`]. With several matches the
    /// first returned record wins.
    pub async fn lookup(&self, entity_id: &str) -> Enrichment {
        match self.reference.lookup(entity_id).await {
            Ok(matches) => {
                if matches.len() > 1 {
                    debug!(
                        entity = entity_id,
                        matches = matches.len(),
                        "duplicate reference records, using first"
                    );
                }
                matches.first().map(Enrichment::from_entity).unwrap_or_else(|| {
                    debug!(entity = entity_id, "no reference record");
                    Enrichment::unknown()
                })
            }
            Err(e) => {
                warn!(entity = entity_id, error = %e, "reference lookup failed");
                Enrichment::unknown()
            }
        }
    }

    /// Append the enrichment fields for `entity_id` to `row`.
    pub async fn enrich(&self, mut row: Vec<Value>, entity_id: &str) -> Vec<Value> {
        row.extend(self.lookup(entity_id).await.into_values());
        row
    }

    /// Enrich every row of `result`, keyed by the value in `key_column`.
    /// Each distinct entity is looked up once. Rows without a usable key get
    /// the sentinel values.
    pub async fn enrich_result(&self, result: QueryResult, key_column: &str) -> QueryResult {
        let key_idx = result.column_index(key_column);
        if key_idx.is_none() {
            warn!(column = key_column, "enrichment key column missing from result");
        }

        let mut cache: HashMap<String, Enrichment> = HashMap::new();
        let mut rows = Vec::with_capacity(result.rows.len());
        for mut row in result.rows {
            let entity = key_idx.and_then(|i| row.get(i)).and_then(entity_id);
            let enrichment = match entity {
                Some(id) => match cache.get(&id) {
                    Some(hit) => hit.clone(),
                    None => {
                        let found = self.lookup(&id).await;
                        cache.insert(id, found.clone());
                        found
                    }
                },
                None => Enrichment::unknown(),
            };
            row.extend(enrichment.into_values());
            rows.push(row);
        }

        let mut columns = result.columns;
        columns.extend(ENRICHMENT_COLUMNS.iter().map(|name| Column::new(*name, "keyword")));
        QueryResult::new(columns, rows)
    }
}

fn entity_id(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
