//! In-memory event store.
//!
//! Evaluates the same [`Query`] model as the Elasticsearch backend against
//! JSON documents held in memory, relative to a fixed `now`. Used by tests
//! and offline demos. Failures can be injected per source.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};

use crate::error::StoreError;
use crate::query::{AggFn, AggregateQuery, Condition, Predicate, Query, SearchQuery};
use crate::reference::ReferenceEntity;
use crate::result::{Column, QueryResult};
use crate::{EventStore, ReferenceStore};

pub struct MemoryStore {
    now: DateTime<Utc>,
    indices: HashMap<String, Vec<Value>>,
    references: Vec<ReferenceEntity>,
    failures: HashMap<String, String>,
    reference_failure: Option<String>,
    lookups: AtomicUsize,
}

impl MemoryStore {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            indices: HashMap::new(),
            references: Vec::new(),
            failures: HashMap::new(),
            reference_failure: None,
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// RFC 3339 timestamp `ago` before `now`, for building fixtures.
    pub fn timestamp_ago(&self, ago: Duration) -> String {
        let ago = chrono::Duration::from_std(ago).unwrap_or(chrono::Duration::zero());
        (self.now - ago).to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Register an (initially empty) index.
    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.indices.entry(index.into()).or_default();
        self
    }

    pub fn with_documents<I>(mut self, index: impl Into<String>, docs: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        self.indices.entry(index.into()).or_default().extend(docs);
        self
    }

    pub fn insert(&mut self, index: &str, doc: Value) {
        self.indices.entry(index.to_string()).or_default().push(doc);
    }

    pub fn with_reference(mut self, entity: ReferenceEntity) -> Self {
        self.references.push(entity);
        self
    }

    /// Every query against `source` fails with `message`.
    pub fn fail_source(mut self, source: impl Into<String>, message: impl Into<String>) -> Self {
        self.failures.insert(source.into(), message.into());
        self
    }

    /// Every reference lookup fails with `message`.
    pub fn fail_references(mut self, message: impl Into<String>) -> Self {
        self.reference_failure = Some(message.into());
        self
    }

    /// Number of reference lookups served so far.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(AtomicOrdering::SeqCst)
    }

    fn documents(&self, source: &str) -> Result<&[Value], StoreError> {
        if let Some(message) = self.failures.get(source) {
            return Err(StoreError::Api { status: 503, reason: message.clone() });
        }
        self.indices
            .get(source)
            .map(Vec::as_slice)
            .ok_or_else(|| StoreError::Api {
                status: 400,
                reason: format!("Unknown index [{source}]"),
            })
    }

    fn in_range(&self, doc: &Value, q: &AggregateQuery) -> bool {
        let Some(ts) = doc.get(&q.time_field).and_then(parse_timestamp) else {
            return false;
        };
        let start = self.now - to_chrono(q.range.start_ago);
        if ts <= start {
            return false;
        }
        match q.range.end_ago {
            Some(end) => ts <= self.now - to_chrono(end),
            None => true,
        }
    }

    fn aggregate(&self, q: &AggregateQuery) -> Result<QueryResult, StoreError> {
        if q.aggregations.is_empty() {
            return Err(StoreError::Query("aggregate query without aggregations".into()));
        }

        let docs: Vec<&Value> = self
            .documents(&q.source)?
            .iter()
            .filter(|d| self.in_range(d, q))
            .filter(|d| q.filters.iter().all(|p| matches_predicate(d, p)))
            .collect();

        // Grouped by serialized key for deterministic output order.
        let mut groups: BTreeMap<String, (Vec<Value>, Vec<&Value>)> = BTreeMap::new();
        if q.group_by.is_empty() {
            groups.insert(String::new(), (Vec::new(), docs));
        } else {
            for doc in docs {
                let key: Vec<Value> = q
                    .group_by
                    .iter()
                    .map(|f| doc.get(f).cloned().unwrap_or(Value::Null))
                    .collect();
                let serialized = Value::Array(key.clone()).to_string();
                groups.entry(serialized).or_insert_with(|| (key, Vec::new())).1.push(doc);
            }
        }

        let mut columns: Vec<Column> = q
            .aggregations
            .iter()
            .map(|a| Column::new(&a.alias, agg_type(&a.func, &q.time_field)))
            .collect();
        columns.extend(q.group_by.iter().map(|g| Column::new(g, "keyword")));

        let mut rows: Vec<Vec<Value>> = groups
            .into_values()
            .map(|(key, members)| {
                let mut row: Vec<Value> = q
                    .aggregations
                    .iter()
                    .map(|a| evaluate_agg(&a.func, &members))
                    .collect();
                row.extend(key);
                row
            })
            .collect();

        if let Some(having) = &q.having {
            rows.retain(|row| matches_condition(&columns, row, having));
        }

        if let Some(sort) = &q.sort {
            if let Some(idx) = columns.iter().position(|c| c.name == sort.column) {
                rows.sort_by(|a, b| {
                    let ord = compare_values(&a[idx], &b[idx]);
                    if sort.descending { ord.reverse() } else { ord }
                });
            }
        }

        if let Some(limit) = q.limit {
            rows.truncate(limit);
        }

        Ok(QueryResult::new(columns, rows))
    }

    fn search(&self, q: &SearchQuery) -> Result<QueryResult, StoreError> {
        let terms = tokenize(&q.term);
        let mut scored: Vec<(f64, &Value)> = self
            .documents(&q.index)?
            .iter()
            .filter_map(|doc| {
                let score = q
                    .fields
                    .iter()
                    .map(|f| {
                        let text = doc.get(&f.name).map(value_text).unwrap_or_default();
                        let tokens: HashSet<String> = tokenize(&text).into_iter().collect();
                        let hits = terms.iter().filter(|t| tokens.contains(*t)).count();
                        hits as f64 * f.boost
                    })
                    .fold(0.0_f64, f64::max);
                (score > 0.0).then_some((score, doc))
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        scored.truncate(q.size);

        let mut columns: Vec<Column> =
            q.source_fields.iter().map(|f| Column::new(f, "keyword")).collect();
        columns.push(Column::new("score", "double"));

        let rows = scored
            .into_iter()
            .map(|(score, doc)| {
                let mut row: Vec<Value> = q
                    .source_fields
                    .iter()
                    .map(|f| doc.get(f).cloned().unwrap_or(Value::Null))
                    .collect();
                row.push(json!(score));
                row
            })
            .collect();

        Ok(QueryResult::new(columns, rows))
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn execute(&self, query: &Query) -> Result<QueryResult, StoreError> {
        match query {
            Query::Aggregate(q) => self.aggregate(q),
            Query::Search(q) => self.search(q),
        }
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}

#[async_trait]
impl ReferenceStore for MemoryStore {
    async fn lookup(&self, entity_id: &str) -> Result<Vec<ReferenceEntity>, StoreError> {
        self.lookups.fetch_add(1, AtomicOrdering::SeqCst);
        if let Some(message) = &self.reference_failure {
            return Err(StoreError::Api { status: 503, reason: message.clone() });
        }
        Ok(self
            .references
            .iter()
            .filter(|e| e.service_name == entity_id)
            .cloned()
            .collect())
    }
}

// ── Evaluation helpers ────────────────────────────────────────

fn to_chrono(d: Duration) -> chrono::Duration {
    // Far enough back to cover any stored event without overflowing.
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::days(365 * 100))
}

fn parse_timestamp(v: &Value) -> Option<DateTime<Utc>> {
    v.as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn matches_predicate(doc: &Value, p: &Predicate) -> bool {
    match p {
        Predicate::Eq { field, value } => doc.get(field).is_some_and(|v| values_equal(v, value)),
        Predicate::In { field, values } => doc
            .get(field)
            .is_some_and(|v| values.iter().any(|candidate| values_equal(v, candidate))),
    }
}

fn agg_type(f: &AggFn, time_field: &str) -> &'static str {
    match f {
        AggFn::Count | AggFn::CountDistinct(_) => "long",
        AggFn::Avg(_) => "double",
        AggFn::Max(field) | AggFn::Min(field) if field == time_field => "date",
        AggFn::Max(_) | AggFn::Min(_) => "double",
    }
}

fn field_values<'a>(docs: &'a [&'a Value], field: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
    docs.iter().filter_map(move |d| d.get(field)).filter(|v| !v.is_null())
}

fn evaluate_agg(f: &AggFn, docs: &[&Value]) -> Value {
    match f {
        AggFn::Count => json!(docs.len()),
        AggFn::Avg(field) => {
            let nums: Vec<f64> = field_values(docs, field).filter_map(Value::as_f64).collect();
            if nums.is_empty() {
                Value::Null
            } else {
                json!(nums.iter().sum::<f64>() / nums.len() as f64)
            }
        }
        AggFn::Max(field) => extreme(field_values(docs, field), Ordering::Greater),
        AggFn::Min(field) => extreme(field_values(docs, field), Ordering::Less),
        AggFn::CountDistinct(field) => {
            let distinct: HashSet<String> =
                field_values(docs, field).map(Value::to_string).collect();
            json!(distinct.len())
        }
    }
}

/// Max (`want = Greater`) or min of numbers or timestamps. Timestamps come
/// back normalized to millisecond RFC 3339.
fn extreme<'a>(values: impl Iterator<Item = &'a Value>, want: Ordering) -> Value {
    let mut best: Option<&Value> = None;
    for v in values {
        best = match best {
            Some(b) if compare_values(v, b) != want => Some(b),
            _ => Some(v),
        };
    }
    match best {
        Some(v) => match parse_timestamp(v) {
            Some(ts) => json!(ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
            None => v.clone(),
        },
        None => Value::Null,
    }
}

/// Numbers numerically, timestamps chronologically, other strings
/// lexically. Nulls sort last.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        _ => {
            if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
                return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
            }
            if let (Some(x), Some(y)) = (parse_timestamp(a), parse_timestamp(b)) {
                return x.cmp(&y);
            }
            value_text(a).cmp(&value_text(b))
        }
    }
}

fn matches_condition(columns: &[Column], row: &[Value], c: &Condition) -> bool {
    let cell = |name: &str| {
        columns.iter().position(|col| col.name == name).and_then(|i| row.get(i))
    };
    match c {
        Condition::Gt { column, value } => {
            cell(column.as_str()).and_then(Value::as_f64).is_some_and(|v| v > *value)
        }
        Condition::Eq { column, value } => {
            cell(column.as_str()).is_some_and(|v| values_equal(v, value))
        }
        Condition::And { all } => all.iter().all(|c| matches_condition(columns, row, c)),
        Condition::Or { any } => any.iter().any(|c| matches_condition(columns, row, c)),
    }
}

fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(value_text).collect::<Vec<_>>().join(" "),
        Value::Object(map) => object_text(map),
        other => other.to_string(),
    }
}

fn object_text(map: &Map<String, Value>) -> String {
    map.values().map(value_text).collect::<Vec<_>>().join(" ")
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}
