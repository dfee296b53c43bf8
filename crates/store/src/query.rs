//! Structured query model shared by every backend.
//!
//! Aggregations render to ES|QL for Elasticsearch and are evaluated
//! directly by the in-memory store. Time filters are always relative to the
//! store's own `NOW()`, so a compiled query never captures the wall clock.

use std::fmt::Write as _;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Default timestamp field of every event index.
pub const TIMESTAMP_FIELD: &str = "@timestamp";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Query {
    Aggregate(AggregateQuery),
    Search(SearchQuery),
}

impl Query {
    /// Index or source the query reads from.
    pub fn source(&self) -> &str {
        match self {
            Query::Aggregate(q) => &q.source,
            Query::Search(q) => &q.index,
        }
    }
}

// ── Aggregation ───────────────────────────────────────────────

/// `(NOW() - start_ago, NOW() - end_ago]`, open-ended when `end_ago` is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start_ago: Duration,
    pub end_ago: Option<Duration>,
}

impl TimeRange {
    pub fn last(window: Duration) -> Self {
        Self { start_ago: window, end_ago: None }
    }

    pub fn between(start_ago: Duration, end_ago: Duration) -> Self {
        Self { start_ago, end_ago: Some(end_ago) }
    }
}

/// Pre-aggregation row filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    Eq { field: String, value: Value },
    In { field: String, values: Vec<Value> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "fn", content = "field", rename_all = "snake_case")]
pub enum AggFn {
    Count,
    Avg(String),
    Max(String),
    Min(String),
    CountDistinct(String),
}

/// `alias = FN(field)` inside a STATS clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    pub alias: String,
    pub func: AggFn,
}

impl Aggregation {
    pub fn new(alias: impl Into<String>, func: AggFn) -> Self {
        Self { alias: alias.into(), func }
    }
}

/// Post-aggregation condition over output columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    Gt { column: String, value: f64 },
    Eq { column: String, value: Value },
    And { all: Vec<Condition> },
    Or { any: Vec<Condition> },
}

impl Condition {
    pub fn gt(column: impl Into<String>, value: f64) -> Self {
        Condition::Gt { column: column.into(), value }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Eq { column: column.into(), value: value.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub column: String,
    pub descending: bool,
}

impl Sort {
    pub fn desc(column: impl Into<String>) -> Self {
        Self { column: column.into(), descending: true }
    }
}

/// `FROM … | WHERE … | STATS … BY … | WHERE … | SORT … | LIMIT …`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateQuery {
    pub source: String,
    pub time_field: String,
    pub range: TimeRange,
    pub filters: Vec<Predicate>,
    pub aggregations: Vec<Aggregation>,
    pub group_by: Vec<String>,
    pub having: Option<Condition>,
    pub sort: Option<Sort>,
    pub limit: Option<usize>,
}

impl AggregateQuery {
    pub fn new(source: impl Into<String>, range: TimeRange) -> Self {
        Self {
            source: source.into(),
            time_field: TIMESTAMP_FIELD.to_string(),
            range,
            filters: Vec::new(),
            aggregations: Vec::new(),
            group_by: Vec::new(),
            having: None,
            sort: None,
            limit: None,
        }
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.filters.push(predicate);
        self
    }

    pub fn aggregate(mut self, alias: impl Into<String>, func: AggFn) -> Self {
        self.aggregations.push(Aggregation::new(alias, func));
        self
    }

    pub fn group_by<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn having(mut self, condition: Condition) -> Self {
        self.having = Some(condition);
        self
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Output column order: aggregations first, then grouping keys.
    pub fn output_columns(&self) -> Vec<String> {
        self.aggregations
            .iter()
            .map(|a| a.alias.clone())
            .chain(self.group_by.iter().cloned())
            .collect()
    }

    /// Render as an ES|QL pipeline.
    pub fn to_esql(&self) -> String {
        let mut q = format!("FROM {}", self.source);

        let _ = write!(
            q,
            "\n| WHERE {} > NOW() - {}",
            self.time_field,
            esql_span(self.range.start_ago)
        );
        if let Some(end) = self.range.end_ago {
            let _ = write!(q, " AND {} <= NOW() - {}", self.time_field, esql_span(end));
        }

        for predicate in &self.filters {
            let _ = write!(q, "\n| WHERE {}", render_predicate(predicate));
        }

        if !self.aggregations.is_empty() {
            let aggs: Vec<String> = self
                .aggregations
                .iter()
                .map(|a| format!("{} = {}", a.alias, render_agg(&a.func)))
                .collect();
            let _ = write!(q, "\n| STATS {}", aggs.join(", "));
            if !self.group_by.is_empty() {
                let _ = write!(q, " BY {}", self.group_by.join(", "));
            }
        }

        if let Some(having) = &self.having {
            let _ = write!(q, "\n| WHERE {}", render_condition(having, true));
        }

        if let Some(sort) = &self.sort {
            let dir = if sort.descending { "DESC" } else { "ASC" };
            let _ = write!(q, "\n| SORT {} {}", sort.column, dir);
        }

        if let Some(limit) = self.limit {
            let _ = write!(q, "\n| LIMIT {}", limit);
        }

        q
    }
}

/// Render a duration as an ES|QL time span literal (`30m`, `1h`, `7d`).
pub fn esql_span(d: Duration) -> String {
    let secs = d.as_secs();
    if secs > 0 && secs % 86_400 == 0 {
        format!("{}d", secs / 86_400)
    } else if secs > 0 && secs % 3_600 == 0 {
        format!("{}h", secs / 3_600)
    } else if secs > 0 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

fn render_value(v: &Value) -> String {
    match v {
        Value::String(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn render_predicate(p: &Predicate) -> String {
    match p {
        Predicate::Eq { field, value } => format!("{} == {}", field, render_value(value)),
        Predicate::In { field, values } => {
            let list: Vec<String> = values.iter().map(render_value).collect();
            format!("{} IN ({})", field, list.join(", "))
        }
    }
}

fn render_agg(f: &AggFn) -> String {
    match f {
        AggFn::Count => "COUNT(*)".to_string(),
        AggFn::Avg(field) => format!("AVG({field})"),
        AggFn::Max(field) => format!("MAX({field})"),
        AggFn::Min(field) => format!("MIN({field})"),
        AggFn::CountDistinct(field) => format!("COUNT_DISTINCT({field})"),
    }
}

fn render_condition(c: &Condition, top: bool) -> String {
    match c {
        Condition::Gt { column, value } => format!("{} > {}", column, render_number(*value)),
        Condition::Eq { column, value } => format!("{} == {}", column, render_value(value)),
        Condition::And { all } => join_conditions(all, " AND ", top),
        Condition::Or { any } => join_conditions(any, " OR ", top),
    }
}

fn join_conditions(parts: &[Condition], sep: &str, top: bool) -> String {
    let inner: Vec<String> = parts.iter().map(|c| render_condition(c, false)).collect();
    let joined = inner.join(sep);
    if top || parts.len() < 2 {
        joined
    } else {
        format!("({joined})")
    }
}

fn render_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

// ── Full-text search ──────────────────────────────────────────

/// A searchable field and its relevance boost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedField {
    pub name: String,
    pub boost: f64,
}

impl WeightedField {
    pub fn new(name: impl Into<String>, boost: f64) -> Self {
        Self { name: name.into(), boost }
    }

    /// `field^boost` notation, with the boost omitted when it is 1.
    pub fn to_es(&self) -> String {
        if (self.boost - 1.0).abs() < f64::EPSILON {
            self.name.clone()
        } else {
            format!("{}^{}", self.name, render_number(self.boost))
        }
    }
}

/// Best-fields relevance search over one index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub index: String,
    pub term: String,
    pub fields: Vec<WeightedField>,
    pub size: usize,
    /// Source fields copied into result columns, followed by `score`.
    pub source_fields: Vec<String>,
}

impl SearchQuery {
    /// Request body for the `_search` endpoint.
    pub fn to_request_body(&self) -> Value {
        let fields: Vec<String> = self.fields.iter().map(WeightedField::to_es).collect();
        json!({
            "query": {
                "multi_match": {
                    "query": self.term,
                    "fields": fields,
                    "type": "best_fields",
                }
            },
            "size": self.size,
            "_source": self.source_fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hours(h: u64) -> Duration {
        Duration::from_secs(h * 3600)
    }

    #[test]
    fn span_literals() {
        assert_eq!(esql_span(Duration::from_secs(30 * 60)), "30m");
        assert_eq!(esql_span(hours(1)), "1h");
        assert_eq!(esql_span(hours(24)), "1d");
        assert_eq!(esql_span(hours(6)), "6h");
        assert_eq!(esql_span(Duration::from_secs(90)), "90s");
    }

    #[test]
    fn renders_full_pipeline() {
        let q = AggregateQuery::new("app-logs", TimeRange::last(hours(1)))
            .filter(Predicate::In {
                field: "severity".into(),
                values: vec!["ERROR".into(), "CRITICAL".into()],
            })
            .aggregate("error_count", AggFn::Count)
            .group_by(["service_name", "error_code"])
            .having(Condition::gt("error_count", 10.0))
            .sort(Sort::desc("error_count"))
            .limit(20);

        let expected = "FROM app-logs\n\
            | WHERE @timestamp > NOW() - 1h\n\
            | WHERE severity IN (\"ERROR\", \"CRITICAL\")\n\
            | STATS error_count = COUNT(*) BY service_name, error_code\n\
            | WHERE error_count > 10\n\
            | SORT error_count DESC\n\
            | LIMIT 20";
        assert_eq!(q.to_esql(), expected);
        assert_eq!(q.output_columns(), vec!["error_count", "service_name", "error_code"]);
    }

    #[test]
    fn renders_bounded_range_and_nested_conditions() {
        let q = AggregateQuery::new("system-metrics", TimeRange::between(hours(48), hours(24)))
            .aggregate("count", AggFn::Count)
            .having(Condition::Or {
                any: vec![
                    Condition::And {
                        all: vec![
                            Condition::eq("metric_name", "cpu_usage"),
                            Condition::gt("max_value", 85.0),
                        ],
                    },
                    Condition::And {
                        all: vec![
                            Condition::eq("metric_name", "error_rate"),
                            Condition::gt("max_value", 5.5),
                        ],
                    },
                ],
            });

        let esql = q.to_esql();
        assert!(esql.contains("@timestamp > NOW() - 2d AND @timestamp <= NOW() - 1d"));
        assert!(esql.contains(
            "| WHERE (metric_name == \"cpu_usage\" AND max_value > 85) \
             OR (metric_name == \"error_rate\" AND max_value > 5.5)"
        ));
    }

    #[test]
    fn string_values_are_escaped() {
        let q = AggregateQuery::new("app-logs", TimeRange::last(hours(1)))
            .filter(Predicate::Eq { field: "message".into(), value: json!("say \"hi\"") });
        assert!(q.to_esql().contains(r#"message == "say \"hi\"""#));
    }

    #[test]
    fn search_body_uses_boosts() {
        let q = SearchQuery {
            index: "runbooks".into(),
            term: "connection pool exhausted".into(),
            fields: vec![
                WeightedField::new("error_pattern", 3.0),
                WeightedField::new("title", 2.0),
                WeightedField::new("solution", 1.0),
            ],
            size: 3,
            source_fields: vec!["title".into()],
        };
        let body = q.to_request_body();
        assert_eq!(
            body["query"]["multi_match"]["fields"],
            json!(["error_pattern^3", "title^2", "solution"])
        );
        assert_eq!(body["query"]["multi_match"]["type"], "best_fields");
        assert_eq!(body["size"], 3);
    }
}
