//! Elasticsearch backend over plain HTTP.
//!
//! Aggregations go through the ES|QL endpoint (`POST /_query`), full-text
//! search and reference lookups through `POST /{index}/_search`.

use std::time::Duration;

use async_trait::async_trait;
use commander_core::config::ElasticConfig;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::query::{Query, SearchQuery};
use crate::reference::ReferenceEntity;
use crate::result::{Column, QueryResult};
use crate::{EventStore, ReferenceStore};

/// Upper bound on reference records returned for one entity.
const REFERENCE_LOOKUP_SIZE: usize = 10;

#[derive(Debug, Clone)]
enum Auth {
    None,
    Basic { username: String, password: Option<String> },
    ApiKey(String),
}

pub struct ElasticsearchStore {
    client: reqwest::Client,
    endpoint: String,
    auth: Auth,
    timeout: Duration,
    reference_index: String,
}

impl ElasticsearchStore {
    /// Build a store for the configured cluster. `reference_index` holds
    /// the service inventory used by [`ReferenceStore::lookup`].
    pub fn new(
        config: &ElasticConfig,
        reference_index: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let timeout = config.timeout();
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        let auth = match (&config.api_key, &config.username) {
            (Some(key), _) => Auth::ApiKey(key.clone()),
            (None, Some(user)) => Auth::Basic {
                username: user.clone(),
                password: config.password.clone(),
            },
            (None, None) => Auth::None,
        };

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            auth,
            timeout,
            reference_index: reference_index.into(),
        })
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.endpoint, path.trim_start_matches('/'));
        let req = self.client.post(url);
        match &self.auth {
            Auth::None => req,
            Auth::Basic { username, password } => req.basic_auth(username, password.as_deref()),
            Auth::ApiKey(key) => req.header("Authorization", format!("ApiKey {key}")),
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder, body: &Value) -> Result<Value, StoreError> {
        let resp = req.json(body).send().await.map_err(|e| self.classify(e))?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| self.classify(e))?;

        if !status.is_success() {
            let reason = error_reason(&text);
            warn!(status = status.as_u16(), %reason, "Elasticsearch request failed");
            return Err(StoreError::Api { status: status.as_u16(), reason });
        }

        serde_json::from_str(&text).map_err(|e| StoreError::Parse(e.to_string()))
    }

    fn classify(&self, err: reqwest::Error) -> StoreError {
        if err.is_timeout() {
            StoreError::Timeout(self.timeout)
        } else {
            StoreError::Http(err)
        }
    }

    async fn run_esql(&self, esql: &str) -> Result<QueryResult, StoreError> {
        debug!(query = %esql, "ES|QL");
        let resp = self.send(self.post("_query"), &json!({ "query": esql })).await?;
        parse_esql_response(&resp)
    }

    async fn run_search(&self, query: &SearchQuery) -> Result<QueryResult, StoreError> {
        debug!(index = %query.index, term = %query.term, "search");
        let path = format!("{}/_search", query.index);
        let resp = self.send(self.post(&path), &query.to_request_body()).await?;
        parse_search_response(&resp, &query.source_fields)
    }
}

#[async_trait]
impl EventStore for ElasticsearchStore {
    async fn execute(&self, query: &Query) -> Result<QueryResult, StoreError> {
        match query {
            Query::Aggregate(q) => self.run_esql(&q.to_esql()).await,
            Query::Search(q) => self.run_search(q).await,
        }
    }

    fn backend_name(&self) -> &str {
        "elasticsearch"
    }
}

#[async_trait]
impl ReferenceStore for ElasticsearchStore {
    async fn lookup(&self, entity_id: &str) -> Result<Vec<ReferenceEntity>, StoreError> {
        let body = json!({
            "query": { "term": { "service_name": entity_id } },
            "size": REFERENCE_LOOKUP_SIZE,
        });
        let path = format!("{}/_search", self.reference_index);
        let resp = self.send(self.post(&path), &body).await?;
        parse_reference_hits(&resp)
    }
}

// ── Response parsing ──────────────────────────────────────────

/// Pull the most useful message out of an Elasticsearch error body.
fn error_reason(body: &str) -> String {
    let Ok(v) = serde_json::from_str::<Value>(body) else {
        return body.trim().to_string();
    };
    v["error"]["root_cause"][0]["reason"]
        .as_str()
        .or_else(|| v["error"]["reason"].as_str())
        .or_else(|| v["error"].as_str())
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string())
}

fn parse_esql_response(resp: &Value) -> Result<QueryResult, StoreError> {
    let columns = resp["columns"]
        .as_array()
        .ok_or_else(|| StoreError::Parse("ES|QL response has no columns".into()))?
        .iter()
        .map(|c| {
            let name = c["name"]
                .as_str()
                .ok_or_else(|| StoreError::Parse("column without name".into()))?;
            Ok(Column::new(name, c["type"].as_str().unwrap_or("unknown")))
        })
        .collect::<Result<Vec<_>, StoreError>>()?;

    let rows = match resp["values"].as_array() {
        Some(values) => values
            .iter()
            .map(|row| match row.as_array() {
                Some(cells) if cells.len() == columns.len() => Ok(cells.clone()),
                _ => Err(StoreError::Parse("row width does not match columns".into())),
            })
            .collect::<Result<Vec<_>, StoreError>>()?,
        None => Vec::new(),
    };

    Ok(QueryResult::new(columns, rows))
}

fn parse_search_response(
    resp: &Value,
    source_fields: &[String],
) -> Result<QueryResult, StoreError> {
    let hits = resp["hits"]["hits"]
        .as_array()
        .ok_or_else(|| StoreError::Parse("search response has no hits".into()))?;

    let mut columns: Vec<Column> =
        source_fields.iter().map(|f| Column::new(f, "keyword")).collect();
    columns.push(Column::new("score", "double"));

    let rows = hits
        .iter()
        .map(|hit| {
            let source = &hit["_source"];
            let mut row: Vec<Value> = source_fields
                .iter()
                .map(|f| source.get(f).cloned().unwrap_or(Value::Null))
                .collect();
            row.push(hit["_score"].clone());
            row
        })
        .collect();

    Ok(QueryResult::new(columns, rows))
}

fn parse_reference_hits(resp: &Value) -> Result<Vec<ReferenceEntity>, StoreError> {
    let hits = resp["hits"]["hits"]
        .as_array()
        .ok_or_else(|| StoreError::Parse("search response has no hits".into()))?;

    hits.iter()
        .map(|hit| {
            serde_json::from_value(hit["_source"].clone())
                .map_err(|e| StoreError::Parse(format!("reference record: {e}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(api_key: Option<&str>, username: Option<&str>) -> ElasticConfig {
        ElasticConfig {
            endpoint: "http://es:9200/".into(),
            username: username.map(String::from),
            password: Some("pw".into()),
            api_key: api_key.map(String::from),
            timeout_secs: 5,
        }
    }

    #[test]
    fn api_key_wins_over_basic_auth() {
        let store =
            ElasticsearchStore::new(&config(Some("abc"), Some("elastic")), "service-inventory")
                .unwrap();
        assert!(matches!(store.auth, Auth::ApiKey(ref k) if k == "abc"));
        assert_eq!(store.endpoint, "http://es:9200");

        let store =
            ElasticsearchStore::new(&config(None, Some("elastic")), "service-inventory").unwrap();
        assert!(matches!(store.auth, Auth::Basic { ref username, .. } if username == "elastic"));

        let store = ElasticsearchStore::new(&config(None, None), "service-inventory").unwrap();
        assert!(matches!(store.auth, Auth::None));
        assert_eq!(store.backend_name(), "elasticsearch");
    }

    #[test]
    fn parses_esql_columns_and_values() {
        let resp = json!({
            "columns": [
                { "name": "error_count", "type": "long" },
                { "name": "service_name", "type": "keyword" }
            ],
            "values": [[42, "payment-service"], [12, "auth-service"]]
        });
        let r = parse_esql_response(&resp).unwrap();
        assert_eq!(r.column_names(), vec!["error_count", "service_name"]);
        assert_eq!(r.columns[0].data_type, "long");
        assert_eq!(r.get_value(1, "service_name"), Some(&json!("auth-service")));
    }

    #[test]
    fn esql_rejects_ragged_rows() {
        let resp = json!({
            "columns": [{ "name": "a", "type": "long" }],
            "values": [[1, 2]]
        });
        assert!(matches!(parse_esql_response(&resp), Err(StoreError::Parse(_))));
        assert!(matches!(parse_esql_response(&json!({})), Err(StoreError::Parse(_))));
    }

    #[test]
    fn search_hits_become_rows_with_score() {
        let resp = json!({
            "hits": { "hits": [
                { "_score": 7.5, "_source": { "title": "DB pool", "solution": "restart" } }
            ] }
        });
        let fields = vec!["title".to_string(), "commands".to_string()];
        let r = parse_search_response(&resp, &fields).unwrap();
        assert_eq!(r.column_names(), vec!["title", "commands", "score"]);
        assert_eq!(r.rows[0], vec![json!("DB pool"), Value::Null, json!(7.5)]);
    }

    #[test]
    fn reference_hits_deserialize() {
        let resp = json!({
            "hits": { "hits": [
                { "_source": {
                    "service_name": "payment-service",
                    "team": "payments",
                    "oncall_slack_channel": "#payments-oncall",
                    "criticality": "critical",
                    "pagerduty_service_id": "P123"
                } }
            ] }
        });
        let refs = parse_reference_hits(&resp).unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].team.as_deref(), Some("payments"));
        assert_eq!(refs[0].pagerduty_service_id.as_deref(), Some("P123"));
    }

    #[test]
    fn error_reason_prefers_root_cause() {
        let body = r#"{"error":{"root_cause":[{"reason":"Unknown index [nope]"}],
            "reason":"outer"},"status":400}"#;
        assert_eq!(error_reason(body), "Unknown index [nope]");
        assert_eq!(error_reason(r#"{"error":{"reason":"outer"}}"#), "outer");
        assert_eq!(error_reason("gateway timeout "), "gateway timeout");
    }
}
