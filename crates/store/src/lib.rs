//! Event store boundary.
//!
//! This crate provides:
//! - A structured query model (`AggregateQuery`, `SearchQuery`) with ES|QL rendering
//! - `EventStore` / `ReferenceStore` traits so callers stay backend-agnostic
//! - An Elasticsearch HTTP backend and an in-memory backend
//! - `QueryResult`, the uniform tabular result every backend returns

pub mod elasticsearch;
pub mod error;
pub mod memory;
pub mod query;
pub mod reference;
pub mod result;

use async_trait::async_trait;

pub use elasticsearch::ElasticsearchStore;
pub use error::StoreError;
pub use memory::MemoryStore;
pub use query::{
    AggFn, AggregateQuery, Aggregation, Condition, Predicate, Query, SearchQuery, Sort, TimeRange,
    WeightedField,
};
pub use reference::ReferenceEntity;
pub use result::{Column, QueryResult};

/// Executes catalog queries against the event store.
///
/// Implementations never panic on bad input or transport trouble: every
/// failure comes back as a [`StoreError`]. No retries happen here.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn execute(&self, query: &Query) -> Result<QueryResult, StoreError>;

    /// Short backend name for logs.
    fn backend_name(&self) -> &str;
}

/// Point lookups against the service reference dataset.
#[async_trait]
pub trait ReferenceStore: Send + Sync {
    /// All reference records whose `service_name` equals `entity_id` exactly.
    async fn lookup(&self, entity_id: &str) -> Result<Vec<ReferenceEntity>, StoreError>;
}
