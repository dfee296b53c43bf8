use std::time::Duration;

/// Errors surfaced by an [`EventStore`](crate::EventStore) or
/// [`ReferenceStore`](crate::ReferenceStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("store request timed out after {0:?}")]
    Timeout(Duration),

    #[error("store returned {status}: {reason}")]
    Api { status: u16, reason: String },

    #[error("malformed store response: {0}")]
    Parse(String),

    #[error("query rejected: {0}")]
    Query(String),
}
