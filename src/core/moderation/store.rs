// Record store port - read-only access to the external content collection.
//
// The pipeline only ever reads: point lookup, owner query, full scan. Write
// access to the collection is deliberately absent from this trait.

use super::models::ContentRecord;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    /// Transient failure - the orchestrator retries these.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Malformed filter or continuation token. Not retried.
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

/// One bounded page of records plus the cursor for the next page.
#[derive(Debug, Clone, Default)]
pub struct RecordPage {
    pub records: Vec<ContentRecord>,
    /// Opaque continuation token; `None` means the result set is exhausted.
    pub next_token: Option<String>,
}

/// Abstraction over the backing key-value/document store.
///
/// A complete sweep over `scan_all` pages yields every record exactly once,
/// absent concurrent mutation of the underlying collection. No ordering is
/// guaranteed across pages beyond that.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Point lookup by record id.
    async fn get_by_id(&self, id: &str) -> Result<ContentRecord, StoreError>;

    /// Bounded page of records belonging to one owner. Pass the returned
    /// token back to fetch the next page.
    #[allow(dead_code)]
    async fn query_by_owner(
        &self,
        owner: &str,
        token: Option<&str>,
    ) -> Result<RecordPage, StoreError>;

    /// One page of a full collection scan. `None` starts from the beginning;
    /// the returned token resumes where this page left off.
    async fn scan_all(&self, token: Option<&str>) -> Result<RecordPage, StoreError>;
}
