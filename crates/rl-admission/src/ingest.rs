use async_trait::async_trait;
use rl_schemas::NewIngestItem;

/// Result of writing one new item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    pub source_id: String,
    pub report_seq: i64,
    /// Another request stored this id first; `report_seq` is the earlier row.
    pub duplicate: bool,
}

/// Write side of ingestion. Pairs with [`crate::IdempotencyIndex`]: the index
/// filters known ids up front, and the writer resolves any race that slips
/// past it via the (fetcher, external id) unique constraint.
#[async_trait]
pub trait IngestWriter: Send + Sync {
    /// Insert all items in one transaction, returning one outcome per item in
    /// input order.
    async fn insert_new(
        &self,
        fetcher_id: &str,
        items: &[NewIngestItem],
    ) -> anyhow::Result<Vec<IngestOutcome>>;
}
