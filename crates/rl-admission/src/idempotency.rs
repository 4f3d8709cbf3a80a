use std::collections::HashMap;

use async_trait::async_trait;

/// Lookup of external ids a fetcher has already submitted.
///
/// The answer is advisory. Two racing submissions of the same id can both
/// see "absent"; the storage unique constraint on (fetcher, external id)
/// decides which one lands.
#[async_trait]
pub trait IdempotencyIndex: Send + Sync {
    /// Map of `external_id -> seq` for every id in `external_ids` already
    /// ingested by `fetcher_id`. Absent ids are simply missing from the map.
    /// Implementations return an empty map for empty input without I/O.
    async fn existing_sequences(
        &self,
        fetcher_id: &str,
        external_ids: &[String],
    ) -> anyhow::Result<HashMap<String, i64>>;
}
