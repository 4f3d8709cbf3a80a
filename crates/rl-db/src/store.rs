use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rl_admission::{
    AdmissionError, FetcherDirectory, IdempotencyIndex, IngestOutcome, IngestWriter, QuotaLedger,
    QuotaRequest, UsageSnapshot,
};
use rl_audit::SideEffectStore;
use rl_broadcast::{CheckpointStore, ReportQuery, ReportReader, ReportSource};
use rl_schemas::{Fetcher, FetcherKey, IngestionAuditRecord, NewIngestItem, ReportWithAnalysis};
use sqlx::PgPool;

use crate::{audit, checkpoint, fetchers, quota, reports};

/// Postgres-backed implementation of every storage contract.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    quota_timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, quota_timeout: Duration) -> Self {
        Self { pool, quota_timeout }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl FetcherDirectory for PgStore {
    async fn lookup_key(&self, key_id: &str) -> Result<Option<(FetcherKey, Fetcher)>> {
        fetchers::lookup_key(&self.pool, key_id).await
    }
}

#[async_trait]
impl QuotaLedger for PgStore {
    async fn consume(&self, req: &QuotaRequest) -> Result<(), AdmissionError> {
        quota::consume(&self.pool, req, self.quota_timeout).await
    }

    async fn usage(&self, fetcher_id: &str, key_id: &str, now: DateTime<Utc>) -> Result<UsageSnapshot> {
        quota::usage(&self.pool, fetcher_id, key_id, now).await
    }
}

#[async_trait]
impl IdempotencyIndex for PgStore {
    async fn existing_sequences(&self, fetcher_id: &str, external_ids: &[String]) -> Result<HashMap<String, i64>> {
        reports::existing_sequences(&self.pool, fetcher_id, external_ids).await
    }
}

#[async_trait]
impl IngestWriter for PgStore {
    async fn insert_new(&self, fetcher_id: &str, items: &[NewIngestItem]) -> Result<Vec<IngestOutcome>> {
        reports::insert_new(&self.pool, fetcher_id, items).await
    }
}

#[async_trait]
impl ReportSource for PgStore {
    async fn latest_seq(&self) -> Result<i64> {
        reports::latest_seq(&self.pool).await
    }

    async fn visible_since(&self, after_seq: i64, limit: i64) -> Result<Vec<ReportWithAnalysis>> {
        reports::visible_since(&self.pool, after_seq, limit).await
    }
}

#[async_trait]
impl ReportReader for PgStore {
    async fn find_visible(&self, query: &ReportQuery, limit: i64) -> Result<Vec<ReportWithAnalysis>> {
        reports::find_visible(&self.pool, query, limit).await
    }

    async fn visible_by_seq(&self, seq: i64) -> Result<Option<ReportWithAnalysis>> {
        reports::visible_by_seq(&self.pool, seq).await
    }

    async fn visible_image(&self, seq: i64) -> Result<Option<Vec<u8>>> {
        reports::visible_image(&self.pool, seq).await
    }
}

#[async_trait]
impl CheckpointStore for PgStore {
    async fn load(&self, service_name: &str) -> Result<Option<i64>> {
        checkpoint::load(&self.pool, service_name).await
    }

    async fn store(&self, service_name: &str, seq: i64) -> Result<()> {
        checkpoint::store(&self.pool, service_name, seq).await
    }
}

#[async_trait]
impl SideEffectStore for PgStore {
    async fn insert_audit(&self, record: &IngestionAuditRecord) -> Result<()> {
        audit::insert_ingestion_audit(&self.pool, record).await
    }

    async fn touch(&self, fetcher_id: &str, key_id: &str, at: DateTime<Utc>) -> Result<()> {
        fetchers::touch(&self.pool, fetcher_id, key_id, at).await
    }
}
