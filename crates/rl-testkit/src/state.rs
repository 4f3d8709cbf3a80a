use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rl_audit::SideEffectStore;
use rl_broadcast::CheckpointStore;
use rl_schemas::IngestionAuditRecord;

use crate::directory::lock;

#[derive(Default)]
pub struct MemoryCheckpoints {
    rows: Mutex<HashMap<String, i64>>,
    fail_stores: Mutex<bool>,
}

impl MemoryCheckpoints {
    pub fn with(service_name: &str, seq: i64) -> Self {
        let c = Self::default();
        lock(&c.rows).insert(service_name.to_string(), seq);
        c
    }

    pub fn get(&self, service_name: &str) -> Option<i64> {
        lock(&self.rows).get(service_name).copied()
    }

    pub fn fail_stores(&self, fail: bool) {
        *lock(&self.fail_stores) = fail;
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpoints {
    async fn load(&self, service_name: &str) -> Result<Option<i64>> {
        Ok(self.get(service_name))
    }

    async fn store(&self, service_name: &str, seq: i64) -> Result<()> {
        if *lock(&self.fail_stores) {
            anyhow::bail!("checkpoint table unavailable");
        }
        lock(&self.rows).insert(service_name.to_string(), seq);
        Ok(())
    }
}

/// Records audit rows and touches for inspection.
#[derive(Default)]
pub struct MemorySideEffects {
    audits: Mutex<Vec<IngestionAuditRecord>>,
    touches: Mutex<Vec<(String, String)>>,
}

impl MemorySideEffects {
    pub fn audits(&self) -> Vec<IngestionAuditRecord> {
        lock(&self.audits).clone()
    }

    pub fn touches(&self) -> Vec<(String, String)> {
        lock(&self.touches).clone()
    }
}

#[async_trait]
impl SideEffectStore for MemorySideEffects {
    async fn insert_audit(&self, record: &IngestionAuditRecord) -> Result<()> {
        lock(&self.audits).push(record.clone());
        Ok(())
    }

    async fn touch(&self, fetcher_id: &str, key_id: &str, _at: DateTime<Utc>) -> Result<()> {
        lock(&self.touches).push((fetcher_id.to_string(), key_id.to_string()));
        Ok(())
    }
}
