use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rl_admission::{bucket_starts, check_quota, AdmissionError, QuotaLedger, QuotaRequest, UsageSnapshot};

use crate::directory::lock;

type Key = (String, String);

#[derive(Default)]
struct Buckets {
    minute: HashMap<(Key, DateTime<Utc>), i64>,
    day: HashMap<(Key, NaiveDate), i64>,
}

/// Quota ledger whose atomicity unit is one mutex. Counts every call that
/// reached the ledger so tests can assert "no quota consumed".
#[derive(Default)]
pub struct MemoryQuotaLedger {
    buckets: Mutex<Buckets>,
    calls: Mutex<u64>,
    fail: Mutex<Option<AdmissionError>>,
}

impl MemoryQuotaLedger {
    /// Calls that charged or were refused (no-op calls excluded).
    pub fn calls(&self) -> u64 {
        *lock(&self.calls)
    }

    /// Make every consume return `err` (e.g. `Timeout`) until cleared.
    pub fn fail_with(&self, err: Option<AdmissionError>) {
        *lock(&self.fail) = err;
    }
}

#[async_trait]
impl QuotaLedger for MemoryQuotaLedger {
    async fn consume(&self, req: &QuotaRequest) -> Result<(), AdmissionError> {
        if req.is_noop() {
            return Ok(());
        }
        *lock(&self.calls) += 1;
        if let Some(err) = lock(&self.fail).clone() {
            return Err(err);
        }

        let (minute, day) = bucket_starts(req.now);
        let key: Key = (req.fetcher_id.clone(), req.key_id.clone());
        let mut b = lock(&self.buckets);
        let m_used = b.minute.get(&(key.clone(), minute)).copied().unwrap_or(0);
        let d_used = b.day.get(&(key.clone(), day)).copied().unwrap_or(0);
        check_quota(m_used, d_used, req.items, req.caps)?;
        *b.minute.entry((key.clone(), minute)).or_default() += req.items;
        *b.day.entry((key, day)).or_default() += req.items;
        Ok(())
    }

    async fn usage(&self, fetcher_id: &str, key_id: &str, now: DateTime<Utc>) -> Result<UsageSnapshot> {
        let (minute, day) = bucket_starts(now);
        let key: Key = (fetcher_id.to_string(), key_id.to_string());
        let b = lock(&self.buckets);
        Ok(UsageSnapshot {
            minute_used: b.minute.get(&(key.clone(), minute)).copied().unwrap_or(0),
            day_used: b.day.get(&(key, day)).copied().unwrap_or(0),
        })
    }
}
