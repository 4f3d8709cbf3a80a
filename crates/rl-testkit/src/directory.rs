use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rl_admission::{generate_credential, hash_secret, FetcherDirectory, KeyPrefix, DEFAULT_KEY_SCOPES};
use rl_schemas::{Fetcher, FetcherKey, FetcherStatus, KeyStatus};

#[derive(Default)]
pub struct MemoryDirectory {
    fetchers: Mutex<HashMap<String, Fetcher>>,
    keys: Mutex<HashMap<String, FetcherKey>>,
    fail: Mutex<bool>,
}

/// What to mint with [`MemoryDirectory::issue`].
#[derive(Debug, Clone)]
pub struct KeySpec {
    pub fetcher_id: String,
    pub prefix: KeyPrefix,
    pub scopes: Vec<String>,
    pub fetcher_per_minute: i64,
    pub fetcher_daily: i64,
    pub key_per_minute: Option<i64>,
    pub key_daily: Option<i64>,
}

impl KeySpec {
    pub fn new(fetcher_id: &str, prefix: KeyPrefix) -> Self {
        Self {
            fetcher_id: fetcher_id.to_string(),
            prefix,
            scopes: DEFAULT_KEY_SCOPES.iter().map(|s| s.to_string()).collect(),
            fetcher_per_minute: 20,
            fetcher_daily: 200,
            key_per_minute: None,
            key_daily: None,
        }
    }

    pub fn caps(mut self, per_minute: i64, daily: i64) -> Self {
        self.fetcher_per_minute = per_minute;
        self.fetcher_daily = daily;
        self
    }

    pub fn scopes(mut self, scopes: &[&str]) -> Self {
        self.scopes = scopes.iter().map(|s| s.to_string()).collect();
        self
    }
}

#[derive(Debug, Clone)]
pub struct IssuedKey {
    pub fetcher_id: String,
    pub key_id: String,
    pub token: String,
}

impl MemoryDirectory {
    /// Create (or replace) the fetcher and mint one key for it.
    pub fn issue(&self, spec: KeySpec) -> Result<IssuedKey> {
        let issued = generate_credential(spec.prefix);
        let key = FetcherKey {
            key_id: issued.key_id.clone(),
            fetcher_id: spec.fetcher_id.clone(),
            key_prefix: spec.prefix.as_str().to_string(),
            key_hash: hash_secret(&issued.secret)?,
            status: KeyStatus::Active,
            scopes: spec.scopes,
            per_minute_cap_items: spec.key_per_minute,
            daily_cap_items: spec.key_daily,
            created_at: Utc::now(),
            last_used_at: None,
        };
        let fetcher = Fetcher {
            fetcher_id: spec.fetcher_id.clone(),
            name: spec.fetcher_id.clone(),
            owner_type: "internal".into(),
            status: FetcherStatus::Active,
            tier: 0,
            reputation_score: 50,
            per_minute_cap_items: spec.fetcher_per_minute,
            daily_cap_items: spec.fetcher_daily,
            last_seen_at: None,
        };
        lock(&self.fetchers).insert(fetcher.fetcher_id.clone(), fetcher);
        lock(&self.keys).insert(key.key_id.clone(), key);
        Ok(IssuedKey {
            fetcher_id: spec.fetcher_id,
            key_id: issued.key_id,
            token: issued.token,
        })
    }

    pub fn revoke(&self, key_id: &str) {
        if let Some(k) = lock(&self.keys).get_mut(key_id) {
            k.status = KeyStatus::Revoked;
        }
    }

    pub fn set_fetcher_status(&self, fetcher_id: &str, status: FetcherStatus) {
        if let Some(f) = lock(&self.fetchers).get_mut(fetcher_id) {
            f.status = status;
        }
    }

    /// Make every lookup fail until called again with `false`.
    pub fn fail_lookups(&self, fail: bool) {
        *lock(&self.fail) = fail;
    }
}

#[async_trait]
impl FetcherDirectory for MemoryDirectory {
    async fn lookup_key(&self, key_id: &str) -> Result<Option<(FetcherKey, Fetcher)>> {
        if *lock(&self.fail) {
            anyhow::bail!("directory unavailable");
        }
        let Some(key) = lock(&self.keys).get(key_id).cloned() else {
            return Ok(None);
        };
        Ok(lock(&self.fetchers)
            .get(&key.fetcher_id)
            .cloned()
            .map(|f| (key, f)))
    }
}

pub(crate) fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
