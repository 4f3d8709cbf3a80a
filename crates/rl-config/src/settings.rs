//! Typed view over the merged config JSON.
//!
//! Every field has a default so an empty document yields a runnable service.
//! Values that are present but malformed are errors, not silently defaulted.

use std::time::Duration;

use anyhow::{bail, Context, Result};
pub use rl_schemas::SlowClientPolicy;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Identity of this instance's checkpoint row in `service_state`.
    pub name: String,
    pub bind_addr: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    /// NAME of the env var holding the connection string.
    pub url_env: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct BroadcastSettings {
    pub interval: Duration,
    pub batch_limit: i64,
    pub client_queue_capacity: usize,
    pub hub_queue_capacity: usize,
    pub slow_client_policy: SlowClientPolicy,
}

#[derive(Debug, Clone)]
pub struct AdmissionSettings {
    /// Raw environment tag: live/prod/production, test/dev/development, or empty.
    pub key_environment: String,
    pub hash_timeout: Duration,
    pub quota_timeout: Duration,
    pub side_effect_queue_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub max_batch_items: usize,
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub service: ServiceSettings,
    pub database: DatabaseSettings,
    pub broadcast: BroadcastSettings,
    pub admission: AdmissionSettings,
    pub ingest: IngestSettings,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            service: ServiceSettings {
                name: "report-listener".to_string(),
                bind_addr: "0.0.0.0:8080".to_string(),
            },
            database: DatabaseSettings {
                url_env: "RL_DATABASE_URL".to_string(),
                max_connections: 10,
            },
            broadcast: BroadcastSettings {
                interval: Duration::from_secs(1),
                batch_limit: 500,
                client_queue_capacity: 64,
                hub_queue_capacity: 256,
                slow_client_policy: SlowClientPolicy::Disconnect,
            },
            admission: AdmissionSettings {
                key_environment: String::new(),
                hash_timeout: Duration::from_secs(2),
                quota_timeout: Duration::from_secs(3),
                side_effect_queue_capacity: 1024,
            },
            ingest: IngestSettings {
                max_batch_items: 100,
                max_body_bytes: 1 << 20,
            },
        }
    }
}

impl ListenerConfig {
    pub fn from_config_json(cfg: &Value) -> Result<Self> {
        let d = Self::default();

        Ok(Self {
            service: ServiceSettings {
                name: read_str(cfg, "/service/name")?.unwrap_or(d.service.name),
                bind_addr: read_str(cfg, "/service/bind_addr")?.unwrap_or(d.service.bind_addr),
            },
            database: DatabaseSettings {
                url_env: read_str(cfg, "/database/url_env")?.unwrap_or(d.database.url_env),
                max_connections: read_positive(cfg, "/database/max_connections")?
                    .map(|v| v as u32)
                    .unwrap_or(d.database.max_connections),
            },
            broadcast: BroadcastSettings {
                interval: read_positive(cfg, "/broadcast/interval_ms")?
                    .map(Duration::from_millis)
                    .unwrap_or(d.broadcast.interval),
                batch_limit: read_positive(cfg, "/broadcast/batch_limit")?
                    .map(|v| v as i64)
                    .unwrap_or(d.broadcast.batch_limit),
                client_queue_capacity: read_positive(cfg, "/broadcast/client_queue_capacity")?
                    .map(|v| v as usize)
                    .unwrap_or(d.broadcast.client_queue_capacity),
                hub_queue_capacity: read_positive(cfg, "/broadcast/hub_queue_capacity")?
                    .map(|v| v as usize)
                    .unwrap_or(d.broadcast.hub_queue_capacity),
                slow_client_policy: match read_str(cfg, "/broadcast/slow_client_policy")? {
                    Some(s) => SlowClientPolicy::parse(&s).with_context(|| {
                        format!("broadcast.slow_client_policy: expected disconnect|skip, got '{s}'")
                    })?,
                    None => d.broadcast.slow_client_policy,
                },
            },
            admission: AdmissionSettings {
                key_environment: read_str(cfg, "/fetcher_keys/environment")?
                    .unwrap_or(d.admission.key_environment),
                hash_timeout: read_positive(cfg, "/admission/hash_timeout_ms")?
                    .map(Duration::from_millis)
                    .unwrap_or(d.admission.hash_timeout),
                quota_timeout: read_positive(cfg, "/admission/quota_timeout_ms")?
                    .map(Duration::from_millis)
                    .unwrap_or(d.admission.quota_timeout),
                side_effect_queue_capacity: read_positive(
                    cfg,
                    "/admission/side_effect_queue_capacity",
                )?
                .map(|v| v as usize)
                .unwrap_or(d.admission.side_effect_queue_capacity),
            },
            ingest: IngestSettings {
                max_batch_items: read_positive(cfg, "/ingest/max_batch_items")?
                    .map(|v| v as usize)
                    .unwrap_or(d.ingest.max_batch_items),
                max_body_bytes: read_positive(cfg, "/ingest/max_body_bytes")?
                    .map(|v| v as usize)
                    .unwrap_or(d.ingest.max_body_bytes),
            },
        })
    }
}

fn read_str(cfg: &Value, pointer: &str) -> Result<Option<String>> {
    match cfg.pointer(pointer) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let t = s.trim();
            Ok(if t.is_empty() { None } else { Some(t.to_string()) })
        }
        Some(other) => bail!("config {pointer}: expected string, got {other}"),
    }
}

fn read_positive(cfg: &Value, pointer: &str) -> Result<Option<u64>> {
    match cfg.pointer(pointer) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => {
            let n = v
                .as_u64()
                .with_context(|| format!("config {pointer}: expected positive integer, got {v}"))?;
            if n == 0 {
                bail!("config {pointer}: must be > 0");
            }
            Ok(Some(n))
        }
    }
}
