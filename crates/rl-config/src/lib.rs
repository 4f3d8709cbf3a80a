//! rl-config
//!
//! Layered YAML configuration for the report-listener services.
//!
//! - Documents merge in order: earlier docs are base, later docs override.
//! - Secret values never live in YAML. The config stores env var NAMES and
//!   [`secrets::resolve_secrets`] reads them once at startup.
//! - The merged document is hashed (SHA-256 over canonical JSON) so every log
//!   line at boot can name the exact config in effect.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;

pub mod secrets;
pub mod settings;

pub use settings::{
    AdmissionSettings, BroadcastSettings, DatabaseSettings, IngestSettings, ListenerConfig,
    ServiceSettings, SlowClientPolicy,
};

/// Env var holding a comma-separated list of YAML paths in merge order.
pub const ENV_CONFIG_PATHS: &str = "RL_CONFIG";

/// If any leaf string value in the effective config starts with one of these,
/// loading aborts with CONFIG_SECRET_DETECTED.
const SECRET_PREFIXES: &[&str] = &[
    "cleanapp_fk_live_", // fetcher credentials
    "cleanapp_fk_test_",
    "postgres://", // connection strings carry passwords
    "postgresql://",
    "$argon2",    // stored key hashes
    "sk_live",    // Stripe live
    "sk_test",    // Stripe test
    "AKIA",       // AWS access key ID
    "-----BEGIN", // PEM private keys
];

/// Every JSON-pointer prefix read by [`ListenerConfig::from_config_json`] or
/// [`secrets::resolve_secrets`]. Leaves outside these prefixes are unused.
const CONSUMED_POINTERS: &[&str] = &[
    "/service/name",
    "/service/bind_addr",
    "/database/url_env",
    "/database/max_connections",
    "/fetcher_keys/environment",
    "/broadcast/interval_ms",
    "/broadcast/batch_limit",
    "/broadcast/client_queue_capacity",
    "/broadcast/hub_queue_capacity",
    "/broadcast/slow_client_policy",
    "/admission/hash_timeout_ms",
    "/admission/quota_timeout_ms",
    "/admission/side_effect_queue_capacity",
    "/ingest/max_batch_items",
    "/ingest/max_body_bytes",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

/// Load and merge YAML files in order.
pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }

    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

/// Load from `RL_CONFIG` when set; otherwise an empty document (all defaults).
pub fn load_from_env() -> Result<LoadedConfig> {
    match std::env::var(ENV_CONFIG_PATHS) {
        Ok(raw) if !raw.trim().is_empty() => {
            let paths: Vec<&str> = raw
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .collect();
            load_layered_yaml(&paths)
        }
        _ => load_layered_yaml_from_strings(&[]),
    }
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        // An empty YAML document deserializes to null; treat it as "no overrides".
        if v_json.is_null() {
            continue;
        }
        merged = deep_merge(merged, v_json);
    }

    enforce_no_secret_literals(&merged)?;

    let canonical_json = serde_json::to_string(&merged).context("canonical json serialize failed")?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

/// Report leaves the services never read (typos, stale keys).
///
/// `Warn` logs and returns the sorted list; `Fail` errors when it is non-empty.
pub fn report_unused_keys(config_json: &Value, policy: UnusedKeyPolicy) -> Result<Vec<String>> {
    let consumed: BTreeSet<&str> = CONSUMED_POINTERS.iter().copied().collect();

    let mut leaves: Vec<String> = Vec::new();
    collect_leaf_pointers(config_json, "", &mut leaves);

    let mut unused: Vec<String> = leaves
        .into_iter()
        .filter(|lp| !consumed.iter().any(|cp| is_prefix_pointer(cp, lp)))
        .collect();
    unused.sort();
    unused.dedup();

    if !unused.is_empty() {
        match policy {
            UnusedKeyPolicy::Fail => bail!(
                "CONFIG_UNUSED_KEYS: {} unused config leaf key(s): {:?}",
                unused.len(),
                unused
            ),
            UnusedKeyPolicy::Warn => {
                tracing::warn!(unused = ?unused, "config contains unused keys");
            }
        }
    }

    Ok(unused)
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

/// "/a/b" consumes "/a/b" and "/a/b/c" but NOT "/a/bc".
fn is_prefix_pointer(prefix: &str, leaf: &str) -> bool {
    if leaf == prefix {
        return true;
    }
    leaf.strip_prefix(prefix)
        .map(|rest| rest.starts_with('/'))
        .unwrap_or(false)
}

fn collect_leaf_pointers(v: &Value, prefix: &str, out: &mut Vec<String>) {
    match v {
        Value::Object(map) => {
            for (k, vv) in map.iter() {
                let next = format!("{}/{}", prefix, escape_pointer_token(k));
                collect_leaf_pointers(vv, &next, out);
            }
        }
        Value::Array(arr) => {
            for (i, vv) in arr.iter().enumerate() {
                let next = format!("{}/{}", prefix, i);
                collect_leaf_pointers(vv, &next, out);
            }
        }
        _ => {
            if !prefix.is_empty() {
                out.push(prefix.to_string());
            }
        }
    }
}

fn escape_pointer_token(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn enforce_no_secret_literals(v: &Value) -> Result<()> {
    let mut leaves = Vec::new();
    collect_leaf_pointers(v, "", &mut leaves);

    for ptr in leaves {
        if let Some(s) = v.pointer(&ptr).and_then(Value::as_str) {
            if looks_like_secret(s) {
                bail!("CONFIG_SECRET_DETECTED leaf={} value=REDACTED", ptr);
            }
        }
    }
    Ok(())
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    if t.len() < 8 {
        return false;
    }
    SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_docs_override_earlier() {
        let base = "broadcast:\n  interval_ms: 1000\n  batch_limit: 500\n";
        let over = "broadcast:\n  interval_ms: 250\n";
        let cfg = load_layered_yaml_from_strings(&[base, over]).unwrap();
        assert_eq!(cfg.config_json["broadcast"]["interval_ms"], 250);
        assert_eq!(cfg.config_json["broadcast"]["batch_limit"], 500);
    }

    #[test]
    fn hash_is_stable_for_identical_input() {
        let doc = "service:\n  name: report-listener\n";
        let a = load_layered_yaml_from_strings(&[doc]).unwrap();
        let b = load_layered_yaml_from_strings(&[doc]).unwrap();
        assert_eq!(a.config_hash, b.config_hash);
        assert_eq!(a.config_hash.len(), 64);
    }

    #[test]
    fn credential_literal_is_rejected() {
        let doc = "database:\n  url_env: \"postgres://user:pw@db/rl\"\n";
        let err = load_layered_yaml_from_strings(&[doc]).unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("CONFIG_SECRET_DETECTED"));
        assert!(!msg.contains("pw@db"), "value must be redacted");
    }

    #[test]
    fn empty_document_is_allowed() {
        let cfg = load_layered_yaml_from_strings(&["", "---\n"]).unwrap();
        assert_eq!(cfg.config_json, serde_json::json!({}));
    }

    #[test]
    fn unused_keys_are_reported() {
        let doc = "broadcast:\n  interval_ms: 10\n  intervl_ms: 20\n";
        let cfg = load_layered_yaml_from_strings(&[doc]).unwrap();
        let unused = report_unused_keys(&cfg.config_json, UnusedKeyPolicy::Warn).unwrap();
        assert_eq!(unused, vec!["/broadcast/intervl_ms".to_string()]);
        assert!(report_unused_keys(&cfg.config_json, UnusedKeyPolicy::Fail).is_err());
    }

    #[test]
    fn pointer_prefix_respects_boundaries() {
        assert!(is_prefix_pointer("/a/b", "/a/b"));
        assert!(is_prefix_pointer("/a/b", "/a/b/c"));
        assert!(!is_prefix_pointer("/a/b", "/a/bc"));
    }
}
