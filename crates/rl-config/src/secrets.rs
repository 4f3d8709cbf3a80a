//! Runtime secret resolution.
//!
//! # Contract
//! - Config YAML stores only env var NAMES (e.g. `database.url_env: RL_DATABASE_URL`).
//! - Callers invoke [`resolve_secrets`] once at startup and pass the result
//!   into constructors; no other module reads these env vars.
//! - `Debug` redacts values. Error messages name the variable, never the value.

use anyhow::{bail, Result};

use crate::settings::ListenerConfig;

#[derive(Clone)]
pub struct ResolvedSecrets {
    pub database_url: String,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("database_url", &"<REDACTED>")
            .finish()
    }
}

/// Resolve a named environment variable. Blank counts as unset.
fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Resolve every secret the daemon needs. The database URL is required.
pub fn resolve_secrets(cfg: &ListenerConfig) -> Result<ResolvedSecrets> {
    let var = &cfg.database.url_env;
    let Some(database_url) = resolve_env(var) else {
        bail!("SECRETS_MISSING: required env var '{var}' (database url) is not set or empty");
    };
    Ok(ResolvedSecrets { database_url })
}
