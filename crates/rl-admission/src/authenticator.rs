//! Credential → fetcher identity, status, scopes and effective caps.

use std::sync::Arc;
use std::time::Duration;

use rl_schemas::{Fetcher, FetcherKey, FetcherStatus, KeyStatus};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::caps::EffectiveCaps;
use crate::credential::{parse_credential, KeyEnvironment};
use crate::directory::{FetcherDirectory, TouchSink};
use crate::error::AdmissionError;
use crate::scopes::ScopeSet;
use crate::secret_hash::verify_secret;

/// Outcome of a successful authentication.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub fetcher: Fetcher,
    pub key: FetcherKey,
    pub scopes: ScopeSet,
    pub caps: EffectiveCaps,
}

impl AuthContext {
    pub fn fetcher_id(&self) -> &str {
        &self.fetcher.fetcher_id
    }

    pub fn key_id(&self) -> &str {
        &self.key.key_id
    }
}

pub struct Authenticator {
    directory: Arc<dyn FetcherDirectory>,
    touch: Arc<dyn TouchSink>,
    environment: KeyEnvironment,
    hash_timeout: Duration,
}

impl Authenticator {
    pub fn new(
        directory: Arc<dyn FetcherDirectory>,
        touch: Arc<dyn TouchSink>,
        environment: KeyEnvironment,
        hash_timeout: Duration,
    ) -> Self {
        Self {
            directory,
            touch,
            environment,
            hash_timeout,
        }
    }

    pub fn environment(&self) -> KeyEnvironment {
        self.environment
    }

    /// Authenticate a raw credential (the token after `Bearer `).
    ///
    /// Checks run in a fixed order and the first failure wins: structure,
    /// environment prefix, lookup, stored prefix, key status, fetcher status,
    /// secret, scopes.
    pub async fn authenticate(
        &self,
        raw: &str,
        required_scopes: &[&str],
    ) -> Result<AuthContext, AdmissionError> {
        let parsed = parse_credential(raw.trim()).ok_or(AdmissionError::InvalidCredential)?;
        if !self.environment.allows(parsed.prefix) {
            debug!(key_id = %parsed.key_id, "credential prefix not accepted in this environment");
            return Err(AdmissionError::InvalidCredential);
        }

        let (key, fetcher) = self
            .directory
            .lookup_key(&parsed.key_id)
            .await
            .map_err(|e| {
                warn!(key_id = %parsed.key_id, error = %e, "fetcher key lookup failed");
                AdmissionError::persistence(e)
            })?
            .ok_or(AdmissionError::InvalidCredential)?;

        let prefix_matches: bool = key
            .key_prefix
            .as_bytes()
            .ct_eq(parsed.prefix.as_str().as_bytes())
            .into();
        if !prefix_matches {
            return Err(AdmissionError::InvalidCredential);
        }

        if key.status != KeyStatus::Active {
            return Err(AdmissionError::KeyRevoked);
        }
        if fetcher.status == FetcherStatus::Suspended {
            return Err(AdmissionError::FetcherSuspended);
        }

        self.verify(parsed.secret, key.key_hash.clone()).await?;

        let scopes = ScopeSet::from_granted(&key.scopes);
        let missing = scopes.missing(required_scopes);
        if !missing.is_empty() {
            return Err(AdmissionError::InsufficientScope { missing });
        }

        let caps = EffectiveCaps::resolve(&key, &fetcher);
        self.touch.touch(&fetcher.fetcher_id, &key.key_id);

        Ok(AuthContext {
            fetcher,
            key,
            scopes,
            caps,
        })
    }

    async fn verify(&self, secret: String, stored: String) -> Result<(), AdmissionError> {
        let job = tokio::task::spawn_blocking(move || verify_secret(&secret, &stored));
        match tokio::time::timeout(self.hash_timeout, job).await {
            Ok(Ok(true)) => Ok(()),
            Ok(Ok(false)) => Err(AdmissionError::InvalidCredential),
            Ok(Err(join)) => Err(AdmissionError::persistence(join)),
            Err(_) => {
                warn!(timeout_ms = self.hash_timeout.as_millis() as u64, "secret verification timed out");
                Err(AdmissionError::Timeout {
                    operation: "secret verification",
                })
            }
        }
    }
}
