//! Admission control for fetcher ingestion.
//!
//! Everything here is pure logic or a storage contract. Postgres
//! implementations live in `rl-db`, in-memory ones in `rl-testkit`.
//!
//! Every failure path denies: an error while proving a request is allowed is
//! never treated as permission.

pub mod authenticator;
pub mod caps;
pub mod credential;
pub mod directory;
pub mod error;
pub mod idempotency;
pub mod ingest;
pub mod quota;
pub mod scopes;
pub mod secret_hash;

pub use authenticator::{AuthContext, Authenticator};
pub use caps::{resolve_cap, Cap, EffectiveCaps};
pub use credential::{
    bearer_token, generate_credential, parse_credential, IssuedCredential, KeyEnvironment,
    KeyPrefix, ParsedCredential,
};
pub use directory::{FetcherDirectory, NoopTouch, TouchSink};
pub use error::AdmissionError;
pub use idempotency::IdempotencyIndex;
pub use ingest::{IngestOutcome, IngestWriter};
pub use quota::{bucket_starts, check_quota, QuotaLedger, QuotaRequest, QuotaWindow, UsageSnapshot};
pub use scopes::{ScopeSet, DEFAULT_KEY_SCOPES, SCOPE_FETCHER_READ, SCOPE_REPORT_SUBMIT};
pub use secret_hash::{hash_secret, verify_secret};
