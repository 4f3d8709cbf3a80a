//! In-memory implementations of the storage contracts.
//!
//! They keep the same observable semantics as the Postgres store (atomic
//! quota charge, per-fetcher idempotency keys, ascending feed order) so
//! scenario tests and the daemon's router tests run without a database.

pub mod directory;
pub mod quota;
pub mod reports;
pub mod state;

pub use directory::{IssuedKey, KeySpec, MemoryDirectory};
pub use quota::MemoryQuotaLedger;
pub use reports::MemoryReportStore;
pub use state::{MemoryCheckpoints, MemorySideEffects};
