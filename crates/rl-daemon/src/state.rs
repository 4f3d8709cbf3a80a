//! Shared runtime state for rl-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. Everything in here is a
//! handle: storage behind trait objects, the hub behind its command queue,
//! the cursor behind a watch receiver. Background tasks live in `service.rs`.

use std::sync::Arc;

use rl_admission::{Authenticator, IdempotencyIndex, IngestWriter, QuotaLedger};
use rl_audit::SideEffectQueue;
use rl_broadcast::{CursorReader, HubHandle, ReportReader, ReportSource};
use rl_config::IngestSettings;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            service: "rl-daemon",
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

pub struct AppState {
    pub build: BuildInfo,
    /// Instance identity; also the checkpoint row key.
    pub service_name: String,
    pub authenticator: Authenticator,
    pub quota: Arc<dyn QuotaLedger>,
    pub index: Arc<dyn IdempotencyIndex>,
    pub writer: Arc<dyn IngestWriter>,
    /// Public report reads.
    pub reader: Arc<dyn ReportReader>,
    /// Feed source, for catch-up reads after a known seq.
    pub feed: Arc<dyn ReportSource>,
    /// Audit rows and last-used touches, written off the request path.
    pub side_effects: SideEffectQueue,
    pub hub: HubHandle,
    pub cursor: CursorReader,
    pub ingest: IngestSettings,
}
