//! Request and response types for all rl-daemon HTTP endpoints.
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded
//! by Axum and decoded by tests.  No business logic lives here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Stable machine-readable code, e.g. "invalid_credential", "quota_exceeded".
    pub code: String,
}

// ---------------------------------------------------------------------------
// /health  /api/v3/reports/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerHealthResponse {
    /// "healthy" once the cursor is initialized, otherwise "starting".
    pub status: String,
    pub service: String,
    pub timestamp: DateTime<Utc>,
    pub connected_clients: usize,
    pub last_broadcast_seq: i64,
    pub last_processed_seq: Option<i64>,
}

// ---------------------------------------------------------------------------
// /api/v3/reports/image
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageResponse {
    /// Standard base64 of the stored bytes.
    pub image: String,
}

// ---------------------------------------------------------------------------
// /v1/fetchers/me
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapsView {
    /// 0 means unlimited.
    pub per_minute_cap_items: i64,
    pub daily_cap_items: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageView {
    pub minute_used: i64,
    pub daily_used: i64,
    /// `None` when the daily cap is unlimited.
    pub daily_remaining: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherMeResponse {
    pub fetcher_id: String,
    pub name: String,
    pub owner_type: String,
    pub status: String,
    pub tier: i32,
    pub reputation_score: i32,
    pub key_id: String,
    pub caps: CapsView,
    pub usage: UsageView,
    pub scopes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_seen_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// /v1/reports:bulkIngest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkIngestItem {
    #[serde(default)]
    pub source_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    /// RFC 3339. Unparsable values are ignored.
    #[serde(default)]
    pub collected_at: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub agent_version: Option<String>,
    #[serde(default)]
    pub source_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkIngestRequest {
    #[serde(default)]
    pub items: Vec<BulkIngestItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Accepted,
    Duplicate,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkIngestItemResult {
    pub source_id: String,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub report_seq: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub visibility: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub trust_level: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkIngestResponse {
    pub items: Vec<BulkIngestItemResult>,
    pub submitted: usize,
    pub accepted: usize,
    pub duplicates: usize,
    pub rejected: usize,
}
