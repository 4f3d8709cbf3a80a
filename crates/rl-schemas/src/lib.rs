use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Fetchers and keys
// ---------------------------------------------------------------------------

/// Lifecycle status of a fetcher. Unknown stored values parse as `Suspended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetcherStatus {
    Active,
    Limited,
    Suspended,
}

impl FetcherStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetcherStatus::Active => "active",
            FetcherStatus::Limited => "limited",
            FetcherStatus::Suspended => "suspended",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => FetcherStatus::Active,
            "limited" => FetcherStatus::Limited,
            _ => FetcherStatus::Suspended,
        }
    }
}

/// Status of one API key. Unknown stored values parse as `Revoked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Active,
    Revoked,
}

impl KeyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyStatus::Active => "active",
            KeyStatus::Revoked => "revoked",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => KeyStatus::Active,
            _ => KeyStatus::Revoked,
        }
    }
}

/// A submitting tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fetcher {
    pub fetcher_id: String,
    pub name: String,
    pub owner_type: String,
    pub status: FetcherStatus,
    pub tier: i32,
    pub reputation_score: i32,
    pub per_minute_cap_items: i64,
    pub daily_cap_items: i64,
    pub last_seen_at: Option<DateTime<Utc>>,
}

/// A hashed credential owned by exactly one fetcher.
///
/// `key_hash` is a PHC string; the plaintext secret is never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherKey {
    pub key_id: String,
    pub fetcher_id: String,
    pub key_prefix: String,
    #[serde(skip_serializing, default)]
    pub key_hash: String,
    pub status: KeyStatus,
    pub scopes: Vec<String>,
    /// Per-key overrides. `None` or `<= 0` falls back to the fetcher default.
    pub per_minute_cap_items: Option<i64>,
    pub daily_cap_items: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub seq: i64,
    pub timestamp: DateTime<Utc>,
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportAnalysis {
    pub seq: i64,
    pub source: String,
    pub title: String,
    pub description: String,
    pub brand_name: String,
    pub brand_display_name: String,
    pub litter_probability: f64,
    pub hazard_probability: f64,
    pub severity_level: f64,
    pub summary: String,
    pub language: String,
    pub classification: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportWithAnalysis {
    pub report: Report,
    pub analysis: Vec<ReportAnalysis>,
}

impl ReportWithAnalysis {
    pub fn seq(&self) -> i64 {
        self.report.seq
    }
}

/// One ordered slice of visible reports. The default is the empty batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportBatch {
    pub reports: Vec<ReportWithAnalysis>,
    pub count: usize,
    pub from_seq: i64,
    pub to_seq: i64,
}

impl ReportBatch {
    /// Build a batch from rows already ordered ascending by seq.
    ///
    /// Returns `None` for an empty slice. `to_seq` is the maximum seq present,
    /// not the last element, so ties and unordered input cannot move it back.
    pub fn from_ordered(reports: Vec<ReportWithAnalysis>) -> Option<Self> {
        let from_seq = reports.first()?.seq();
        let to_seq = reports.iter().map(|r| r.seq()).max()?;
        Some(Self {
            count: reports.len(),
            reports,
            from_seq,
            to_seq,
        })
    }
}

/// Envelope pushed to live-feed subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: ReportBatch,
    pub timestamp: DateTime<Utc>,
}

impl BroadcastMessage {
    pub fn reports(batch: ReportBatch, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: "reports".to_string(),
            data: batch,
            timestamp,
        }
    }
}

/// What the hub does with a subscriber whose outbound queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlowClientPolicy {
    /// Drop the subscriber when its outbound queue is full.
    Disconnect,
    /// Keep the subscriber but skip this message for it.
    Skip,
}

impl SlowClientPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disconnect" => Some(SlowClientPolicy::Disconnect),
            "skip" => Some(SlowClientPolicy::Skip),
            _ => None,
        }
    }
}

/// Canonical form of a brand name as stored in `report_analysis.brand_name`.
///
/// Lowercase, with separators, punctuation, `&`, the word `and` and all
/// whitespace removed, so "Coca-Cola" and "coca cola" compare equal.
pub fn normalize_brand_name(brand: &str) -> String {
    let mut s = brand.to_lowercase();
    for sep in ["-", "_", ".", ",", "&", "and"] {
        s = s.replace(sep, "");
    }
    s.split_whitespace().collect()
}

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

/// One item of a bulk submission after validation, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct NewIngestItem {
    pub source_id: String,
    pub title: String,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    pub collected_at: Option<DateTime<Utc>>,
    pub agent_id: Option<String>,
    pub agent_version: Option<String>,
    pub source_type: Option<String>,
}

/// Append-only record of one ingestion call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestionAuditRecord {
    pub fetcher_id: Option<String>,
    pub key_id: Option<String>,
    pub endpoint: String,
    pub items_submitted: i64,
    pub items_accepted: i64,
    pub items_rejected: i64,
    pub reject_reasons: BTreeMap<String, i64>,
    pub latency_ms: i64,
    pub remote_ip: Option<String>,
    pub user_agent: Option<String>,
    pub request_id: Option<String>,
}
