//! Per-item validation for bulk ingest.
//!
//! Pure functions only; the handler in `routes.rs` owns I/O ordering.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rl_schemas::NewIngestItem;

use crate::api_types::BulkIngestItem;

pub const MAX_SOURCE_ID_BYTES: usize = 255;
pub const MAX_TITLE_BYTES: usize = 255;
pub const MAX_DESCRIPTION_BYTES: usize = 8192;
pub const MAX_AGENT_ID_BYTES: usize = 255;
pub const MAX_AGENT_VERSION_BYTES: usize = 64;
pub const MAX_SOURCE_TYPE_BYTES: usize = 32;

pub const REASON_SOURCE_ID_REQUIRED: &str = "source_id is required";
pub const REASON_SOURCE_ID_TOO_LONG: &str = "source_id too long";
pub const REASON_DUPLICATE_IN_BATCH: &str = "duplicate source_id in batch";

/// Truncate to at most `max` bytes without splitting a character.
pub fn clamp(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

fn clamp_opt(s: Option<&str>, max: usize) -> Option<String> {
    s.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| clamp(s, max))
}

fn parse_rfc3339(s: Option<&str>) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s?.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Outcome of validating one submitted item.
#[derive(Debug, Clone, PartialEq)]
pub enum Prepared {
    Valid(NewIngestItem),
    Rejected { source_id: String, reason: &'static str },
}

pub fn prepare_item(raw: &BulkIngestItem) -> Prepared {
    let source_id = raw.source_id.trim();
    if source_id.is_empty() {
        return Prepared::Rejected {
            source_id: String::new(),
            reason: REASON_SOURCE_ID_REQUIRED,
        };
    }
    if source_id.len() > MAX_SOURCE_ID_BYTES {
        return Prepared::Rejected {
            source_id: source_id.to_string(),
            reason: REASON_SOURCE_ID_TOO_LONG,
        };
    }

    let title = clamp(&raw.title, MAX_TITLE_BYTES);
    let mut description = clamp(&raw.description, MAX_DESCRIPTION_BYTES);
    if description.is_empty() {
        description = title.clone();
    }

    Prepared::Valid(NewIngestItem {
        source_id: source_id.to_string(),
        title,
        description,
        latitude: raw.lat.unwrap_or(0.0),
        longitude: raw.lng.unwrap_or(0.0),
        collected_at: parse_rfc3339(raw.collected_at.as_deref()),
        agent_id: clamp_opt(raw.agent_id.as_deref(), MAX_AGENT_ID_BYTES),
        agent_version: clamp_opt(raw.agent_version.as_deref(), MAX_AGENT_VERSION_BYTES),
        source_type: clamp_opt(raw.source_type.as_deref(), MAX_SOURCE_TYPE_BYTES),
    })
}

/// Validate a whole batch in input order. A source_id repeated within the
/// batch is accepted once and rejected on later occurrences.
pub fn prepare_batch(items: &[BulkIngestItem]) -> Vec<Prepared> {
    let mut seen = HashSet::new();
    items
        .iter()
        .map(|raw| match prepare_item(raw) {
            Prepared::Valid(item) if !seen.insert(item.source_id.clone()) => Prepared::Rejected {
                source_id: item.source_id,
                reason: REASON_DUPLICATE_IN_BATCH,
            },
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(source_id: &str) -> BulkIngestItem {
        BulkIngestItem {
            source_id: source_id.to_string(),
            title: "t".into(),
            ..Default::default()
        }
    }

    #[test]
    fn clamp_respects_char_boundaries() {
        assert_eq!(clamp("héllo", 2), "h");
        assert_eq!(clamp("héllo", 3), "hé");
        assert_eq!(clamp("abc", 10), "abc");
    }

    #[test]
    fn missing_and_oversized_source_ids_are_rejected() {
        assert_eq!(
            prepare_item(&raw("   ")),
            Prepared::Rejected {
                source_id: String::new(),
                reason: REASON_SOURCE_ID_REQUIRED
            }
        );
        let long = "x".repeat(MAX_SOURCE_ID_BYTES + 1);
        assert!(matches!(
            prepare_item(&raw(&long)),
            Prepared::Rejected { reason: REASON_SOURCE_ID_TOO_LONG, .. }
        ));
        assert!(matches!(
            prepare_item(&raw(&"x".repeat(MAX_SOURCE_ID_BYTES))),
            Prepared::Valid(_)
        ));
    }

    #[test]
    fn description_falls_back_to_title_and_fields_are_clamped() {
        let item = BulkIngestItem {
            source_id: " s-1 ".into(),
            title: "a".repeat(300),
            description: String::new(),
            collected_at: Some("2026-01-02T03:04:05Z".into()),
            source_type: Some("x".repeat(40)),
            agent_id: Some("  ".into()),
            ..Default::default()
        };
        let Prepared::Valid(p) = prepare_item(&item) else {
            panic!("expected valid");
        };
        assert_eq!(p.source_id, "s-1");
        assert_eq!(p.title.len(), MAX_TITLE_BYTES);
        assert_eq!(p.description, p.title);
        assert_eq!(p.source_type.as_deref().map(str::len), Some(MAX_SOURCE_TYPE_BYTES));
        assert_eq!(p.agent_id, None);
        assert!(p.collected_at.is_some());
    }

    #[test]
    fn bad_timestamp_is_ignored() {
        let item = BulkIngestItem {
            collected_at: Some("yesterday".into()),
            ..raw("s")
        };
        let Prepared::Valid(p) = prepare_item(&item) else {
            panic!("expected valid");
        };
        assert_eq!(p.collected_at, None);
    }

    #[test]
    fn repeated_source_id_in_one_batch() {
        let out = prepare_batch(&[raw("a"), raw("b"), raw("a")]);
        assert!(matches!(out[0], Prepared::Valid(_)));
        assert!(matches!(out[1], Prepared::Valid(_)));
        assert!(matches!(
            out[2],
            Prepared::Rejected { reason: REASON_DUPLICATE_IN_BATCH, .. }
        ));
    }
}
