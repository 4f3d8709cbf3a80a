use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rl_admission::{IdempotencyIndex, IngestOutcome, IngestWriter};
use rl_broadcast::{ReportQuery, ReportReader, ReportSource};
use rl_schemas::{normalize_brand_name, NewIngestItem, Report, ReportAnalysis, ReportWithAnalysis};
use uuid::Uuid;

use crate::directory::lock;

struct Row {
    report: ReportWithAnalysis,
    visible: bool,
    image: Option<Vec<u8>>,
}

impl Row {
    fn matches(&self, query: &ReportQuery) -> bool {
        let has_class = |c: &str| self.report.analysis.iter().any(|a| a.classification == c);
        match query {
            ReportQuery::Latest { classification } => has_class(classification),
            ReportQuery::ByReporter {
                reporter_id,
                classification,
            } => self.report.report.id == *reporter_id && has_class(classification),
            ReportQuery::Near { area, classification } => {
                area.contains(self.report.report.latitude, self.report.report.longitude) && has_class(classification)
            }
            ReportQuery::ByBrand { brand_key } => self
                .report
                .analysis
                .iter()
                .any(|a| normalize_brand_name(&a.brand_name) == *brand_key),
        }
    }
}

#[derive(Default)]
struct Inner {
    next_seq: i64,
    rows: BTreeMap<i64, Row>,
    raw: HashMap<(String, String), i64>,
    fail_polls: u32,
    index_lookups: u64,
}

/// Report table, provenance index and live-feed source in one.
#[derive(Default)]
pub struct MemoryReportStore {
    inner: Mutex<Inner>,
}

impl MemoryReportStore {
    /// Append a report that passes the visibility rules. Returns its seq.
    pub fn push_visible(&self, description: &str) -> i64 {
        self.push(description, true)
    }

    /// Append a report the feed must not show (low score, private, moderated).
    pub fn push_hidden(&self, description: &str) -> i64 {
        self.push(description, false)
    }

    /// Append a visible report after letting `edit` adjust the sample row.
    pub fn push_visible_with(&self, description: &str, edit: impl FnOnce(&mut ReportWithAnalysis)) -> i64 {
        let mut g = lock(&self.inner);
        g.next_seq += 1;
        let seq = g.next_seq;
        let mut report = sample_row(seq, description);
        edit(&mut report);
        g.rows.insert(seq, Row {
            report,
            visible: true,
            image: None,
        });
        seq
    }

    fn push(&self, description: &str, visible: bool) -> i64 {
        let mut g = lock(&self.inner);
        g.next_seq += 1;
        let seq = g.next_seq;
        g.rows.insert(seq, Row {
            report: sample_row(seq, description),
            visible,
            image: None,
        });
        seq
    }

    pub fn set_image(&self, seq: i64, bytes: &[u8]) {
        if let Some(row) = lock(&self.inner).rows.get_mut(&seq) {
            row.image = Some(bytes.to_vec());
        }
    }

    /// Fail the next `n` feed polls.
    pub fn fail_next_polls(&self, n: u32) {
        lock(&self.inner).fail_polls = n;
    }

    pub fn report_count(&self) -> usize {
        lock(&self.inner).rows.len()
    }

    pub fn index_lookups(&self) -> u64 {
        lock(&self.inner).index_lookups
    }
}

pub fn sample_row(seq: i64, description: &str) -> ReportWithAnalysis {
    let now = Utc::now();
    ReportWithAnalysis {
        report: Report {
            seq,
            timestamp: now,
            id: Uuid::new_v4().to_string(),
            latitude: 47.37,
            longitude: 8.54,
            description: description.to_string(),
        },
        analysis: vec![ReportAnalysis {
            seq,
            source: "vision".into(),
            title: description.to_string(),
            description: description.to_string(),
            brand_name: String::new(),
            brand_display_name: String::new(),
            litter_probability: 0.9,
            hazard_probability: 0.1,
            severity_level: 0.4,
            summary: description.to_string(),
            language: "en".into(),
            classification: "physical".into(),
            created_at: now,
        }],
    }
}

#[async_trait]
impl ReportSource for MemoryReportStore {
    async fn latest_seq(&self) -> Result<i64> {
        Ok(lock(&self.inner).rows.keys().next_back().copied().unwrap_or(0))
    }

    async fn visible_since(&self, after_seq: i64, limit: i64) -> Result<Vec<ReportWithAnalysis>> {
        let mut g = lock(&self.inner);
        if g.fail_polls > 0 {
            g.fail_polls -= 1;
            anyhow::bail!("report store unavailable");
        }
        Ok(g.rows
            .range(after_seq + 1..)
            .filter(|(_, r)| r.visible)
            .take(limit.max(1) as usize)
            .map(|(_, r)| r.report.clone())
            .collect())
    }
}

#[async_trait]
impl ReportReader for MemoryReportStore {
    async fn find_visible(&self, query: &ReportQuery, limit: i64) -> Result<Vec<ReportWithAnalysis>> {
        let g = lock(&self.inner);
        let mut out: Vec<ReportWithAnalysis> = g
            .rows
            .values()
            .rev()
            .filter(|r| r.visible && r.matches(query))
            .take(limit.max(1) as usize)
            .map(|r| r.report.clone())
            .collect();
        out.reverse();
        Ok(out)
    }

    async fn visible_by_seq(&self, seq: i64) -> Result<Option<ReportWithAnalysis>> {
        Ok(lock(&self.inner)
            .rows
            .get(&seq)
            .filter(|r| r.visible)
            .map(|r| r.report.clone()))
    }

    async fn visible_image(&self, seq: i64) -> Result<Option<Vec<u8>>> {
        Ok(lock(&self.inner)
            .rows
            .get(&seq)
            .filter(|r| r.visible)
            .and_then(|r| r.image.clone()))
    }
}

#[async_trait]
impl IdempotencyIndex for MemoryReportStore {
    async fn existing_sequences(&self, fetcher_id: &str, external_ids: &[String]) -> Result<HashMap<String, i64>> {
        if external_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let mut g = lock(&self.inner);
        g.index_lookups += 1;
        Ok(external_ids
            .iter()
            .filter_map(|id| {
                g.raw
                    .get(&(fetcher_id.to_string(), id.clone()))
                    .map(|seq| (id.clone(), *seq))
            })
            .collect())
    }
}

#[async_trait]
impl IngestWriter for MemoryReportStore {
    async fn insert_new(&self, fetcher_id: &str, items: &[NewIngestItem]) -> Result<Vec<IngestOutcome>> {
        let mut g = lock(&self.inner);
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let k = (fetcher_id.to_string(), item.source_id.clone());
            if let Some(seq) = g.raw.get(&k) {
                out.push(IngestOutcome {
                    source_id: item.source_id.clone(),
                    report_seq: *seq,
                    duplicate: true,
                });
                continue;
            }
            g.next_seq += 1;
            let seq = g.next_seq;
            let mut row = sample_row(seq, &item.description);
            row.analysis.clear();
            // ingested rows are unanalysed shadow rows: never on the feed
            g.rows.insert(seq, Row {
                report: row,
                visible: false,
                image: None,
            });
            g.raw.insert(k, seq);
            out.push(IngestOutcome {
                source_id: item.source_id.clone(),
                report_seq: seq,
                duplicate: false,
            });
        }
        Ok(out)
    }
}
