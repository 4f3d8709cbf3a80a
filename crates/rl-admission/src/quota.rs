//! Quota accounting contract.
//!
//! Usage is counted per (fetcher, key) in minute and day buckets. A
//! [`QuotaLedger`] must make check-and-increment atomic across every service
//! instance sharing the store; the Postgres ledger holds row locks for it.

use async_trait::async_trait;
use chrono::{DateTime, DurationRound, NaiveDate, Utc};

use crate::caps::EffectiveCaps;
use crate::error::AdmissionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaWindow {
    Minute,
    Day,
}

impl QuotaWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaWindow::Minute => "per-minute",
            QuotaWindow::Day => "daily",
        }
    }

    /// Whole seconds until this window's bucket rolls over (at least 1).
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> i64 {
        let (minute, day) = bucket_starts(now);
        let next = match self {
            QuotaWindow::Minute => minute + chrono::Duration::minutes(1),
            QuotaWindow::Day => day
                .succ_opt()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|d| d.and_utc())
                .unwrap_or(now + chrono::Duration::days(1)),
        };
        let ms = (next - now).num_milliseconds();
        ((ms + 999) / 1000).max(1)
    }
}

/// Bucket keys for `now`: start of the UTC minute and the UTC date.
pub fn bucket_starts(now: DateTime<Utc>) -> (DateTime<Utc>, NaiveDate) {
    let minute = now
        .duration_trunc(chrono::Duration::minutes(1))
        .unwrap_or(now);
    (minute, now.date_naive())
}

/// Decide whether `requested` more items fit in both windows.
///
/// The minute window is checked first, so it is the one reported when both
/// would overflow.
pub fn check_quota(
    minute_used: i64,
    day_used: i64,
    requested: i64,
    caps: EffectiveCaps,
) -> Result<(), AdmissionError> {
    if requested <= 0 {
        return Ok(());
    }
    for (window, used, cap) in [
        (QuotaWindow::Minute, minute_used, caps.per_minute),
        (QuotaWindow::Day, day_used, caps.daily),
    ] {
        if !cap.admits(used, requested) {
            return Err(AdmissionError::QuotaExceeded {
                window,
                used,
                cap: cap.as_i64(),
                requested,
            });
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct QuotaRequest {
    pub fetcher_id: String,
    pub key_id: String,
    pub now: DateTime<Utc>,
    pub items: i64,
    pub caps: EffectiveCaps,
}

impl QuotaRequest {
    /// Nothing to charge: ledgers return `Ok` without touching storage.
    pub fn is_noop(&self) -> bool {
        self.items <= 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageSnapshot {
    pub minute_used: i64,
    pub day_used: i64,
}

/// Atomic check-and-increment of usage buckets.
#[async_trait]
pub trait QuotaLedger: Send + Sync {
    /// Charge `req.items` to both buckets or to neither.
    ///
    /// Errors are `QuotaExceeded`, or `Timeout`/`Persistence` which deny.
    async fn consume(&self, req: &QuotaRequest) -> Result<(), AdmissionError>;

    /// Current usage for introspection. Missing buckets read as zero.
    async fn usage(
        &self,
        fetcher_id: &str,
        key_id: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<UsageSnapshot>;
}
