//! Quota buckets: atomic check-and-increment under row locks.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rl_admission::{bucket_starts, check_quota, AdmissionError, QuotaRequest, UsageSnapshot};
use sqlx::PgPool;
use tracing::warn;

const SQLSTATE_LOCK_NOT_AVAILABLE: &str = "55P03";

enum Refusal {
    Denied(AdmissionError),
    Db(sqlx::Error),
}

impl From<sqlx::Error> for Refusal {
    fn from(e: sqlx::Error) -> Self {
        Refusal::Db(e)
    }
}

fn is_lock_timeout(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some(SQLSTATE_LOCK_NOT_AVAILABLE),
        sqlx::Error::PoolTimedOut => true,
        _ => false,
    }
}

fn lock_wait_budget(timeout: Duration) -> Duration {
    (timeout / 2).max(Duration::from_millis(1))
}

/// Charge `req.items` to the minute and day buckets, or to neither.
///
/// Both bucket rows are locked `FOR UPDATE` inside one READ COMMITTED
/// transaction, so concurrent callers on any instance serialize on the row.
/// Lock waits are bounded by `lock_timeout` (half of `timeout`) and the whole
/// call by `timeout`; running out of either denies with `Timeout`.
pub async fn consume(pool: &PgPool, req: &QuotaRequest, timeout: Duration) -> Result<(), AdmissionError> {
    if req.is_noop() {
        return Ok(());
    }

    match tokio::time::timeout(timeout, consume_tx(pool, req, timeout)).await {
        Err(_) => {
            warn!(fetcher_id = %req.fetcher_id, key_id = %req.key_id, "quota check timed out");
            Err(AdmissionError::Timeout { operation: "quota check" })
        }
        Ok(Ok(())) => Ok(()),
        Ok(Err(Refusal::Denied(e))) => Err(e),
        Ok(Err(Refusal::Db(e))) if is_lock_timeout(&e) => {
            warn!(fetcher_id = %req.fetcher_id, error = %e, "quota lock wait exceeded");
            Err(AdmissionError::Timeout { operation: "quota check" })
        }
        Ok(Err(Refusal::Db(e))) => {
            warn!(fetcher_id = %req.fetcher_id, error = %e, "quota transaction failed");
            Err(AdmissionError::persistence(e))
        }
    }
}

async fn consume_tx(pool: &PgPool, req: &QuotaRequest, timeout: Duration) -> Result<(), Refusal> {
    let (minute, day) = bucket_starts(req.now);
    let mut tx = pool.begin().await?;

    sqlx::query("set transaction isolation level read committed")
        .execute(&mut *tx)
        .await?;
    // Below the outer budget so a blocked row surfaces as 55P03, not a dropped future.
    // SET does not take bind parameters; the value is an integer we produced.
    sqlx::query(&format!("set local lock_timeout = '{}ms'", lock_wait_budget(timeout).as_millis()))
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        r#"
        insert into fetcher_usage_minute (fetcher_id, key_id, bucket_start, items)
        values ($1, $2, $3, 0)
        on conflict do nothing
        "#,
    )
    .bind(&req.fetcher_id)
    .bind(&req.key_id)
    .bind(minute)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        insert into fetcher_usage_daily (fetcher_id, key_id, bucket_date, items)
        values ($1, $2, $3, 0)
        on conflict do nothing
        "#,
    )
    .bind(&req.fetcher_id)
    .bind(&req.key_id)
    .bind(day)
    .execute(&mut *tx)
    .await?;

    let (minute_used,): (i64,) = sqlx::query_as(
        r#"
        select items from fetcher_usage_minute
         where fetcher_id = $1 and key_id = $2 and bucket_start = $3
         for update
        "#,
    )
    .bind(&req.fetcher_id)
    .bind(&req.key_id)
    .bind(minute)
    .fetch_one(&mut *tx)
    .await?;

    let (day_used,): (i64,) = sqlx::query_as(
        r#"
        select items from fetcher_usage_daily
         where fetcher_id = $1 and key_id = $2 and bucket_date = $3
         for update
        "#,
    )
    .bind(&req.fetcher_id)
    .bind(&req.key_id)
    .bind(day)
    .fetch_one(&mut *tx)
    .await?;

    if let Err(denied) = check_quota(minute_used, day_used, req.items, req.caps) {
        tx.rollback().await?;
        return Err(Refusal::Denied(denied));
    }

    sqlx::query(
        r#"
        update fetcher_usage_minute set items = items + $4
         where fetcher_id = $1 and key_id = $2 and bucket_start = $3
        "#,
    )
    .bind(&req.fetcher_id)
    .bind(&req.key_id)
    .bind(minute)
    .bind(req.items)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        update fetcher_usage_daily set items = items + $4
         where fetcher_id = $1 and key_id = $2 and bucket_date = $3
        "#,
    )
    .bind(&req.fetcher_id)
    .bind(&req.key_id)
    .bind(day)
    .bind(req.items)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Current usage. Missing buckets read as zero.
pub async fn usage(pool: &PgPool, fetcher_id: &str, key_id: &str, now: DateTime<Utc>) -> Result<UsageSnapshot> {
    let (minute, day) = bucket_starts(now);
    let (minute_used, day_used): (i64, i64) = sqlx::query_as(
        r#"
        select
          coalesce((select items from fetcher_usage_minute
                     where fetcher_id = $1 and key_id = $2 and bucket_start = $3), 0)::bigint,
          coalesce((select items from fetcher_usage_daily
                     where fetcher_id = $1 and key_id = $2 and bucket_date = $4), 0)::bigint
        "#,
    )
    .bind(fetcher_id)
    .bind(key_id)
    .bind(minute)
    .bind(day)
    .fetch_one(pool)
    .await
    .context("quota usage query failed")?;

    Ok(UsageSnapshot {
        minute_used,
        day_used,
    })
}
