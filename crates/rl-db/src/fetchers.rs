use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rl_schemas::{Fetcher, FetcherKey, FetcherStatus, KeyStatus};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

#[derive(Debug, Clone)]
pub struct NewFetcher {
    pub fetcher_id: String,
    pub name: String,
    pub owner_type: String,
    pub status: FetcherStatus,
    pub per_minute_cap_items: i64,
    pub daily_cap_items: i64,
}

#[derive(Debug, Clone)]
pub struct NewFetcherKey {
    pub key_id: String,
    pub fetcher_id: String,
    pub key_prefix: String,
    pub key_hash: String,
    pub scopes: Vec<String>,
    pub per_minute_cap_items: Option<i64>,
    pub daily_cap_items: Option<i64>,
}

pub async fn insert_fetcher(pool: &PgPool, f: &NewFetcher) -> Result<()> {
    sqlx::query(
        r#"
        insert into fetchers (
          fetcher_id, name, owner_type, status, per_minute_cap_items, daily_cap_items
        ) values (
          $1, $2, $3, $4, $5, $6
        )
        "#,
    )
    .bind(&f.fetcher_id)
    .bind(&f.name)
    .bind(&f.owner_type)
    .bind(f.status.as_str())
    .bind(f.per_minute_cap_items)
    .bind(f.daily_cap_items)
    .execute(pool)
    .await
    .context("insert_fetcher failed")?;
    Ok(())
}

pub async fn insert_key(pool: &PgPool, k: &NewFetcherKey) -> Result<()> {
    sqlx::query(
        r#"
        insert into fetcher_keys (
          key_id, fetcher_id, key_prefix, key_hash, scopes, per_minute_cap_items, daily_cap_items
        ) values (
          $1, $2, $3, $4, $5, $6, $7
        )
        "#,
    )
    .bind(&k.key_id)
    .bind(&k.fetcher_id)
    .bind(&k.key_prefix)
    .bind(&k.key_hash)
    .bind(&k.scopes)
    .bind(k.per_minute_cap_items)
    .bind(k.daily_cap_items)
    .execute(pool)
    .await
    .context("insert_key failed")?;
    Ok(())
}

/// Returns `false` if no active key matched.
pub async fn revoke_key(pool: &PgPool, key_id: &str) -> Result<bool> {
    let res = sqlx::query(
        r#"
        update fetcher_keys
           set status = 'revoked', revoked_at = now()
         where key_id = $1 and status <> 'revoked'
        "#,
    )
    .bind(key_id)
    .execute(pool)
    .await
    .context("revoke_key failed")?;
    Ok(res.rows_affected() > 0)
}

pub async fn set_fetcher_status(pool: &PgPool, fetcher_id: &str, status: FetcherStatus) -> Result<bool> {
    let res = sqlx::query(
        "update fetchers set status = $2, updated_at = now() where fetcher_id = $1",
    )
    .bind(fetcher_id)
    .bind(status.as_str())
    .execute(pool)
    .await
    .context("set_fetcher_status failed")?;
    Ok(res.rows_affected() > 0)
}

/// One joined read: key plus owning fetcher.
pub async fn lookup_key(pool: &PgPool, key_id: &str) -> Result<Option<(FetcherKey, Fetcher)>> {
    let row = sqlx::query(
        r#"
        select k.key_id, k.fetcher_id, k.key_prefix, k.key_hash, k.status as key_status,
               k.scopes, k.per_minute_cap_items as key_per_minute, k.daily_cap_items as key_daily,
               k.created_at, k.last_used_at,
               f.name, f.owner_type, f.status as fetcher_status, f.tier, f.reputation_score,
               f.per_minute_cap_items, f.daily_cap_items, f.last_seen_at
          from fetcher_keys k
          join fetchers f on f.fetcher_id = k.fetcher_id
         where k.key_id = $1
        "#,
    )
    .bind(key_id)
    .fetch_optional(pool)
    .await
    .context("lookup_key failed")?;

    row.map(|r| decode_key_and_fetcher(&r)).transpose()
}

fn decode_key_and_fetcher(r: &PgRow) -> Result<(FetcherKey, Fetcher)> {
    let key_status: String = r.try_get("key_status")?;
    let fetcher_status: String = r.try_get("fetcher_status")?;
    let fetcher_id: String = r.try_get("fetcher_id")?;

    let key = FetcherKey {
        key_id: r.try_get("key_id")?,
        fetcher_id: fetcher_id.clone(),
        key_prefix: r.try_get("key_prefix")?,
        key_hash: r.try_get("key_hash")?,
        status: KeyStatus::parse(&key_status),
        scopes: r.try_get("scopes")?,
        per_minute_cap_items: r.try_get("key_per_minute")?,
        daily_cap_items: r.try_get("key_daily")?,
        created_at: r.try_get("created_at")?,
        last_used_at: r.try_get("last_used_at")?,
    };
    let fetcher = Fetcher {
        fetcher_id,
        name: r.try_get("name")?,
        owner_type: r.try_get("owner_type")?,
        status: FetcherStatus::parse(&fetcher_status),
        tier: r.try_get("tier")?,
        reputation_score: r.try_get("reputation_score")?,
        per_minute_cap_items: r.try_get("per_minute_cap_items")?,
        daily_cap_items: r.try_get("daily_cap_items")?,
        last_seen_at: r.try_get("last_seen_at")?,
    };
    Ok((key, fetcher))
}

/// Keys of one fetcher, newest first. Hashes are not loaded.
pub async fn list_keys(pool: &PgPool, fetcher_id: &str) -> Result<Vec<FetcherKey>> {
    let rows = sqlx::query(
        r#"
        select key_id, fetcher_id, key_prefix, status, scopes,
               per_minute_cap_items, daily_cap_items, created_at, last_used_at
          from fetcher_keys
         where fetcher_id = $1
         order by created_at desc
        "#,
    )
    .bind(fetcher_id)
    .fetch_all(pool)
    .await
    .context("list_keys failed")?;

    rows.iter()
        .map(|r| -> Result<FetcherKey> {
            let status: String = r.try_get("status")?;
            Ok(FetcherKey {
                key_id: r.try_get("key_id")?,
                fetcher_id: r.try_get("fetcher_id")?,
                key_prefix: r.try_get("key_prefix")?,
                key_hash: String::new(),
                status: KeyStatus::parse(&status),
                scopes: r.try_get("scopes")?,
                per_minute_cap_items: r.try_get("per_minute_cap_items")?,
                daily_cap_items: r.try_get("daily_cap_items")?,
                created_at: r.try_get("created_at")?,
                last_used_at: r.try_get("last_used_at")?,
            })
        })
        .collect()
}

/// Record activity on a key and its fetcher.
pub async fn touch(pool: &PgPool, fetcher_id: &str, key_id: &str, at: DateTime<Utc>) -> Result<()> {
    let mut tx = pool.begin().await.context("touch begin failed")?;
    sqlx::query("update fetcher_keys set last_used_at = $2 where key_id = $1")
        .bind(key_id)
        .bind(at)
        .execute(&mut *tx)
        .await
        .context("touch key failed")?;
    sqlx::query("update fetchers set last_seen_at = $2 where fetcher_id = $1")
        .bind(fetcher_id)
        .bind(at)
        .execute(&mut *tx)
        .await
        .context("touch fetcher failed")?;
    tx.commit().await.context("touch commit failed")?;
    Ok(())
}
