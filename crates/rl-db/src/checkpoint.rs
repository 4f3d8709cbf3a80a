use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

/// Stored checkpoint for `service_name`, if any.
pub async fn load(pool: &PgPool, service_name: &str) -> Result<Option<i64>> {
    let row: Option<(i64,)> =
        sqlx::query_as("select last_processed_seq from service_state where service_name = $1")
            .bind(service_name)
            .fetch_optional(pool)
            .await
            .context("load checkpoint failed")?;
    Ok(row.map(|(seq,)| seq))
}

pub async fn store(pool: &PgPool, service_name: &str, seq: i64) -> Result<()> {
    sqlx::query(
        r#"
        insert into service_state (service_name, last_processed_seq, updated_at)
        values ($1, $2, now())
        on conflict (service_name) do update
           set last_processed_seq = excluded.last_processed_seq,
               updated_at = excluded.updated_at
        "#,
    )
    .bind(service_name)
    .bind(seq)
    .execute(pool)
    .await
    .context("store checkpoint failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct CheckpointRow {
    pub service_name: String,
    pub last_processed_seq: i64,
    pub updated_at: DateTime<Utc>,
}

pub async fn list(pool: &PgPool) -> Result<Vec<CheckpointRow>> {
    let rows: Vec<(String, i64, DateTime<Utc>)> = sqlx::query_as(
        "select service_name, last_processed_seq, updated_at from service_state order by service_name",
    )
    .fetch_all(pool)
    .await
    .context("list checkpoints failed")?;
    Ok(rows
        .into_iter()
        .map(|(service_name, last_processed_seq, updated_at)| CheckpointRow {
            service_name,
            last_processed_seq,
            updated_at,
        })
        .collect())
}
