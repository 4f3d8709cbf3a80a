use anyhow::{Context, Result};
use rl_schemas::IngestionAuditRecord;
use sqlx::PgPool;

/// Append one ingestion audit row.
pub async fn insert_ingestion_audit(pool: &PgPool, rec: &IngestionAuditRecord) -> Result<()> {
    let reasons = serde_json::to_value(&rec.reject_reasons).context("encode reject_reasons")?;
    sqlx::query(
        r#"
        insert into ingestion_audit (
          fetcher_id, key_id, endpoint, items_submitted, items_accepted, items_rejected,
          reject_reasons, latency_ms, remote_ip, user_agent, request_id
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11
        )
        "#,
    )
    .bind(&rec.fetcher_id)
    .bind(&rec.key_id)
    .bind(&rec.endpoint)
    .bind(rec.items_submitted)
    .bind(rec.items_accepted)
    .bind(rec.items_rejected)
    .bind(reasons)
    .bind(rec.latency_ms)
    .bind(&rec.remote_ip)
    .bind(&rec.user_agent)
    .bind(&rec.request_id)
    .execute(pool)
    .await
    .context("insert_ingestion_audit failed")?;
    Ok(())
}
