//! Report reads for the live feed and public endpoints, writes for bulk ingest.

use std::collections::HashMap;

use anyhow::{Context, Result};
use rl_admission::IngestOutcome;
use rl_broadcast::ReportQuery;
use rl_schemas::{NewIngestItem, Report, ReportAnalysis, ReportWithAnalysis};
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

/// Minimum probability for a report to count as litter or hazard.
pub const VISIBILITY_THRESHOLD: f64 = 0.5;

pub async fn latest_seq(pool: &PgPool) -> Result<i64> {
    let (seq,): (i64,) = sqlx::query_as("select coalesce(max(seq), 0)::bigint from reports")
        .fetch_one(pool)
        .await
        .context("latest_seq failed")?;
    Ok(seq)
}

/// Visibility rules shared by the feed and every public read; `$1` is the
/// score threshold and `r`/`rs` are `reports` and its `report_status` row.
///
/// Visible means: not moderated away (no status row, or status `active`),
/// at least one valid analysis at or above the litter/hazard threshold, and
/// no owner row marking it private.
const VISIBLE_PREDICATE: &str = r#"
    (rs.seq is null or rs.status = 'active')
    and exists (
          select 1 from report_analysis ra
           where ra.seq = r.seq
             and ra.is_valid = true
             and (ra.hazard_probability >= $1 or ra.litter_probability >= $1)
        )
    and not exists (
          select 1 from reports_owners ro
           where ro.seq = r.seq
             and ro.owner <> ''
             and ro.is_public = false
        )
"#;

/// Brand key as stored, folded the same way as `rl_schemas::normalize_brand_name`.
const BRAND_KEY_SQL: &str = r#"
    regexp_replace(replace(regexp_replace(lower(rb.brand_name), '[-_.,&]', '', 'g'), 'and', ''), '\s', '', 'g')
"#;

/// Report rows passing [`VISIBLE_PREDICATE`] and `filter`. Extra binds start at `$2`.
fn visible_reports_sql(filter: &str, tail: &str) -> String {
    format!(
        r#"
        select r.seq, r.ts, r.id, r.latitude, r.longitude, r.description
          from reports r
          left join report_status rs on rs.seq = r.seq
         where {VISIBLE_PREDICATE}
           and {filter}
         {tail}
        "#
    )
}

fn with_classification(binding: &str) -> String {
    format!(
        "exists (select 1 from report_analysis rc \
          where rc.seq = r.seq and rc.is_valid = true and rc.classification = {binding})"
    )
}

/// Reports after `after_seq` that may be shown publicly, ascending by seq.
///
/// Analyses are loaded in a second query; a report whose analyses vanished
/// in between is skipped.
pub async fn visible_since(pool: &PgPool, after_seq: i64, limit: i64) -> Result<Vec<ReportWithAnalysis>> {
    let sql = visible_reports_sql("r.seq > $2", "order by r.seq asc limit $3");
    let rows = sqlx::query(&sql)
        .bind(VISIBILITY_THRESHOLD)
        .bind(after_seq)
        .bind(limit.max(1))
        .fetch_all(pool)
        .await
        .context("visible_since reports query failed")?;
    with_analysis(pool, rows).await
}

/// Newest `limit` visible reports matching `query`, ascending by seq.
pub async fn find_visible(pool: &PgPool, query: &ReportQuery, limit: i64) -> Result<Vec<ReportWithAnalysis>> {
    let limit = limit.max(1);
    let rows = match query {
        ReportQuery::Latest { classification } => {
            let sql = visible_reports_sql(&with_classification("$2"), "order by r.seq desc limit $3");
            sqlx::query(&sql)
                .bind(VISIBILITY_THRESHOLD)
                .bind(classification)
                .bind(limit)
                .fetch_all(pool)
                .await
        }
        ReportQuery::ByReporter {
            reporter_id,
            classification,
        } => {
            let filter = format!("r.id = $2 and {}", with_classification("$3"));
            let sql = visible_reports_sql(&filter, "order by r.seq desc limit $4");
            sqlx::query(&sql)
                .bind(VISIBILITY_THRESHOLD)
                .bind(reporter_id)
                .bind(classification)
                .bind(limit)
                .fetch_all(pool)
                .await
        }
        ReportQuery::Near { area, classification } => {
            let filter = format!(
                "r.latitude between $2 and $3 and r.longitude between $4 and $5 and {}",
                with_classification("$6")
            );
            let sql = visible_reports_sql(&filter, "order by r.seq desc limit $7");
            sqlx::query(&sql)
                .bind(VISIBILITY_THRESHOLD)
                .bind(area.min_lat)
                .bind(area.max_lat)
                .bind(area.min_lng)
                .bind(area.max_lng)
                .bind(classification)
                .bind(limit)
                .fetch_all(pool)
                .await
        }
        ReportQuery::ByBrand { brand_key } => {
            let filter = format!(
                "exists (select 1 from report_analysis rb \
                  where rb.seq = r.seq and rb.is_valid = true and {BRAND_KEY_SQL} = $2)"
            );
            let sql = visible_reports_sql(&filter, "order by r.seq desc limit $3");
            sqlx::query(&sql)
                .bind(VISIBILITY_THRESHOLD)
                .bind(brand_key)
                .bind(limit)
                .fetch_all(pool)
                .await
        }
    }
    .with_context(|| format!("find_visible {query:?} failed"))?;

    let mut out = with_analysis(pool, rows).await?;
    out.reverse();
    Ok(out)
}

pub async fn visible_by_seq(pool: &PgPool, seq: i64) -> Result<Option<ReportWithAnalysis>> {
    let sql = visible_reports_sql("r.seq = $2", "limit 1");
    let rows = sqlx::query(&sql)
        .bind(VISIBILITY_THRESHOLD)
        .bind(seq)
        .fetch_all(pool)
        .await
        .context("visible_by_seq query failed")?;
    Ok(with_analysis(pool, rows).await?.pop())
}

pub async fn visible_image(pool: &PgPool, seq: i64) -> Result<Option<Vec<u8>>> {
    let sql = format!(
        r#"
        select r.image
          from reports r
          left join report_status rs on rs.seq = r.seq
         where {VISIBLE_PREDICATE}
           and r.seq = $2
        "#
    );
    let image: Option<(Option<Vec<u8>>,)> = sqlx::query_as(&sql)
        .bind(VISIBILITY_THRESHOLD)
        .bind(seq)
        .fetch_optional(pool)
        .await
        .context("visible_image query failed")?;
    Ok(image.and_then(|(bytes,)| bytes).filter(|b| !b.is_empty()))
}

/// Attach valid analyses to report rows, keeping row order.
async fn with_analysis(pool: &PgPool, rows: Vec<PgRow>) -> Result<Vec<ReportWithAnalysis>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let mut reports = Vec::with_capacity(rows.len());
    for r in &rows {
        reports.push(Report {
            seq: r.try_get("seq")?,
            timestamp: r.try_get("ts")?,
            id: r.try_get("id")?,
            latitude: r.try_get("latitude")?,
            longitude: r.try_get("longitude")?,
            description: r.try_get("description")?,
        });
    }
    let seqs: Vec<i64> = reports.iter().map(|r| r.seq).collect();

    let analysis_rows = sqlx::query(
        r#"
        select seq, source, title, description, brand_name, brand_display_name,
               litter_probability, hazard_probability, severity_level, summary,
               language, classification, created_at
          from report_analysis
         where seq = any($1) and is_valid = true
         order by seq asc, analysis_id asc
        "#,
    )
    .bind(&seqs)
    .fetch_all(pool)
    .await
    .context("report analysis query failed")?;

    let mut by_seq: HashMap<i64, Vec<ReportAnalysis>> = HashMap::new();
    for a in &analysis_rows {
        let analysis = ReportAnalysis {
            seq: a.try_get("seq")?,
            source: a.try_get("source")?,
            title: a.try_get("title")?,
            description: a.try_get("description")?,
            brand_name: a.try_get("brand_name")?,
            brand_display_name: a.try_get("brand_display_name")?,
            litter_probability: a.try_get("litter_probability")?,
            hazard_probability: a.try_get("hazard_probability")?,
            severity_level: a.try_get("severity_level")?,
            summary: a.try_get("summary")?,
            language: a.try_get("language")?,
            classification: a.try_get("classification")?,
            created_at: a.try_get("created_at")?,
        };
        by_seq.entry(analysis.seq).or_default().push(analysis);
    }

    Ok(reports
        .into_iter()
        .filter_map(|report| {
            let analysis = by_seq.remove(&report.seq)?;
            Some(ReportWithAnalysis { report, analysis })
        })
        .collect())
}

/// `source_id -> report_seq` for ids this fetcher already submitted.
pub async fn existing_sequences(
    pool: &PgPool,
    fetcher_id: &str,
    source_ids: &[String],
) -> Result<HashMap<String, i64>> {
    if source_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<(String, i64)> = sqlx::query_as(
        r#"
        select source_id, report_seq
          from report_raw
         where fetcher_id = $1 and source_id = any($2)
        "#,
    )
    .bind(fetcher_id)
    .bind(source_ids)
    .fetch_all(pool)
    .await
    .context("existing_sequences failed")?;
    Ok(rows.into_iter().collect())
}

/// Insert reports and their provenance rows in one transaction.
///
/// New rows enter as `shadow` visibility and `unverified` trust. If another
/// request claimed the same (fetcher, source_id) first, the just-inserted
/// report is removed and the earlier seq is returned as a duplicate.
pub async fn insert_new(pool: &PgPool, fetcher_id: &str, items: &[NewIngestItem]) -> Result<Vec<IngestOutcome>> {
    let mut out = Vec::with_capacity(items.len());
    if items.is_empty() {
        return Ok(out);
    }

    let mut tx = pool.begin().await.context("ingest begin failed")?;
    for item in items {
        let public_id = Uuid::new_v4().to_string();
        let (seq,): (i64,) = sqlx::query_as(
            r#"
            insert into reports (ts, id, latitude, longitude, description)
            values (coalesce($1, now()), $2, $3, $4, $5)
            returning seq
            "#,
        )
        .bind(item.collected_at)
        .bind(&public_id)
        .bind(item.latitude)
        .bind(item.longitude)
        .bind(&item.description)
        .fetch_one(&mut *tx)
        .await
        .with_context(|| format!("insert report for source_id '{}'", item.source_id))?;

        let claimed: Option<(i64,)> = sqlx::query_as(
            r#"
            insert into report_raw (
              report_seq, fetcher_id, source_id, source_type, agent_id, agent_version,
              collected_at, visibility, trust_level
            ) values (
              $1, $2, $3, $4, $5, $6, $7, 'shadow', 'unverified'
            )
            on conflict (fetcher_id, source_id) do nothing
            returning report_seq
            "#,
        )
        .bind(seq)
        .bind(fetcher_id)
        .bind(&item.source_id)
        .bind(&item.source_type)
        .bind(&item.agent_id)
        .bind(&item.agent_version)
        .bind(item.collected_at)
        .fetch_optional(&mut *tx)
        .await
        .with_context(|| format!("insert report_raw for source_id '{}'", item.source_id))?;

        if claimed.is_some() {
            out.push(IngestOutcome {
                source_id: item.source_id.clone(),
                report_seq: seq,
                duplicate: false,
            });
            continue;
        }

        sqlx::query("delete from reports where seq = $1")
            .bind(seq)
            .execute(&mut *tx)
            .await
            .context("discard duplicate report row")?;
        let (earlier,): (i64,) = sqlx::query_as(
            "select report_seq from report_raw where fetcher_id = $1 and source_id = $2",
        )
        .bind(fetcher_id)
        .bind(&item.source_id)
        .fetch_one(&mut *tx)
        .await
        .context("resolve duplicate source_id")?;
        out.push(IngestOutcome {
            source_id: item.source_id.clone(),
            report_seq: earlier,
            duplicate: true,
        });
    }
    tx.commit().await.context("ingest commit failed")?;
    Ok(out)
}
