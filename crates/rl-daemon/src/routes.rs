//! Axum router and all HTTP handlers for rl-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. Handlers are `pub(crate)` and the scenario tests in
//! `tests/` compose the router directly.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::prelude::*;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use rl_admission::{
    bearer_token, AdmissionError, AuthContext, Cap, IngestOutcome, QuotaRequest, SCOPE_FETCHER_READ,
    SCOPE_REPORT_SUBMIT,
};
use rl_broadcast::{ClientSubscription, GeoBox, ReportQuery};
use rl_schemas::{normalize_brand_name, IngestionAuditRecord, NewIngestItem, ReportBatch, ReportWithAnalysis};
use tracing::{debug, error, info, warn};

use crate::{
    api_types::{
        BulkIngestItemResult, BulkIngestRequest, BulkIngestResponse, CapsView, ErrorResponse, FetcherMeResponse,
        HealthResponse, ImageResponse, ItemStatus, ListenerHealthResponse, UsageView,
    },
    ingest::{prepare_batch, Prepared},
    state::AppState,
};

/// Path segment of the bulk ingest custom method.
pub const BULK_INGEST_VERB: &str = "reports:bulkIngest";
const BULK_INGEST_ENDPOINT: &str = "/v1/reports:bulkIngest";

const VISIBILITY_SHADOW: &str = "shadow";
const TRUST_UNVERIFIED: &str = "unverified";

/// Server-initiated keepalive on live-feed sockets.
const FEED_PING_INTERVAL: Duration = Duration::from_secs(30);

const DEFAULT_READ_LIMIT: i64 = 10;
const MAX_READ_LIMIT: i64 = 100_000;
/// Lower ceiling when analyses are included.
const MAX_FULL_DATA_READ_LIMIT: i64 = 50_000;
const DEFAULT_CLASSIFICATION: &str = "physical";
const DEFAULT_RADIUS_KM: f64 = 1.0;
const MAX_RADIUS_KM: f64 = 100.0;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
///
/// `POST /v1/reports:bulkIngest` is routed as `/v1/:verb` because a literal
/// colon cannot appear in a route pattern; unknown verbs answer 404. The
/// ingest body is read only after the caller authenticates, capped at
/// `ingest.max_body_bytes`.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v3/reports/health", get(listener_health))
        .route("/api/v3/reports/listen", get(listen))
        .route("/api/v3/reports/last", get(reports_last))
        .route("/api/v3/reports/by-seq", get(report_by_seq))
        .route("/api/v3/reports/by-id", get(reports_by_id))
        .route("/api/v3/reports/by-latlng", get(reports_by_latlng))
        .route("/api/v3/reports/by-brand", get(reports_by_brand))
        .route("/api/v3/reports/image", get(report_image))
        .route("/v1/fetchers/me", get(fetcher_me))
        .route("/v1/:verb", post(custom_verb))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) enum ApiError {
    Admission(AdmissionError),
    BadRequest(String),
    PayloadTooLarge,
    NotFound(&'static str),
    Internal(&'static str),
}

impl From<AdmissionError> for ApiError {
    fn from(e: AdmissionError) -> Self {
        ApiError::Admission(e)
    }
}

fn error_body(status: StatusCode, error: String, code: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error,
            code: code.to_string(),
        }),
    )
        .into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Admission(e) => {
                let status = match &e {
                    AdmissionError::InvalidCredential => StatusCode::UNAUTHORIZED,
                    AdmissionError::KeyRevoked
                    | AdmissionError::FetcherSuspended
                    | AdmissionError::InsufficientScope { .. } => StatusCode::FORBIDDEN,
                    AdmissionError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
                    AdmissionError::Timeout { .. } | AdmissionError::Persistence(_) => {
                        StatusCode::SERVICE_UNAVAILABLE
                    }
                };
                // Storage details stay in the logs.
                let message = match &e {
                    AdmissionError::Persistence(_) => "service temporarily unavailable".to_string(),
                    other => other.to_string(),
                };
                let mut resp = error_body(status, message, e.code());
                if let AdmissionError::QuotaExceeded { window, .. } = &e {
                    let secs = window.retry_after_secs(Utc::now());
                    if let Ok(v) = HeaderValue::from_str(&secs.to_string()) {
                        resp.headers_mut().insert(header::RETRY_AFTER, v);
                    }
                }
                resp
            }
            ApiError::BadRequest(msg) => error_body(StatusCode::BAD_REQUEST, msg, "bad_request"),
            ApiError::PayloadTooLarge => error_body(
                StatusCode::PAYLOAD_TOO_LARGE,
                "request body too large".to_string(),
                "payload_too_large",
            ),
            ApiError::NotFound(msg) => error_body(StatusCode::NOT_FOUND, msg.to_string(), "not_found"),
            ApiError::Internal(msg) => {
                error_body(StatusCode::INTERNAL_SERVER_ERROR, msg.to_string(), "internal")
            }
        }
    }
}

async fn authenticate(st: &AppState, headers: &HeaderMap, scope: &str) -> Result<AuthContext, ApiError> {
    let raw = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .ok_or(AdmissionError::InvalidCredential)?;
    st.authenticator.authenticate(raw, &[scope]).await.map_err(|e| {
        debug!(code = e.code(), "authentication refused");
        ApiError::from(e)
    })
}

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            service: st.service_name.clone(),
            version: st.build.version.to_string(),
            time: Utc::now(),
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /api/v3/reports/health
// ---------------------------------------------------------------------------

pub(crate) async fn listener_health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = st.hub.stats();
    let last_processed_seq = st.cursor.last_processed_seq();
    let status = if last_processed_seq.is_some() {
        "healthy"
    } else {
        "starting"
    };
    (
        StatusCode::OK,
        Json(ListenerHealthResponse {
            status: status.to_string(),
            service: st.service_name.clone(),
            timestamp: Utc::now(),
            connected_clients: stats.connected_clients,
            last_broadcast_seq: stats.last_broadcast_seq,
            last_processed_seq,
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /api/v3/reports/listen (WebSocket)
// ---------------------------------------------------------------------------

pub(crate) async fn listen(State(st): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| feed_session(st, socket))
}

/// Forward hub messages to one socket until either side goes away.
async fn feed_session(st: Arc<AppState>, mut socket: WebSocket) {
    let ClientSubscription { id, mut receiver } = match st.hub.register().await {
        Ok(sub) => sub,
        Err(e) => {
            warn!(error = %e, "feed subscriber refused");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };
    info!(client_id = id, "feed subscriber connected");

    let (mut sink, mut incoming) = socket.split();
    let mut ping = tokio::time::interval_at(tokio::time::Instant::now() + FEED_PING_INTERVAL, FEED_PING_INTERVAL);

    loop {
        tokio::select! {
            msg = receiver.recv() => match msg {
                Some(text) => {
                    if sink.send(Message::Text(text.to_string())).await.is_err() {
                        break;
                    }
                }
                None => {
                    // Hub dropped us (slow client or shutdown).
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            frame = incoming.next() => match frame {
                Some(Ok(Message::Ping(payload))) => {
                    if sink.send(Message::Pong(payload)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            _ = ping.tick() => {
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    st.hub.unregister(id).await;
    info!(client_id = id, "feed subscriber disconnected");
}

// ---------------------------------------------------------------------------
// GET /api/v3/reports/{last,by-seq,by-id,by-latlng,by-brand,image}
// ---------------------------------------------------------------------------

type Params = HashMap<String, String>;

fn param<'a>(params: &'a Params, name: &str) -> Option<&'a str> {
    params.get(name).map(|s| s.trim()).filter(|s| !s.is_empty())
}

fn required<'a>(params: &'a Params, name: &str) -> Result<&'a str, ApiError> {
    param(params, name).ok_or_else(|| ApiError::BadRequest(format!("Missing '{name}' parameter")))
}

fn full_data(params: &Params) -> Result<bool, ApiError> {
    match param(params, "full_data").map(str::to_ascii_lowercase).as_deref() {
        None | Some("true" | "t" | "1") => Ok(true),
        Some("false" | "f" | "0") => Ok(false),
        Some(_) => Err(ApiError::BadRequest(
            "Invalid 'full_data' parameter. Must be 'true' or 'false'.".to_string(),
        )),
    }
}

/// `n`, defaulting to 10 and clamped to the read ceiling.
fn read_limit(params: &Params, full_data: bool) -> Result<i64, ApiError> {
    let n = match param(params, "n") {
        None => DEFAULT_READ_LIMIT,
        Some(raw) => raw.parse::<i64>().ok().filter(|n| *n > 0).ok_or_else(|| {
            ApiError::BadRequest("Invalid 'n' parameter. Must be a positive integer.".to_string())
        })?,
    };
    let ceiling = if full_data {
        MAX_FULL_DATA_READ_LIMIT
    } else {
        MAX_READ_LIMIT
    };
    Ok(n.min(ceiling))
}

fn classification(params: &Params) -> String {
    param(params, "classification")
        .unwrap_or(DEFAULT_CLASSIFICATION)
        .to_string()
}

fn positive_seq(params: &Params) -> Result<i64, ApiError> {
    required(params, "seq")?
        .parse::<i64>()
        .ok()
        .filter(|seq| *seq > 0)
        .ok_or_else(|| ApiError::BadRequest("Invalid 'seq' parameter. Must be a positive integer.".to_string()))
}

fn coordinate(params: &Params, name: &str) -> Result<f64, ApiError> {
    required(params, name)?
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid '{name}' parameter. Must be a valid number.")))
}

fn radius_km(params: &Params) -> Result<f64, ApiError> {
    let radius = match param(params, "radius_km") {
        None => DEFAULT_RADIUS_KM,
        Some(raw) => raw
            .parse::<f64>()
            .ok()
            .filter(|r| r.is_finite() && *r > 0.0)
            .ok_or_else(|| {
                ApiError::BadRequest("Invalid 'radius_km' parameter. Must be a positive number.".to_string())
            })?,
    };
    Ok(radius.min(MAX_RADIUS_KM))
}

async fn list_reports(
    st: &AppState,
    query: ReportQuery,
    limit: i64,
    full_data: bool,
) -> Result<Json<ReportBatch>, ApiError> {
    let rows = st.reader.find_visible(&query, limit).await.map_err(|e| {
        error!(query = ?query, limit, error = %e, "report read failed");
        ApiError::Internal("failed to retrieve reports")
    })?;
    Ok(batch_response(rows, full_data))
}

/// Without `full_data` rows keep their report fields and drop analyses.
fn batch_response(mut rows: Vec<ReportWithAnalysis>, full_data: bool) -> Json<ReportBatch> {
    if !full_data {
        for row in &mut rows {
            row.analysis.clear();
        }
    }
    Json(ReportBatch::from_ordered(rows).unwrap_or_default())
}

/// Newest `n` visible reports, or with `after_seq` the oldest `n` after it
/// (the same rows the live feed would have pushed).
pub(crate) async fn reports_last(
    State(st): State<Arc<AppState>>,
    Query(params): Query<Params>,
) -> Result<Json<ReportBatch>, ApiError> {
    let full = full_data(&params)?;
    let limit = read_limit(&params, full)?;
    let Some(raw) = param(&params, "after_seq") else {
        let query = ReportQuery::Latest {
            classification: classification(&params),
        };
        return list_reports(&st, query, limit, full).await;
    };

    let after_seq = raw.parse::<i64>().ok().filter(|s| *s >= 0).ok_or_else(|| {
        ApiError::BadRequest("Invalid 'after_seq' parameter. Must be a non-negative integer.".to_string())
    })?;
    let rows = st.feed.visible_since(after_seq, limit).await.map_err(|e| {
        error!(after_seq, limit, error = %e, "catch-up read failed");
        ApiError::Internal("failed to retrieve reports")
    })?;
    Ok(batch_response(rows, full))
}

pub(crate) async fn report_by_seq(
    State(st): State<Arc<AppState>>,
    Query(params): Query<Params>,
) -> Result<Json<ReportWithAnalysis>, ApiError> {
    let seq = positive_seq(&params)?;
    match st.reader.visible_by_seq(seq).await {
        Ok(Some(report)) => Ok(Json(report)),
        Ok(None) => Err(ApiError::NotFound("Report not found")),
        Err(e) => {
            error!(seq, error = %e, "report read failed");
            Err(ApiError::Internal("failed to retrieve report"))
        }
    }
}

pub(crate) async fn reports_by_id(
    State(st): State<Arc<AppState>>,
    Query(params): Query<Params>,
) -> Result<Json<ReportBatch>, ApiError> {
    let reporter_id = required(&params, "id")?.to_string();
    let full = full_data(&params)?;
    let limit = read_limit(&params, full)?;
    let query = ReportQuery::ByReporter {
        reporter_id,
        classification: classification(&params),
    };
    list_reports(&st, query, limit, full).await
}

pub(crate) async fn reports_by_latlng(
    State(st): State<Arc<AppState>>,
    Query(params): Query<Params>,
) -> Result<Json<ReportBatch>, ApiError> {
    let latitude = coordinate(&params, "latitude")?;
    let longitude = coordinate(&params, "longitude")?;
    let radius = radius_km(&params)?;
    let limit = read_limit(&params, true)?;
    let query = ReportQuery::Near {
        area: GeoBox::around(latitude, longitude, radius),
        classification: DEFAULT_CLASSIFICATION.to_string(),
    };
    list_reports(&st, query, limit, true).await
}

pub(crate) async fn reports_by_brand(
    State(st): State<Arc<AppState>>,
    Query(params): Query<Params>,
) -> Result<Json<ReportBatch>, ApiError> {
    let brand_key = normalize_brand_name(required(&params, "brand_name")?);
    if brand_key.is_empty() {
        return Err(ApiError::BadRequest("Invalid 'brand_name' parameter".to_string()));
    }
    let limit = read_limit(&params, true)?;
    list_reports(&st, ReportQuery::ByBrand { brand_key }, limit, true).await
}

pub(crate) async fn report_image(
    State(st): State<Arc<AppState>>,
    Query(params): Query<Params>,
) -> Result<Json<ImageResponse>, ApiError> {
    let seq = positive_seq(&params)?;
    match st.reader.visible_image(seq).await {
        Ok(Some(bytes)) => Ok(Json(ImageResponse {
            image: BASE64_STANDARD.encode(bytes),
        })),
        Ok(None) => Err(ApiError::NotFound("Report not found")),
        Err(e) => {
            error!(seq, error = %e, "report image read failed");
            Err(ApiError::Internal("failed to retrieve image"))
        }
    }
}

// ---------------------------------------------------------------------------
// GET /v1/fetchers/me
// ---------------------------------------------------------------------------

pub(crate) async fn fetcher_me(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<FetcherMeResponse>, ApiError> {
    let ctx = authenticate(&st, &headers, SCOPE_FETCHER_READ).await?;

    let usage = st
        .quota
        .usage(ctx.fetcher_id(), ctx.key_id(), Utc::now())
        .await
        .map_err(|e| {
            warn!(fetcher_id = %ctx.fetcher_id(), error = %e, "usage read failed");
            AdmissionError::persistence(e)
        })?;

    let daily_remaining = match ctx.caps.daily {
        Cap::Unlimited => None,
        Cap::Limit(cap) => Some((cap - usage.day_used).max(0)),
    };

    Ok(Json(FetcherMeResponse {
        fetcher_id: ctx.fetcher.fetcher_id.clone(),
        name: ctx.fetcher.name.clone(),
        owner_type: ctx.fetcher.owner_type.clone(),
        status: ctx.fetcher.status.as_str().to_string(),
        tier: ctx.fetcher.tier,
        reputation_score: ctx.fetcher.reputation_score,
        key_id: ctx.key.key_id.clone(),
        caps: CapsView {
            per_minute_cap_items: ctx.caps.per_minute.as_i64(),
            daily_cap_items: ctx.caps.daily.as_i64(),
        },
        usage: UsageView {
            minute_used: usage.minute_used,
            daily_used: usage.day_used,
            daily_remaining,
        },
        scopes: ctx.scopes.to_vec(),
        last_seen_at: ctx.fetcher.last_seen_at,
    }))
}

// ---------------------------------------------------------------------------
// POST /v1/reports:bulkIngest
// ---------------------------------------------------------------------------

pub(crate) async fn custom_verb(
    State(st): State<Arc<AppState>>,
    Path(verb): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<BulkIngestResponse>, ApiError> {
    if verb != BULK_INGEST_VERB {
        return Err(ApiError::NotFound("not found"));
    }
    bulk_ingest(st, headers, body).await
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// First hop of `X-Forwarded-For`, else `X-Real-IP`.
fn remote_ip(headers: &HeaderMap) -> Option<String> {
    header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|s| s.trim().to_string()))
        .filter(|s| !s.is_empty())
        .or_else(|| header_str(headers, "x-real-ip"))
}

fn audit_record(ctx: &AuthContext, headers: &HeaderMap, submitted: usize) -> IngestionAuditRecord {
    IngestionAuditRecord {
        fetcher_id: Some(ctx.fetcher_id().to_string()),
        key_id: Some(ctx.key_id().to_string()),
        endpoint: BULK_INGEST_ENDPOINT.to_string(),
        items_submitted: submitted as i64,
        remote_ip: remote_ip(headers),
        user_agent: header_str(headers, header::USER_AGENT.as_str()),
        request_id: header_str(headers, "x-request-id"),
        ..Default::default()
    }
}

fn finish_audit(st: &AppState, mut record: IngestionAuditRecord, started: Instant) {
    record.latency_ms = started.elapsed().as_millis() as i64;
    st.side_effects.record_audit(record);
}

async fn bulk_ingest(
    st: Arc<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<BulkIngestResponse>, ApiError> {
    let started = Instant::now();
    let ctx = authenticate(&st, &headers, SCOPE_REPORT_SUBMIT).await?;

    // Unauthenticated callers never get their body buffered.
    let body = axum::body::to_bytes(body, st.ingest.max_body_bytes)
        .await
        .map_err(|e| {
            debug!(fetcher_id = %ctx.fetcher_id(), error = %e, "ingest body refused");
            ApiError::PayloadTooLarge
        })?;
    let request: BulkIngestRequest = serde_json::from_slice(&body)
        .map_err(|_| ApiError::BadRequest("invalid json".to_string()))?;
    let mut audit = audit_record(&ctx, &headers, request.items.len());

    if request.items.is_empty() {
        *audit.reject_reasons.entry("empty_batch".to_string()).or_default() += 1;
        finish_audit(&st, audit, started);
        return Err(ApiError::BadRequest("no items".to_string()));
    }
    let max = st.ingest.max_batch_items;
    if request.items.len() > max {
        *audit.reject_reasons.entry("batch_too_large".to_string()).or_default() += 1;
        audit.items_rejected = request.items.len() as i64;
        finish_audit(&st, audit, started);
        return Err(ApiError::BadRequest(format!("too many items (max {max})")));
    }

    let prepared = prepare_batch(&request.items);
    let candidate_ids: Vec<String> = prepared
        .iter()
        .filter_map(|p| match p {
            Prepared::Valid(item) => Some(item.source_id.clone()),
            Prepared::Rejected { .. } => None,
        })
        .collect();

    let existing = st
        .index
        .existing_sequences(ctx.fetcher_id(), &candidate_ids)
        .await
        .map_err(|e| {
            warn!(fetcher_id = %ctx.fetcher_id(), error = %e, "idempotency lookup failed");
            AdmissionError::persistence(e)
        })?;

    let new_items: Vec<NewIngestItem> = prepared
        .iter()
        .filter_map(|p| match p {
            Prepared::Valid(item) if !existing.contains_key(&item.source_id) => Some(item.clone()),
            _ => None,
        })
        .collect();

    // Only items not seen before are charged; a retried batch costs nothing.
    let charge = QuotaRequest {
        fetcher_id: ctx.fetcher_id().to_string(),
        key_id: ctx.key_id().to_string(),
        now: Utc::now(),
        items: new_items.len() as i64,
        caps: ctx.caps,
    };
    if let Err(e) = st.quota.consume(&charge).await {
        info!(
            fetcher_id = %charge.fetcher_id,
            key_id = %charge.key_id,
            items = charge.items,
            code = e.code(),
            "bulk ingest refused by quota"
        );
        *audit.reject_reasons.entry(e.code().to_string()).or_default() += charge.items;
        audit.items_rejected = request.items.len() as i64;
        finish_audit(&st, audit, started);
        return Err(e.into());
    }

    let outcomes = if new_items.is_empty() {
        Vec::new()
    } else {
        st.writer
            .insert_new(ctx.fetcher_id(), &new_items)
            .await
            .map_err(|e| {
                error!(fetcher_id = %ctx.fetcher_id(), items = new_items.len(), error = %e, "report insert failed");
                ApiError::Internal("failed to store reports")
            })?
    };
    let stored: HashMap<&str, &IngestOutcome> = outcomes.iter().map(|o| (o.source_id.as_str(), o)).collect();

    let mut response = BulkIngestResponse {
        submitted: request.items.len(),
        ..Default::default()
    };
    for p in prepared {
        let result = match p {
            Prepared::Rejected { source_id, reason } => {
                *audit.reject_reasons.entry(reason.to_string()).or_default() += 1;
                rejected(source_id, reason)
            }
            Prepared::Valid(item) => {
                if let Some(seq) = existing.get(&item.source_id) {
                    duplicate(item.source_id, *seq)
                } else {
                    match stored.get(item.source_id.as_str()) {
                        Some(o) if o.duplicate => duplicate(item.source_id, o.report_seq),
                        Some(o) => BulkIngestItemResult {
                            source_id: item.source_id,
                            status: ItemStatus::Accepted,
                            report_seq: Some(o.report_seq),
                            reason: None,
                            visibility: Some(VISIBILITY_SHADOW.to_string()),
                            trust_level: Some(TRUST_UNVERIFIED.to_string()),
                        },
                        None => {
                            *audit.reject_reasons.entry("not_stored".to_string()).or_default() += 1;
                            rejected(item.source_id, "not stored")
                        }
                    }
                }
            }
        };
        match result.status {
            ItemStatus::Accepted => response.accepted += 1,
            ItemStatus::Duplicate => response.duplicates += 1,
            ItemStatus::Rejected => response.rejected += 1,
        }
        response.items.push(result);
    }

    audit.items_accepted = response.accepted as i64;
    audit.items_rejected = response.rejected as i64;
    finish_audit(&st, audit, started);

    info!(
        fetcher_id = %ctx.fetcher_id(),
        submitted = response.submitted,
        accepted = response.accepted,
        duplicates = response.duplicates,
        rejected = response.rejected,
        "bulk ingest"
    );
    Ok(Json(response))
}

fn rejected(source_id: String, reason: &str) -> BulkIngestItemResult {
    BulkIngestItemResult {
        source_id,
        status: ItemStatus::Rejected,
        report_seq: None,
        reason: Some(reason.to_string()),
        visibility: None,
        trust_level: None,
    }
}

fn duplicate(source_id: String, report_seq: i64) -> BulkIngestItemResult {
    BulkIngestItemResult {
        source_id,
        status: ItemStatus::Duplicate,
        report_seq: Some(report_seq),
        reason: None,
        visibility: None,
        trust_level: None,
    }
}
