//! In-process scenario tests for rl-daemon HTTP endpoints.
//!
//! The service runs on in-memory backends from `rl-testkit`; the router is
//! driven with `tower::ServiceExt::oneshot`, no socket involved.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderMap, Request, StatusCode};
use http_body_util::BodyExt;
use rl_admission::{AdmissionError, KeyPrefix, SCOPE_FETCHER_READ};
use rl_config::ListenerConfig;
use rl_daemon::service::{Backends, Service, ServiceHandle};
use rl_schemas::FetcherStatus;
use rl_testkit::{
    IssuedKey, KeySpec, MemoryCheckpoints, MemoryDirectory, MemoryQuotaLedger, MemoryReportStore, MemorySideEffects,
};
use serde_json::{json, Value};
use tower::ServiceExt; // oneshot

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Harness {
    dir: Arc<MemoryDirectory>,
    quota: Arc<MemoryQuotaLedger>,
    reports: Arc<MemoryReportStore>,
    effects: Arc<MemorySideEffects>,
    service: ServiceHandle,
}

async fn harness_with(cfg: ListenerConfig) -> Harness {
    let dir = Arc::new(MemoryDirectory::default());
    let quota = Arc::new(MemoryQuotaLedger::default());
    let reports = Arc::new(MemoryReportStore::default());
    let checkpoints = Arc::new(MemoryCheckpoints::default());
    let effects = Arc::new(MemorySideEffects::default());

    let backends = Backends {
        directory: dir.clone(),
        quota: quota.clone(),
        index: reports.clone(),
        writer: reports.clone(),
        reports: reports.clone(),
        reader: reports.clone(),
        checkpoints,
        side_effects: effects.clone(),
    };
    let service = Service::start(&cfg, backends).await.expect("service start");
    Harness {
        dir,
        quota,
        reports,
        effects,
        service,
    }
}

async fn harness() -> Harness {
    harness_with(ListenerConfig::default()).await
}

impl Harness {
    fn key(&self, fetcher_id: &str) -> IssuedKey {
        self.dir
            .issue(KeySpec::new(fetcher_id, KeyPrefix::Test))
            .expect("issue key")
    }
}

/// Drive the router with a single request and return (status, headers, body).
async fn call(router: axum::Router, req: Request<axum::body::Body>) -> (StatusCode, HeaderMap, bytes::Bytes) {
    let resp = router.oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    (status, headers, body)
}

fn parse_json(b: bytes::Bytes) -> Value {
    serde_json::from_slice(&b).expect("body is not valid JSON")
}

fn get(uri: &str, token: Option<&str>) -> Request<axum::body::Body> {
    let mut b = Request::builder().method("GET").uri(uri);
    if let Some(t) = token {
        b = b.header(header::AUTHORIZATION, format!("Bearer {t}"));
    }
    b.body(axum::body::Body::empty()).unwrap()
}

fn ingest(token: &str, body: Value) -> Request<axum::body::Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/reports:bulkIngest")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-request-id", "req-42")
        .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
        .body(axum::body::Body::from(body.to_string()))
        .unwrap()
}

fn items(ids: &[&str]) -> Value {
    let items: Vec<Value> = ids
        .iter()
        .map(|id| json!({"source_id": id, "title": format!("report {id}"), "lat": 1.5, "lng": 2.5}))
        .collect();
    json!({ "items": items })
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_endpoints_report_service_and_cursor() {
    let h = harness().await;

    let (status, _, body) = call(h.service.router(), get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "report-listener");

    let (status, _, body) = call(h.service.router(), get("/api/v3/reports/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["connected_clients"], 0);
    assert_eq!(json["last_processed_seq"], 0);
}

// ---------------------------------------------------------------------------
// Authentication error mapping
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_or_garbage_credentials_are_401() {
    let h = harness().await;

    let (status, _, body) = call(h.service.router(), get("/v1/fetchers/me", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(parse_json(body)["code"], "invalid_credential");

    let (status, _, _) = call(h.service.router(), get("/v1/fetchers/me", Some("not-a-key"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn revoked_suspended_and_unscoped_keys_are_403_with_distinct_codes() {
    let h = harness().await;

    let revoked = h.key("f-revoked");
    h.dir.revoke(&revoked.key_id);
    let (status, _, body) = call(h.service.router(), ingest(&revoked.token, items(&["a"]))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(parse_json(body)["code"], "key_revoked");

    let suspended = h.key("f-suspended");
    h.dir.set_fetcher_status("f-suspended", FetcherStatus::Suspended);
    let (status, _, body) = call(h.service.router(), ingest(&suspended.token, items(&["a"]))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(parse_json(body)["code"], "fetcher_suspended");

    let read_only = h
        .dir
        .issue(KeySpec::new("f-read", KeyPrefix::Test).scopes(&[SCOPE_FETCHER_READ]))
        .unwrap();
    let (status, _, body) = call(h.service.router(), ingest(&read_only.token, items(&["a"]))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(parse_json(body)["code"], "insufficient_scope");

    // Refused requests never reach the ledger.
    assert_eq!(h.quota.calls(), 0);
}

// ---------------------------------------------------------------------------
// Bulk ingest
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bulk_ingest_accepts_new_items_in_input_order() {
    let h = harness().await;
    let key = h.key("f-1");

    let (status, _, body) = call(h.service.router(), ingest(&key.token, items(&["a", "b", "c"]))).await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["submitted"], 3);
    assert_eq!(json["accepted"], 3);
    assert_eq!(json["duplicates"], 0);
    let ids: Vec<&str> = json["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["source_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(json["items"][0]["status"], "accepted");
    assert_eq!(json["items"][0]["visibility"], "shadow");
    assert_eq!(json["items"][0]["trust_level"], "unverified");
    assert_eq!(h.reports.report_count(), 3);
    assert_eq!(h.quota.calls(), 1);
}

#[tokio::test]
async fn resubmitted_batch_returns_first_seqs_and_consumes_no_quota() {
    let h = harness().await;
    let key = h.key("f-1");

    let (_, _, body) = call(h.service.router(), ingest(&key.token, items(&["x1", "x2"]))).await;
    let first = parse_json(body);
    let calls_after_first = h.quota.calls();

    let (status, _, body) = call(h.service.router(), ingest(&key.token, items(&["x1", "x2"]))).await;
    assert_eq!(status, StatusCode::OK);
    let second = parse_json(body);
    assert_eq!(second["accepted"], 0);
    assert_eq!(second["duplicates"], 2);
    for i in 0..2usize {
        assert_eq!(second["items"][i]["status"], "duplicate");
        assert_eq!(second["items"][i]["report_seq"], first["items"][i]["report_seq"]);
    }
    assert_eq!(h.quota.calls(), calls_after_first, "retry must not touch the ledger");
    assert_eq!(h.reports.report_count(), 2);
}

#[tokio::test]
async fn partial_retry_is_charged_only_for_new_items() {
    let cfg = ListenerConfig::default();
    let h = harness_with(cfg).await;
    let key = h
        .dir
        .issue(KeySpec::new("f-1", KeyPrefix::Test).caps(3, 100))
        .unwrap();

    let (status, _, _) = call(h.service.router(), ingest(&key.token, items(&["a", "b"]))).await;
    assert_eq!(status, StatusCode::OK);

    // Two already known plus one new fits a per-minute cap of 3.
    let (status, _, body) = call(h.service.router(), ingest(&key.token, items(&["a", "b", "c"]))).await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["accepted"], 1);
    assert_eq!(json["duplicates"], 2);
}

#[tokio::test]
async fn invalid_items_are_rejected_individually() {
    let h = harness().await;
    let key = h.key("f-1");
    let body = json!({"items": [
        {"source_id": "ok-1", "title": "fine"},
        {"source_id": "   ", "title": "no id"},
        {"source_id": "x".repeat(300), "title": "long id"},
        {"source_id": "ok-1", "title": "again"}
    ]});

    let (status, _, body) = call(h.service.router(), ingest(&key.token, body)).await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["accepted"], 1);
    assert_eq!(json["rejected"], 3);
    assert_eq!(json["items"][1]["reason"], "source_id is required");
    assert_eq!(json["items"][2]["reason"], "source_id too long");
    assert_eq!(json["items"][3]["reason"], "duplicate source_id in batch");
}

#[tokio::test]
async fn malformed_and_oversized_batches_are_400() {
    let mut cfg = ListenerConfig::default();
    cfg.ingest.max_batch_items = 2;
    let h = harness_with(cfg).await;
    let key = h.key("f-1");

    let (status, _, body) = call(h.service.router(), ingest(&key.token, json!({"items": []}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(parse_json(body)["code"], "bad_request");

    let (status, _, _) = call(h.service.router(), ingest(&key.token, items(&["a", "b", "c"]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let req = Request::builder()
        .method("POST")
        .uri("/v1/reports:bulkIngest")
        .header(header::AUTHORIZATION, format!("Bearer {}", key.token))
        .body(axum::body::Body::from("{not json"))
        .unwrap();
    let (status, _, body) = call(h.service.router(), req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(parse_json(body)["error"], "invalid json");

    assert_eq!(h.quota.calls(), 0);
}

#[tokio::test]
async fn body_is_read_only_after_authentication() {
    let mut cfg = ListenerConfig::default();
    cfg.ingest.max_body_bytes = 64;
    let h = harness_with(cfg).await;
    let key = h.key("f-1");
    let oversized = format!("{{not json {}", "x".repeat(4_096));

    let anonymous = Request::builder()
        .method("POST")
        .uri("/v1/reports:bulkIngest")
        .header(header::AUTHORIZATION, "Bearer not-a-key")
        .body(axum::body::Body::from(oversized.clone()))
        .unwrap();
    let (status, _, body) = call(h.service.router(), anonymous).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(parse_json(body)["code"], "invalid_credential");

    let authed = Request::builder()
        .method("POST")
        .uri("/v1/reports:bulkIngest")
        .header(header::AUTHORIZATION, format!("Bearer {}", key.token))
        .body(axum::body::Body::from(oversized))
        .unwrap();
    let (status, _, body) = call(h.service.router(), authed).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(parse_json(body)["code"], "payload_too_large");
    assert_eq!(h.quota.calls(), 0);
}

#[tokio::test]
async fn quota_exceeded_is_429_with_retry_after() {
    let h = harness().await;
    let key = h
        .dir
        .issue(KeySpec::new("f-1", KeyPrefix::Test).caps(2, 100))
        .unwrap();

    let (status, headers, body) = call(h.service.router(), ingest(&key.token, items(&["a", "b", "c"]))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(parse_json(body)["code"], "quota_exceeded");
    let retry: i64 = headers
        .get(header::RETRY_AFTER)
        .expect("Retry-After header")
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry));
    assert_eq!(h.reports.report_count(), 0, "denied batch writes nothing");
}

#[tokio::test]
async fn ledger_timeout_is_503() {
    let h = harness().await;
    let key = h.key("f-1");
    h.quota.fail_with(Some(AdmissionError::Timeout {
        operation: "quota check",
    }));

    let (status, _, body) = call(h.service.router(), ingest(&key.token, items(&["a"]))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(parse_json(body)["code"], "timeout");
    assert_eq!(h.reports.report_count(), 0);
}

#[tokio::test]
async fn unknown_custom_verb_is_404() {
    let h = harness().await;
    let key = h.key("f-1");
    let req = Request::builder()
        .method("POST")
        .uri("/v1/reports:bulkDelete")
        .header(header::AUTHORIZATION, format!("Bearer {}", key.token))
        .body(axum::body::Body::from("{}"))
        .unwrap();
    let (status, _, _) = call(h.service.router(), req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn ingest_is_audited_off_the_request_path() {
    let h = harness().await;
    let key = h.key("f-1");
    let body = json!({"items": [{"source_id": "a", "title": "t"}, {"source_id": "", "title": "t"}]});

    let (status, _, _) = call(h.service.router(), ingest(&key.token, body)).await;
    assert_eq!(status, StatusCode::OK);

    let mut audits = Vec::new();
    for _ in 0..100 {
        audits = h.effects.audits();
        if !audits.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(audits.len(), 1);
    let rec = &audits[0];
    assert_eq!(rec.endpoint, "/v1/reports:bulkIngest");
    assert_eq!(rec.fetcher_id.as_deref(), Some("f-1"));
    assert_eq!(rec.items_submitted, 2);
    assert_eq!(rec.items_accepted, 1);
    assert_eq!(rec.items_rejected, 1);
    assert_eq!(rec.reject_reasons.get("source_id is required"), Some(&1));
    assert_eq!(rec.request_id.as_deref(), Some("req-42"));
    assert_eq!(rec.remote_ip.as_deref(), Some("203.0.113.9"));
}

// ---------------------------------------------------------------------------
// GET /v1/fetchers/me
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetcher_me_reports_caps_usage_and_scopes() {
    let h = harness().await;
    let key = h.key("f-1");

    call(h.service.router(), ingest(&key.token, items(&["a", "b", "c"]))).await;

    let (status, _, body) = call(h.service.router(), get("/v1/fetchers/me", Some(&key.token))).await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["fetcher_id"], "f-1");
    assert_eq!(json["key_id"], key.key_id.as_str());
    assert_eq!(json["caps"]["per_minute_cap_items"], 20);
    assert_eq!(json["caps"]["daily_cap_items"], 200);
    assert_eq!(json["usage"]["daily_used"], 3);
    assert_eq!(json["usage"]["daily_remaining"], 197);
    let scopes: Vec<&str> = json["scopes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s.as_str().unwrap())
        .collect();
    assert!(scopes.contains(&"report:submit"));
    assert!(scopes.contains(&"fetcher:read"));
}

#[tokio::test]
async fn unlimited_caps_have_no_remaining_figure() {
    let h = harness().await;
    let key = h
        .dir
        .issue(KeySpec::new("f-free", KeyPrefix::Test).caps(0, 0))
        .unwrap();

    let (status, _, body) = call(h.service.router(), get("/v1/fetchers/me", Some(&key.token))).await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["caps"]["per_minute_cap_items"], 0);
    assert!(json["usage"]["daily_remaining"].is_null());
}

// ---------------------------------------------------------------------------
// Public report reads
// ---------------------------------------------------------------------------

fn seqs(batch: &Value) -> Vec<i64> {
    batch["reports"]
        .as_array()
        .expect("reports array")
        .iter()
        .map(|r| r["report"]["seq"].as_i64().expect("seq"))
        .collect()
}

#[tokio::test]
async fn last_returns_newest_visible_reports_ascending() {
    let h = harness().await;

    let (status, _, body) = call(h.service.router(), get("/api/v3/reports/last", None)).await;
    assert_eq!(status, StatusCode::OK);
    let empty = parse_json(body);
    assert_eq!(empty["count"], 0);
    assert_eq!(seqs(&empty), Vec::<i64>::new());

    let a = h.reports.push_visible("a");
    let _hidden = h.reports.push_hidden("hidden");
    let c = h.reports.push_visible("c");
    let d = h.reports.push_visible("d");

    let (status, _, body) = call(h.service.router(), get("/api/v3/reports/last?n=2", None)).await;
    assert_eq!(status, StatusCode::OK);
    let batch = parse_json(body);
    assert_eq!(seqs(&batch), vec![c, d]);
    assert_eq!(batch["count"], 2);
    assert_eq!(batch["from_seq"], c);
    assert_eq!(batch["to_seq"], d);
    assert_eq!(batch["reports"][0]["analysis"][0]["classification"], "physical");

    let (_, _, body) = call(h.service.router(), get("/api/v3/reports/last?full_data=false", None)).await;
    let light = parse_json(body);
    assert_eq!(seqs(&light), vec![a, c, d]);
    assert!(light["reports"][0]["analysis"].as_array().unwrap().is_empty());

    let (_, _, body) = call(h.service.router(), get("/api/v3/reports/last?classification=digital", None)).await;
    assert_eq!(parse_json(body)["count"], 0);
}

#[tokio::test]
async fn last_after_seq_catches_up_in_feed_order() {
    let h = harness().await;
    let a = h.reports.push_visible("a");
    let b = h.reports.push_visible("b");
    h.reports.push_hidden("hidden");
    let c = h.reports.push_visible("c");

    let (status, _, body) = call(
        h.service.router(),
        get(&format!("/api/v3/reports/last?after_seq={a}&n=1"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(seqs(&parse_json(body)), vec![b]);

    let (_, _, body) = call(
        h.service.router(),
        get(&format!("/api/v3/reports/last?after_seq={a}"), None),
    )
    .await;
    assert_eq!(seqs(&parse_json(body)), vec![b, c]);

    let (status, _, _) = call(h.service.router(), get("/api/v3/reports/last?after_seq=-1", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn read_parameters_are_validated() {
    let h = harness().await;
    h.reports.push_visible("a");

    for uri in [
        "/api/v3/reports/last?n=0",
        "/api/v3/reports/last?n=ten",
        "/api/v3/reports/last?full_data=maybe",
        "/api/v3/reports/by-seq",
        "/api/v3/reports/by-seq?seq=0",
        "/api/v3/reports/by-id",
        "/api/v3/reports/by-latlng?longitude=8.5",
        "/api/v3/reports/by-latlng?latitude=north&longitude=8.5",
        "/api/v3/reports/by-latlng?latitude=47&longitude=8.5&radius_km=-1",
        "/api/v3/reports/by-brand",
        "/api/v3/reports/by-brand?brand_name=%20-%26-",
        "/api/v3/reports/image?seq=-4",
    ] {
        let (status, _, body) = call(h.service.router(), get(uri, None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(parse_json(body)["code"], "bad_request", "{uri}");
    }

    let (_, _, body) = call(h.service.router(), get("/api/v3/reports/last?n=-3", None)).await;
    assert_eq!(
        parse_json(body)["error"],
        "Invalid 'n' parameter. Must be a positive integer."
    );
    let (_, _, body) = call(h.service.router(), get("/api/v3/reports/by-seq", None)).await;
    assert_eq!(parse_json(body)["error"], "Missing 'seq' parameter");
}

#[tokio::test]
async fn by_seq_serves_visible_reports_only() {
    let h = harness().await;
    let visible = h.reports.push_visible("bin overflow");
    let hidden = h.reports.push_hidden("private");

    let (status, _, body) = call(
        h.service.router(),
        get(&format!("/api/v3/reports/by-seq?seq={visible}"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["report"]["seq"], visible);
    assert_eq!(json["report"]["description"], "bin overflow");

    for seq in [hidden, 999] {
        let (status, _, body) = call(
            h.service.router(),
            get(&format!("/api/v3/reports/by-seq?seq={seq}"), None),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(parse_json(body)["error"], "Report not found");
    }
}

#[tokio::test]
async fn by_id_latlng_and_brand_filter_visible_reports() {
    let h = harness().await;
    let mine = h.reports.push_visible_with("mine", |r| r.report.id = "reporter-7".into());
    let far = h.reports.push_visible_with("far", |r| {
        r.report.latitude = 40.71;
        r.report.longitude = -74.0;
    });
    let branded = h.reports.push_visible_with("can", |r| r.analysis[0].brand_name = "Coca-Cola".into());
    h.reports.push_visible("plain");

    let (_, _, body) = call(h.service.router(), get("/api/v3/reports/by-id?id=reporter-7", None)).await;
    assert_eq!(seqs(&parse_json(body)), vec![mine]);

    let (_, _, body) = call(
        h.service.router(),
        get("/api/v3/reports/by-id?id=reporter-7&classification=digital", None),
    )
    .await;
    assert_eq!(parse_json(body)["count"], 0);

    let (_, _, body) = call(
        h.service.router(),
        get("/api/v3/reports/by-latlng?latitude=40.7&longitude=-74.01&radius_km=5", None),
    )
    .await;
    assert_eq!(seqs(&parse_json(body)), vec![far]);

    // Default 1 km radius around the sample location excludes the far report.
    let (_, _, body) = call(
        h.service.router(),
        get("/api/v3/reports/by-latlng?latitude=47.37&longitude=8.54&n=2", None),
    )
    .await;
    let near = parse_json(body);
    assert_eq!(near["count"], 2);
    assert!(!seqs(&near).contains(&far));

    let (status, _, body) = call(
        h.service.router(),
        get("/api/v3/reports/by-brand?brand_name=coca%20cola", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(seqs(&parse_json(body)), vec![branded]);
}

#[tokio::test]
async fn image_is_base64_of_stored_bytes() {
    let h = harness().await;
    let with_image = h.reports.push_visible("photo");
    h.reports.set_image(with_image, b"\x89PNG");
    let without = h.reports.push_visible("text only");
    let hidden = h.reports.push_hidden("private photo");
    h.reports.set_image(hidden, b"\x89PNG");

    let (status, _, body) = call(
        h.service.router(),
        get(&format!("/api/v3/reports/image?seq={with_image}"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse_json(body)["image"], "iVBORw==");

    for seq in [without, hidden] {
        let (status, _, _) = call(
            h.service.router(),
            get(&format!("/api/v3/reports/image?seq={seq}"), None),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
