//! Integration tests for the correction pipeline API
//!
//! Exercises the full router stack with a stubbed batch corrector (or real
//! providers left unconfigured), a temp-file SQLite store, and tower's
//! oneshot request helper.

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;

use async_trait::async_trait;
use tutur_common::KvStore;
use tutur_cp::config::PipelineConfig;
use tutur_cp::models::CorrectionMode;
use tutur_cp::pipeline::Pipeline;
use tutur_cp::providers::ProviderError;
use tutur_cp::services::router::{BatchCorrector, RoutedBatch};
use tutur_cp::{build_router, AppState};

/// Corrector stub that uppercases every line
struct UppercaseCorrector;

#[async_trait]
impl BatchCorrector for UppercaseCorrector {
    async fn correct_batch(
        &self,
        texts: &[String],
        _mode: CorrectionMode,
        _glossary: Option<&[String]>,
    ) -> Result<RoutedBatch, ProviderError> {
        Ok(RoutedBatch {
            provider: "stub".to_string(),
            texts: texts.iter().map(|t| t.to_uppercase()).collect(),
        })
    }
}

async fn setup_app(corrector: Option<Arc<dyn BatchCorrector>>) -> (axum::Router, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = tutur_common::kv::init_database(&dir.path().join("api_test.db"))
        .await
        .expect("init database");
    let kv = KvStore::new(pool);

    // No credentials in the default config: the real router degrades to
    // `provider: "none"` without touching the network
    let pipeline = match corrector {
        Some(corrector) => Pipeline::with_corrector(kv.clone(), PipelineConfig::default(), corrector),
        None => Pipeline::new(kv.clone(), PipelineConfig::default()),
    };

    let app = build_router(AppState::new(kv, Arc::new(pipeline)));
    (app, dir)
}

async fn make_request(
    app: &axum::Router,
    method: Method,
    path: &str,
    body: Option<Value>,
) -> (StatusCode, Option<Value>) {
    use tower::ServiceExt;

    let mut request = Request::builder().method(method).uri(path);
    if body.is_some() {
        request = request.header("content-type", "application/json");
    }
    let request = match body {
        Some(json_body) => request.body(Body::from(json_body.to_string())).unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json_body = if bytes.is_empty() {
        None
    } else {
        serde_json::from_slice(&bytes).ok()
    };

    (status, json_body)
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _dir) = setup_app(None).await;

    let (status, body) = make_request(&app, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    let body = body.expect("Expected response body");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "tutur-cp");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_correct_batch_with_stub_corrector() {
    let (app, _dir) = setup_app(Some(Arc::new(UppercaseCorrector))).await;

    let payload = json!({
        "segments": [
            { "audioHash": "h1", "text": "halo dunia", "mode": "quick" },
            { "audioHash": "h2", "text": "apa kabar", "mode": "quick" },
        ]
    });

    let (status, body) = make_request(&app, Method::POST, "/api/correct/batch", Some(payload)).await;

    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["provider"], "router");
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["corrected"], "HALO DUNIA");
    assert_eq!(results[0]["cached"], false);
    assert_eq!(results[0]["faithfulness"]["accepted"], true);
    assert_eq!(results[1]["corrected"], "APA KABAR");
}

#[tokio::test]
async fn test_correct_batch_second_call_is_served_from_cache() {
    let (app, _dir) = setup_app(Some(Arc::new(UppercaseCorrector))).await;

    let payload = json!({
        "segments": [{ "audioHash": "h1", "text": "halo dunia", "mode": "quick" }]
    });

    let (_, _) = make_request(&app, Method::POST, "/api/correct/batch", Some(payload.clone())).await;
    let (status, body) = make_request(&app, Method::POST, "/api/correct/batch", Some(payload)).await;

    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["provider"], "cache");
    let results = body["results"].as_array().unwrap();
    assert_eq!(results[0]["cached"], true);
    assert_eq!(results[0]["provider"], "cache");
    assert_eq!(results[0]["corrected"], "HALO DUNIA");
}

#[tokio::test]
async fn test_correct_batch_without_providers_degrades_to_original_text() {
    let (app, _dir) = setup_app(None).await;

    let payload = json!({
        "segments": [{ "audioHash": "h1", "text": "halo dunia", "mode": "quick" }]
    });

    let (status, body) = make_request(&app, Method::POST, "/api/correct/batch", Some(payload)).await;

    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    let results = body["results"].as_array().unwrap();
    // Correction is best-effort: with every provider unconfigured the text
    // comes back unchanged
    assert_eq!(results[0]["corrected"], "halo dunia");
}

#[tokio::test]
async fn test_correct_batch_rejects_invalid_payload() {
    let (app, _dir) = setup_app(None).await;

    let (status, _) = make_request(
        &app,
        Method::POST,
        "/api/correct/batch",
        Some(json!({ "wrong": true })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = make_request(
        &app,
        Method::POST,
        "/api/correct/batch",
        Some(json!({ "segments": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Segments missing required fields are filtered; nothing valid remains
    let (status, _) = make_request(
        &app,
        Method::POST,
        "/api/correct/batch",
        Some(json!({ "segments": [{ "mode": "quick" }] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_community_submission_feeds_the_cache() {
    let (app, _dir) = setup_app(Some(Arc::new(UppercaseCorrector))).await;

    let (status, body) = make_request(
        &app,
        Method::POST,
        "/api/community/submit",
        Some(json!({ "audioHash": "h1", "text": "teks komunitas", "contributor": "tester" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["ok"], true);

    // The crowd correction wins over the router unconditionally
    let (status, body) = make_request(
        &app,
        Method::POST,
        "/api/correct/batch",
        Some(json!({
            "segments": [{ "audioHash": "h1", "text": "teks komunitas", "mode": "enhanced" }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    let results = body["results"].as_array().unwrap();
    assert_eq!(results[0]["provider"], "community");
    assert_eq!(results[0]["corrected"], "teks komunitas");
}

#[tokio::test]
async fn test_community_upvote() {
    let (app, _dir) = setup_app(None).await;

    let (status, _) = make_request(
        &app,
        Method::POST,
        "/api/community/upvote",
        Some(json!({ "audioHash": "absent" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    make_request(
        &app,
        Method::POST,
        "/api/community/submit",
        Some(json!({ "audioHash": "h1", "text": "teks" })),
    )
    .await;

    let (status, body) = make_request(
        &app,
        Method::POST,
        "/api/community/upvote",
        Some(json!({ "audioHash": "h1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["upvotes"], 1);
}

#[tokio::test]
async fn test_quota_status_endpoint() {
    let (app, _dir) = setup_app(None).await;

    let (status, body) = make_request(&app, Method::GET, "/api/quotas", None).await;

    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert!(body["day"].is_string());
    assert_eq!(body["quotas"]["groq"]["day"]["used"], 0);
    assert_eq!(body["quotas"]["groq"]["day"]["limit"], 14400);
    assert_eq!(body["quotas"]["huggingface"]["day"]["limit"], 1000);
}

#[tokio::test]
async fn test_metrics_endpoint_reports_queue_and_providers() {
    let (app, _dir) = setup_app(Some(Arc::new(UppercaseCorrector))).await;

    // Drive one correction through so the queue key exists
    make_request(
        &app,
        Method::POST,
        "/api/correct/batch",
        Some(json!({
            "segments": [{ "audioHash": "h1", "text": "halo", "mode": "quick" }]
        })),
    )
    .await;

    let (status, body) = make_request(&app, Method::GET, "/api/metrics/providers", None).await;

    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert!(body["providers"]["groq"]["successRate"].is_number());
    assert_eq!(body["queue"]["totalItems"], 0);
}

#[tokio::test]
async fn test_job_creation_and_chunk_ingest() {
    let (app, _dir) = setup_app(None).await;

    let (status, body) = make_request(&app, Method::POST, "/api/transcribe/start", None).await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    let job_id = body["id"].as_str().unwrap().to_string();
    assert_eq!(body["status"], "uploading");

    let (status, body) = make_request(
        &app,
        Method::POST,
        &format!("/api/transcribe/{}/chunk", job_id),
        Some(json!({ "audioHash": "h0", "text": "halo", "index": 0, "startTime": 0.0, "endTime": 4.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["count"], 1);

    let (status, body) = make_request(
        &app,
        Method::POST,
        &format!("/api/transcribe/{}/chunk", job_id),
        Some(json!({ "audioHash": "h1", "text": "dunia" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["count"], 2);

    // Empty audio hash is rejected
    let (status, _) = make_request(
        &app,
        Method::POST,
        &format!("/api/transcribe/{}/chunk", job_id),
        Some(json!({ "audioHash": " ", "text": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
