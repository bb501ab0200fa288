//! End-to-end job stream test
//!
//! Seeds a two-chunk job, subscribes to its SSE stream, and checks the full
//! protocol: status with the chunk count, raw events and raw progress, quick
//! and enhanced corrections per chunk, then done. Event order across chunks
//! is not asserted beyond the per-chunk raw → quick → enhanced guarantee.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::sync::Arc;
use tower::ServiceExt;

use async_trait::async_trait;
use tutur_common::KvStore;
use tutur_cp::config::PipelineConfig;
use tutur_cp::db::jobs::save_job;
use tutur_cp::models::{Chunk, ChunkTranscription, CorrectionMode, JobState};
use tutur_cp::pipeline::Pipeline;
use tutur_cp::providers::ProviderError;
use tutur_cp::services::router::{BatchCorrector, RoutedBatch};
use tutur_cp::{build_router, AppState};

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

fn chunk(index: usize, audio_hash: &str, raw: &str) -> Chunk {
    Chunk {
        index,
        audio_hash: audio_hash.to_string(),
        start_time: None,
        end_time: None,
        transcription: ChunkTranscription::from_raw(raw.to_string()),
    }
}

async fn setup() -> (axum::Router, KvStore, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = tutur_common::kv::init_database(&dir.path().join("stream_test.db"))
        .await
        .expect("init database");
    let kv = KvStore::new(pool);
    let pipeline = Pipeline::with_corrector(
        kv.clone(),
        PipelineConfig::default(),
        Arc::new(UppercaseCorrector),
    );
    let app = build_router(AppState::new(kv.clone(), Arc::new(pipeline)));
    (app, kv, dir)
}

/// Collect the whole SSE body; the stream closes once the orchestrator is
/// done, so this terminates.
async fn collect_stream(app: &axum::Router, job_id: &str) -> String {
    let request = Request::builder()
        .uri(format!("/api/transcribe/{}/stream", job_id))
        .body(Body::empty())
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "text/event-stream"
    );

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Extract the data payloads for one SSE event type
fn events_of<'a>(body: &'a str, event: &str) -> Vec<&'a str> {
    let marker = format!("event: {}", event);
    body.split("\n\n")
        .filter(|frame| frame.lines().any(|l| l.trim() == marker))
        .filter_map(|frame| {
            frame
                .lines()
                .find(|l| l.starts_with("data: "))
                .map(|l| &l["data: ".len()..])
        })
        .collect()
}

#[tokio::test]
async fn test_two_chunk_job_emits_full_protocol() {
    let (app, kv, _dir) = setup().await;

    let mut job = JobState::new("job-e2e".to_string());
    job.upsert_chunk(chunk(0, "hash-halo", "halo"));
    job.upsert_chunk(chunk(1, "hash-dunia", "dunia"));
    save_job(&kv, &job).await.unwrap();

    let body = collect_stream(&app, "job-e2e").await;

    // Status announces the chunk count
    let status_events = events_of(&body, "status");
    assert_eq!(status_events.len(), 1);
    let status: serde_json::Value = serde_json::from_str(status_events[0]).unwrap();
    assert_eq!(status["jobId"], "job-e2e");
    assert_eq!(status["totalChunks"], 2);

    // Two raw events with the ASR text
    let raw_events = events_of(&body, "raw");
    assert_eq!(raw_events.len(), 2);
    let raw_texts: Vec<serde_json::Value> = raw_events
        .iter()
        .map(|d| serde_json::from_str(d).unwrap())
        .collect();
    assert!(raw_texts.iter().any(|e| e["text"] == "halo"));
    assert!(raw_texts.iter().any(|e| e["text"] == "dunia"));

    // Raw progress reaches 2/2
    let progress_events = events_of(&body, "progress");
    let raw_progress: Vec<serde_json::Value> = progress_events
        .iter()
        .map(|d| serde_json::from_str::<serde_json::Value>(d).unwrap())
        .filter(|e| e["stage"] == "raw")
        .collect();
    assert_eq!(raw_progress.len(), 2);
    assert!(raw_progress.iter().any(|e| e["completed"] == 2 && e["total"] == 2));

    // Quick corrections for both chunks
    let quick_events: Vec<serde_json::Value> = events_of(&body, "quick")
        .iter()
        .map(|d| serde_json::from_str(d).unwrap())
        .collect();
    assert_eq!(quick_events.len(), 2);
    assert!(quick_events.iter().any(|e| e["text"] == "HALO"));
    assert!(quick_events.iter().any(|e| e["text"] == "DUNIA"));
    assert!(quick_events.iter().all(|e| e["confidence"] == 0.8));

    // Enhanced corrections for both chunks
    let enhanced_events: Vec<serde_json::Value> = events_of(&body, "enhanced")
        .iter()
        .map(|d| serde_json::from_str(d).unwrap())
        .collect();
    assert_eq!(enhanced_events.len(), 2);
    assert!(enhanced_events.iter().all(|e| e["confidence"] == 0.85));

    // Done closes the stream
    let done_events = events_of(&body, "done");
    assert_eq!(done_events.len(), 1);

    // Per-chunk ordering: raw before quick before enhanced
    let raw_pos = body.find("event: raw").unwrap();
    let quick_pos = body.find("event: quick").unwrap();
    let enhanced_pos = body.find("event: enhanced").unwrap();
    let done_pos = body.find("event: done").unwrap();
    assert!(raw_pos < quick_pos);
    assert!(quick_pos < enhanced_pos);
    assert!(enhanced_pos < done_pos);
}

#[tokio::test]
async fn test_stream_persists_corrected_tiers() {
    let (app, kv, _dir) = setup().await;

    let mut job = JobState::new("job-persist".to_string());
    job.upsert_chunk(chunk(0, "hash-0", "halo dunia"));
    save_job(&kv, &job).await.unwrap();

    let _ = collect_stream(&app, "job-persist").await;

    let stored = tutur_cp::db::jobs::load_job(&kv, "job-persist")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.chunks[0].transcription.quick.as_deref(), Some("HALO DUNIA"));
    assert_eq!(stored.chunks[0].transcription.enhanced.as_deref(), Some("HALO DUNIA"));
    assert_eq!(stored.chunks[0].transcription.final_text, "HALO DUNIA");
    assert!(matches!(stored.status, tutur_cp::models::JobStatus::Done));
}

#[tokio::test]
async fn test_stream_for_unknown_job_completes_with_empty_protocol() {
    let (app, _kv, _dir) = setup().await;

    let body = collect_stream(&app, "job-absent").await;

    let status_events = events_of(&body, "status");
    assert_eq!(status_events.len(), 1);
    let status: serde_json::Value = serde_json::from_str(status_events[0]).unwrap();
    assert_eq!(status["totalChunks"], 0);
    assert_eq!(events_of(&body, "raw").len(), 0);
    assert_eq!(events_of(&body, "done").len(), 1);
}
