//! Job creation and chunk ingest
//!
//! The upstream chunk producer (ASR is out of scope here) creates a job,
//! then posts one chunk per transcribed slice: index, audio hash, raw text
//! and optional timing. Chunks land in job state with the raw text as the
//! provisional final.

use crate::db::jobs::{load_job, save_job};
use crate::error::{ApiError, ApiResult};
use crate::models::{Chunk, ChunkTranscription, JobState, JobStatus};
use crate::AppState;
use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct StartJobResponse {
    pub id: String,
    pub status: JobStatus,
}

/// POST /api/transcribe/start
pub async fn start_job(State(state): State<AppState>) -> ApiResult<Json<StartJobResponse>> {
    let job = JobState::new(Uuid::new_v4().to_string());
    save_job(&state.kv, &job).await?;

    info!(job_id = %job.id, "Transcription job created");

    Ok(Json(StartJobResponse {
        id: job.id,
        status: job.status,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ChunkPayload {
    #[serde(rename = "audioHash")]
    pub audio_hash: String,
    pub text: String,
    pub index: Option<usize>,
    #[serde(rename = "startTime")]
    pub start_time: Option<f64>,
    #[serde(rename = "endTime")]
    pub end_time: Option<f64>,
}

/// POST /api/transcribe/{id}/chunk
pub async fn ingest_chunk(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(payload): Json<ChunkPayload>,
) -> ApiResult<Json<serde_json::Value>> {
    if payload.audio_hash.trim().is_empty() {
        return Err(ApiError::BadRequest("audioHash must not be empty".to_string()));
    }

    let mut job = load_job(&state.kv, &job_id)
        .await?
        .unwrap_or_else(|| JobState::new(job_id.clone()));
    job.id = job_id.clone();
    job.status = JobStatus::Transcribing;

    let index = payload.index.unwrap_or(job.chunks.len());
    job.upsert_chunk(Chunk {
        index,
        audio_hash: payload.audio_hash,
        start_time: payload.start_time,
        end_time: payload.end_time,
        transcription: ChunkTranscription::from_raw(payload.text),
    });

    save_job(&state.kv, &job).await?;

    Ok(Json(json!({ "ok": true, "count": job.chunks.len() })))
}

/// Build transcription job routes
pub fn transcribe_routes() -> Router<AppState> {
    Router::new()
        .route("/api/transcribe/start", post(start_job))
        .route("/api/transcribe/:id/chunk", post(ingest_chunk))
}
