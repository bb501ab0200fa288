//! Batch correction endpoint
//!
//! `POST /api/correct/batch`: cache-first per segment, aggregation queue
//! for the misses, faithfulness guard on everything. Whole-request overload
//! (every segment rejected by admission control) surfaces as a retryable
//! 429; partial overload degrades those segments to their original text.

use crate::error::{ApiError, ApiResult};
use crate::faithfulness::FaithfulnessReport;
use crate::models::{CorrectionMode, CorrectionSegment};
use crate::services::batching::QueueError;
use crate::services::correction::{self, CorrectionOutcome};
use crate::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

/// Incoming segment; invalid entries are dropped, not fatal
#[derive(Debug, Deserialize)]
struct SegmentPayload {
    #[serde(rename = "audioHash")]
    audio_hash: Option<String>,
    text: Option<String>,
    mode: Option<String>,
    glossary: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct BatchCorrectionRequest {
    segments: Vec<SegmentPayload>,
}

/// Per-segment correction result
#[derive(Debug, Serialize)]
pub struct CorrectionResult {
    #[serde(rename = "audioHash")]
    pub audio_hash: String,
    pub corrected: String,
    pub confidence: f64,
    pub provider: String,
    pub cached: bool,
    pub faithfulness: FaithfulnessReport,
}

#[derive(Debug, Serialize)]
pub struct BatchCorrectionResponse {
    pub provider: String,
    pub results: Vec<CorrectionResult>,
}

fn parse_segments(value: serde_json::Value) -> ApiResult<Vec<CorrectionSegment>> {
    let request: BatchCorrectionRequest = serde_json::from_value(value)
        .map_err(|_| ApiError::BadRequest("expected { segments: [...] }".to_string()))?;

    let segments: Vec<CorrectionSegment> = request
        .segments
        .into_iter()
        .filter_map(|payload| {
            let audio_hash = payload.audio_hash?;
            let text = payload.text?;
            let mode = match payload.mode.as_deref() {
                Some("enhanced") => CorrectionMode::Enhanced,
                _ => CorrectionMode::Quick,
            };
            Some(CorrectionSegment {
                audio_hash,
                text,
                mode,
                glossary: payload.glossary,
            })
        })
        .collect();

    if segments.is_empty() {
        return Err(ApiError::BadRequest("No valid segments".to_string()));
    }
    Ok(segments)
}

/// POST /api/correct/batch
pub async fn correct_batch(
    State(state): State<AppState>,
    Json(value): Json<serde_json::Value>,
) -> ApiResult<Response> {
    let segments = parse_segments(value)?;

    // All segments go through the shared path concurrently so the
    // aggregation queue can coalesce them across this request and others
    let outcomes = futures::future::join_all(
        segments
            .iter()
            .map(|segment| correction::correct_segment(&state.pipeline, segment)),
    )
    .await;

    let mut overloaded = false;
    let mut any_ok = false;
    let mut had_cache_hit = false;
    let mut had_router = false;

    let results: Vec<CorrectionResult> = segments
        .iter()
        .zip(outcomes)
        .map(|(segment, outcome)| match outcome {
            Ok(outcome) => {
                any_ok = true;
                if outcome.cached {
                    had_cache_hit = true;
                } else {
                    had_router = true;
                }
                to_result(segment, outcome)
            }
            Err(e) => {
                if e == QueueError::Overloaded {
                    overloaded = true;
                } else {
                    warn!(audio_hash = %segment.audio_hash, error = %e, "Segment correction failed");
                }
                degraded_result(segment)
            }
        })
        .collect();

    if overloaded && !any_ok {
        return Ok((
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": "queue_overloaded", "retryAfterSeconds": 2 })),
        )
            .into_response());
    }

    let provider = if had_router && had_cache_hit {
        "mixed"
    } else if had_router {
        "router"
    } else {
        "cache"
    };

    let response = BatchCorrectionResponse {
        provider: provider.to_string(),
        results,
    };
    info!(provider = %response.provider, count = response.results.len(), "Batch correction served");

    Ok(Json(response).into_response())
}

fn to_result(segment: &CorrectionSegment, outcome: CorrectionOutcome) -> CorrectionResult {
    CorrectionResult {
        audio_hash: segment.audio_hash.clone(),
        corrected: outcome.text,
        confidence: outcome.confidence,
        provider: outcome.provider,
        cached: outcome.cached,
        faithfulness: outcome.faithfulness,
    }
}

/// A segment the pipeline could not serve degrades to its original text,
/// reported at raw-tier confidence
fn degraded_result(segment: &CorrectionSegment) -> CorrectionResult {
    CorrectionResult {
        audio_hash: segment.audio_hash.clone(),
        corrected: segment.text.clone(),
        confidence: 0.7,
        provider: "none".to_string(),
        cached: false,
        faithfulness: crate::faithfulness::evaluate(
            &segment.text,
            &segment.text,
            Default::default(),
        ),
    }
}

/// Build batch correction routes
pub fn correct_routes() -> Router<AppState> {
    Router::new().route("/api/correct/batch", post(correct_batch))
}
