//! Community correction submissions
//!
//! Crowd-sourced corrections feed the community cache tier, which the
//! pipeline trusts ahead of any provider output.

use crate::error::{ApiError, ApiResult};
use crate::AppState;
use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct SubmitPayload {
    #[serde(rename = "audioHash")]
    pub audio_hash: String,
    pub text: String,
    #[serde(default)]
    pub corrections: String,
    pub contributor: Option<String>,
}

/// POST /api/community/submit
pub async fn submit(
    State(state): State<AppState>,
    Json(payload): Json<SubmitPayload>,
) -> ApiResult<Json<serde_json::Value>> {
    if payload.audio_hash.trim().is_empty() || payload.text.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "audioHash and text must not be empty".to_string(),
        ));
    }

    let contributor = payload.contributor.as_deref().unwrap_or("anon");
    state
        .pipeline
        .cache
        .put_community(&payload.audio_hash, &payload.text, &payload.corrections, contributor)
        .await?;

    info!(audio_hash = %payload.audio_hash, contributor, "Community correction stored");

    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct UpvotePayload {
    #[serde(rename = "audioHash")]
    pub audio_hash: String,
}

/// POST /api/community/upvote
pub async fn upvote(
    State(state): State<AppState>,
    Json(payload): Json<UpvotePayload>,
) -> ApiResult<Json<serde_json::Value>> {
    let upvotes = state
        .pipeline
        .cache
        .upvote_community(&payload.audio_hash)
        .await
        .map_err(|e| match e {
            tutur_common::Error::NotFound(msg) => ApiError::NotFound(msg),
            other => ApiError::Common(other),
        })?;

    Ok(Json(json!({ "ok": true, "upvotes": upvotes })))
}

/// Build community routes
pub fn community_routes() -> Router<AppState> {
    Router::new()
        .route("/api/community/submit", post(submit))
        .route("/api/community/upvote", post(upvote))
}
