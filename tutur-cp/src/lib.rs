//! tutur-cp library interface
//!
//! The adaptive correction and delivery pipeline: request-coalescing
//! batcher, quota-aware provider fallback router, two-tier result cache,
//! faithfulness guard, and the per-job streaming state machine.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod faithfulness;
pub mod models;
pub mod pipeline;
pub mod prompts;
pub mod providers;
pub mod services;
pub mod text;

pub use crate::error::{ApiError, ApiResult};

use crate::pipeline::Pipeline;
use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tutur_common::KvStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Persistent key-value store (quota counters, caches, job state)
    pub kv: KvStore,
    /// The process-wide correction pipeline
    pub pipeline: Arc<Pipeline>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(kv: KvStore, pipeline: Arc<Pipeline>) -> Self {
        Self {
            kv,
            pipeline,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::correct::correct_routes())
        .merge(api::transcribe::transcribe_routes())
        .merge(api::stream::stream_routes())
        .merge(api::community::community_routes())
        .merge(api::quotas::quota_routes())
        .merge(api::metrics::metrics_routes())
        .merge(api::health::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
