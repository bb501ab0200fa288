//! Provider and queue observability endpoint

use crate::providers::PROVIDER_NAMES;
use crate::services::batching::QueueStat;
use crate::services::metrics::ProviderDailyMetrics;
use crate::AppState;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
pub struct QueueSnapshot {
    #[serde(rename = "totalItems")]
    pub total_items: usize,
    pub queues: Vec<QueueStat>,
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub providers: BTreeMap<String, ProviderDailyMetrics>,
    pub queue: QueueSnapshot,
}

/// GET /api/metrics/providers
pub async fn provider_metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    let mut providers = BTreeMap::new();
    for provider in PROVIDER_NAMES {
        providers.insert(
            provider.to_string(),
            state.pipeline.metrics.daily(provider).await,
        );
    }

    let (total_items, queues) = state.pipeline.queue.queue_stats().await;

    Json(MetricsResponse {
        providers,
        queue: QueueSnapshot {
            total_items,
            queues,
        },
    })
}

/// Build metrics routes
pub fn metrics_routes() -> Router<AppState> {
    Router::new().route("/api/metrics/providers", get(provider_metrics))
}
