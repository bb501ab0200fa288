//! Quota status endpoint

use crate::providers::PROVIDER_NAMES;
use crate::services::quota::QuotaCounter;
use crate::AppState;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::collections::BTreeMap;
use tutur_common::time;

#[derive(Debug, Serialize)]
pub struct ProviderQuota {
    pub day: QuotaCounter,
    pub minute: QuotaCounter,
}

#[derive(Debug, Serialize)]
pub struct QuotaStatusResponse {
    pub day: String,
    pub minute: String,
    pub quotas: BTreeMap<String, ProviderQuota>,
}

/// GET /api/quotas
pub async fn quota_status(State(state): State<AppState>) -> Json<QuotaStatusResponse> {
    let mut quotas = BTreeMap::new();
    for provider in PROVIDER_NAMES {
        let (day, minute) = state.pipeline.quota.snapshot(provider).await;
        quotas.insert(provider.to_string(), ProviderQuota { day, minute });
    }

    Json(QuotaStatusResponse {
        day: time::utc_day_bucket(),
        minute: time::utc_minute_bucket(),
        quotas,
    })
}

/// Build quota routes
pub fn quota_routes() -> Router<AppState> {
    Router::new().route("/api/quotas", get(quota_status))
}
