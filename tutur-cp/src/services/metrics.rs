//! Provider observability counters
//!
//! Success/failure counts and round-trip latency aggregates per provider per
//! UTC day, stored beside the quota counters. Telemetry writes are
//! best-effort; a failed write never fails the call it was recording.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;
use tutur_common::kv::NS_QUOTA_COUNTERS;
use tutur_common::{time, KvStore};

const METRICS_TTL: Duration = Duration::from_secs(3 * 24 * 60 * 60);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CountDoc {
    used: u64,
}

/// Latency aggregate for one provider-day
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencyDoc {
    pub sum: u64,
    pub count: u64,
    pub min: u64,
    pub max: u64,
}

/// Daily outcome summary for one provider
#[derive(Debug, Clone, Serialize)]
pub struct ProviderDailyMetrics {
    pub day: String,
    pub success: u64,
    pub failure: u64,
    #[serde(rename = "successRate")]
    pub success_rate: f64,
    #[serde(rename = "averageLatencyMs")]
    pub average_latency_ms: f64,
    #[serde(rename = "minLatencyMs")]
    pub min_latency_ms: u64,
    #[serde(rename = "maxLatencyMs")]
    pub max_latency_ms: u64,
}

fn metrics_key(kind: &str, provider: &str, day: &str) -> String {
    format!("METRICS:{}:{}:day:{}", kind, provider, day)
}

/// Provider metrics over the shared KV store
#[derive(Clone)]
pub struct ProviderMetrics {
    kv: KvStore,
}

impl ProviderMetrics {
    pub fn new(kv: KvStore) -> Self {
        Self { kv }
    }

    async fn read_count(&self, key: &str) -> u64 {
        self.kv
            .get_json::<CountDoc>(NS_QUOTA_COUNTERS, key)
            .await
            .ok()
            .flatten()
            .map(|doc| doc.used)
            .unwrap_or(0)
    }

    async fn inc_count(&self, kind: &str, provider: &str, delta: u64) {
        let key = metrics_key(kind, provider, &time::utc_day_bucket());
        let used = self.read_count(&key).await;
        let doc = CountDoc { used: used + delta };
        if let Err(e) = self
            .kv
            .put_json(NS_QUOTA_COUNTERS, &key, &doc, Some(METRICS_TTL))
            .await
        {
            warn!(key = %key, error = %e, "Metrics write skipped");
        }
    }

    pub async fn inc_success(&self, provider: &str, delta: u64) {
        self.inc_count("success", provider, delta).await;
    }

    pub async fn inc_failure(&self, provider: &str, delta: u64) {
        self.inc_count("failure", provider, delta).await;
    }

    /// Fold one round-trip time into the provider's daily aggregate
    pub async fn record_latency(&self, provider: &str, elapsed: Duration) {
        let ms = elapsed.as_millis() as u64;
        let key = metrics_key("latency", provider, &time::utc_day_bucket());

        let doc = match self
            .kv
            .get_json::<LatencyDoc>(NS_QUOTA_COUNTERS, &key)
            .await
            .ok()
            .flatten()
        {
            Some(prev) => LatencyDoc {
                sum: prev.sum + ms,
                count: prev.count + 1,
                min: prev.min.min(ms),
                max: prev.max.max(ms),
            },
            None => LatencyDoc {
                sum: ms,
                count: 1,
                min: ms,
                max: ms,
            },
        };

        if let Err(e) = self
            .kv
            .put_json(NS_QUOTA_COUNTERS, &key, &doc, Some(METRICS_TTL))
            .await
        {
            warn!(key = %key, error = %e, "Latency write skipped");
        }
    }

    /// Today's aggregate for one provider
    pub async fn daily(&self, provider: &str) -> ProviderDailyMetrics {
        let day = time::utc_day_bucket();
        let success = self.read_count(&metrics_key("success", provider, &day)).await;
        let failure = self.read_count(&metrics_key("failure", provider, &day)).await;
        let total = success + failure;
        let success_rate = if total > 0 {
            success as f64 / total as f64
        } else {
            1.0
        };

        let latency = self
            .kv
            .get_json::<LatencyDoc>(
                NS_QUOTA_COUNTERS,
                &metrics_key("latency", provider, &day),
            )
            .await
            .ok()
            .flatten();

        let (average, min, max) = match latency {
            Some(doc) if doc.count > 0 => {
                (doc.sum as f64 / doc.count as f64, doc.min, doc.max)
            }
            _ => (0.0, 0, 0),
        };

        ProviderDailyMetrics {
            day,
            success,
            failure,
            success_rate,
            average_latency_ms: average,
            min_latency_ms: min,
            max_latency_ms: max,
        }
    }
}
