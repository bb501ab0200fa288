//! Per-provider quota ledger
//!
//! Usage counters live in the persistent KV store under UTC day and minute
//! bucket keys, so buckets roll over automatically with no reset logic.
//! Accounting is deliberately soft: counter reads and writes that fail are
//! logged and degraded (read as empty, write skipped) because losing a count
//! must never block a correction. Increments are read-then-write, so
//! enforcement across process instances is best-effort, not exact.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;
use tutur_common::kv::NS_QUOTA_COUNTERS;
use tutur_common::{time, KvStore};

/// Day counters survive long enough to inspect yesterday's usage
const DAY_COUNTER_TTL: Duration = Duration::from_secs(2 * 24 * 60 * 60);
/// Minute counters are short-lived by design
const MINUTE_COUNTER_TTL: Duration = Duration::from_secs(10 * 60);

/// Daily request ceilings per provider
fn daily_limit(provider: &str) -> Option<u64> {
    match provider {
        "groq" => Some(14_400),
        "huggingface" => Some(1_000),
        _ => None,
    }
}

/// Per-minute ceilings for rate-sensitive providers
fn minute_limit(provider: &str) -> Option<u64> {
    match provider {
        "groq" => Some(30),
        _ => None,
    }
}

/// One persisted usage counter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaCounter {
    pub used: u64,
    pub limit: Option<u64>,
    #[serde(rename = "resetAt")]
    pub reset_at: Option<String>,
}

impl Default for QuotaCounter {
    fn default() -> Self {
        Self {
            used: 0,
            limit: None,
            reset_at: None,
        }
    }
}

fn day_counter_key(provider: &str, day: &str) -> String {
    format!("{}:day:{}", provider, day)
}

fn minute_counter_key(provider: &str, minute: &str) -> String {
    format!("{}:minute:{}", provider, minute)
}

/// Quota ledger over the shared KV store
#[derive(Clone)]
pub struct QuotaLedger {
    kv: KvStore,
}

impl QuotaLedger {
    pub fn new(kv: KvStore) -> Self {
        Self { kv }
    }

    async fn read_counter(&self, key: &str) -> QuotaCounter {
        match self.kv.get_json::<QuotaCounter>(NS_QUOTA_COUNTERS, key).await {
            Ok(Some(counter)) => counter,
            Ok(None) => QuotaCounter::default(),
            Err(e) => {
                warn!(key, error = %e, "Quota counter read failed, assuming empty");
                QuotaCounter::default()
            }
        }
    }

    async fn write_counter(&self, key: &str, used: u64, limit: Option<u64>, ttl: Duration) {
        let counter = QuotaCounter {
            used,
            limit,
            reset_at: Some(time::next_utc_midnight().to_rfc3339()),
        };
        if let Err(e) = self
            .kv
            .put_json(NS_QUOTA_COUNTERS, key, &counter, Some(ttl))
            .await
        {
            warn!(key, error = %e, "Quota counter write skipped");
        }
    }

    /// Whether `need` more calls stay within the provider's daily and
    /// per-minute limits. Providers without limits always have quota.
    pub async fn has_quota(&self, provider: &str, need: u64) -> bool {
        if let Some(limit) = daily_limit(provider) {
            let counter = self
                .read_counter(&day_counter_key(provider, &time::utc_day_bucket()))
                .await;
            if counter.used + need > limit {
                return false;
            }
        }

        if let Some(limit) = minute_limit(provider) {
            let counter = self
                .read_counter(&minute_counter_key(provider, &time::utc_minute_bucket()))
                .await;
            if counter.used + need > limit {
                return false;
            }
        }

        true
    }

    /// Whether daily usage has crossed `threshold × limit`, steering traffic
    /// away from the provider before it hard-fails near the boundary.
    pub async fn preemptive_switch(&self, provider: &str, threshold: f64) -> bool {
        let Some(limit) = daily_limit(provider) else {
            return false;
        };
        let counter = self
            .read_counter(&day_counter_key(provider, &time::utc_day_bucket()))
            .await;
        counter.used as f64 / limit as f64 >= threshold
    }

    /// Record `delta` calls against the provider's current buckets
    pub async fn inc_quota(&self, provider: &str, delta: u64) {
        if let Some(limit) = daily_limit(provider) {
            let key = day_counter_key(provider, &time::utc_day_bucket());
            let counter = self.read_counter(&key).await;
            self.write_counter(&key, counter.used + delta, Some(limit), DAY_COUNTER_TTL)
                .await;
        }

        if let Some(limit) = minute_limit(provider) {
            let key = minute_counter_key(provider, &time::utc_minute_bucket());
            let counter = self.read_counter(&key).await;
            self.write_counter(&key, counter.used + delta, Some(limit), MINUTE_COUNTER_TTL)
                .await;
        }
    }

    /// Current counters for one provider, for the quota status endpoint
    pub async fn snapshot(&self, provider: &str) -> (QuotaCounter, QuotaCounter) {
        let mut day = self
            .read_counter(&day_counter_key(provider, &time::utc_day_bucket()))
            .await;
        if day.limit.is_none() {
            day.limit = daily_limit(provider);
        }
        let mut minute = self
            .read_counter(&minute_counter_key(provider, &time::utc_minute_bucket()))
            .await;
        if minute.limit.is_none() {
            minute.limit = minute_limit(provider);
        }
        (day, minute)
    }
}
