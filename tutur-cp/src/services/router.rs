//! Quota-aware provider fallback router
//!
//! Walks a fixed provider priority list for each batch. A provider is skipped
//! when it is disabled, missing credentials, out of quota, or close enough to
//! its daily ceiling that the preemptive switch trips. The first provider to
//! answer wins; a provider that fails is never retried within one invocation.
//! Correction is always best-effort: if every provider is skipped or fails
//! the batch comes back unchanged under `provider: "none"`.

use crate::models::CorrectionMode;
use crate::providers::{CorrectionProvider, ProviderError};
use crate::services::metrics::ProviderMetrics;
use crate::services::quota::QuotaLedger;
use crate::text;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Daily usage fraction at which the preemptive switch trips
const PREEMPTIVE_SWITCH_THRESHOLD: f64 = 0.9;

/// Sentinel provider name for the exhausted-fallback case
pub const PROVIDER_NONE: &str = "none";

/// Router result for one batch
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedBatch {
    pub provider: String,
    pub texts: Vec<String>,
}

/// The aggregation queue's view of the router: one call per batch
///
/// The production implementation never fails (it degrades to
/// `provider: "none"`); the error channel exists so a corrector fault still
/// rejects its whole batch, batch-granular, with no per-item retry.
#[async_trait]
pub trait BatchCorrector: Send + Sync {
    async fn correct_batch(
        &self,
        texts: &[String],
        mode: CorrectionMode,
        glossary: Option<&[String]>,
    ) -> Result<RoutedBatch, ProviderError>;
}

/// Provider fallback router
pub struct ProviderRouter {
    providers: Vec<Arc<dyn CorrectionProvider>>,
    quota: QuotaLedger,
    metrics: ProviderMetrics,
    /// Bounds concurrent outbound provider calls across all batches
    provider_permits: Arc<Semaphore>,
}

impl ProviderRouter {
    pub fn new(
        providers: Vec<Arc<dyn CorrectionProvider>>,
        quota: QuotaLedger,
        metrics: ProviderMetrics,
        provider_permits: Arc<Semaphore>,
    ) -> Self {
        Self {
            providers,
            quota,
            metrics,
            provider_permits,
        }
    }

    pub async fn correct_with_fallback(
        &self,
        texts: &[String],
        mode: CorrectionMode,
        glossary: Option<&[String]>,
    ) -> RoutedBatch {
        let need = texts.len() as u64;

        for provider in &self.providers {
            let name = provider.name();

            if !provider.available() {
                debug!(provider = name, "Skipping unavailable provider");
                continue;
            }
            if !self.quota.has_quota(name, need).await {
                debug!(provider = name, "Skipping provider without quota");
                continue;
            }
            if self
                .quota
                .preemptive_switch(name, PREEMPTIVE_SWITCH_THRESHOLD)
                .await
            {
                debug!(provider = name, "Preemptive switch away from provider");
                continue;
            }

            let prepped = text::optimize_batch(texts, mode);
            debug!(provider = name, count = prepped.len(), mode = %mode, "Trying provider");

            let result = {
                // Closed only on shutdown; treat as a failed attempt
                let _permit = match self.provider_permits.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                provider.correct_batch(&prepped, mode, glossary).await
            };

            match result {
                Ok(corrected) => {
                    self.quota.inc_quota(name, need).await;
                    self.metrics.inc_success(name, need).await;
                    debug!(provider = name, "Provider answered");
                    return RoutedBatch {
                        provider: name.to_string(),
                        texts: corrected,
                    };
                }
                Err(e) => {
                    warn!(provider = name, error = %e, "Provider failed, falling back");
                    self.metrics.inc_failure(name, need).await;
                    continue;
                }
            }
        }

        warn!("All providers unavailable, returning original texts");
        RoutedBatch {
            provider: PROVIDER_NONE.to_string(),
            texts: texts.to_vec(),
        }
    }
}

#[async_trait]
impl BatchCorrector for ProviderRouter {
    async fn correct_batch(
        &self,
        texts: &[String],
        mode: CorrectionMode,
        glossary: Option<&[String]>,
    ) -> Result<RoutedBatch, ProviderError> {
        Ok(self.correct_with_fallback(texts, mode, glossary).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tutur_common::kv::init_database;
    use tutur_common::KvStore;

    /// Scriptable provider for router tests
    struct FakeProvider {
        name: &'static str,
        available: bool,
        fail: bool,
        calls: AtomicUsize,
    }

    impl FakeProvider {
        fn new(name: &'static str, available: bool, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                available,
                fail,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl CorrectionProvider for FakeProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        fn available(&self) -> bool {
            self.available
        }

        async fn correct_batch(
            &self,
            texts: &[String],
            _mode: CorrectionMode,
            _glossary: Option<&[String]>,
        ) -> Result<Vec<String>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ProviderError::Status {
                    provider: self.name,
                    status: 500,
                });
            }
            Ok(texts
                .iter()
                .map(|t| format!("{}:{}", self.name, t))
                .collect())
        }
    }

    async fn test_router(
        providers: Vec<Arc<dyn CorrectionProvider>>,
    ) -> (ProviderRouter, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let pool = init_database(&dir.path().join("router_test.db"))
            .await
            .expect("init database");
        let kv = KvStore::new(pool);
        let router = ProviderRouter::new(
            providers,
            QuotaLedger::new(kv.clone()),
            ProviderMetrics::new(kv),
            Arc::new(Semaphore::new(5)),
        );
        (router, dir)
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_first_available_provider_wins() {
        let a = FakeProvider::new("groq", true, false);
        let b = FakeProvider::new("huggingface", true, false);
        let (router, _dir) = test_router(vec![a.clone(), b.clone()]).await;

        let routed = router
            .correct_with_fallback(&texts(&["halo"]), CorrectionMode::Quick, None)
            .await;
        assert_eq!(routed.provider, "groq");
        assert_eq!(routed.texts, vec!["groq:halo".to_string()]);
        assert_eq!(b.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fallback_to_second_when_first_disabled() {
        let a = FakeProvider::new("groq", false, false);
        let b = FakeProvider::new("huggingface", true, false);
        let (router, _dir) = test_router(vec![a, b]).await;

        let routed = router
            .correct_with_fallback(&texts(&["halo"]), CorrectionMode::Quick, None)
            .await;
        assert_eq!(routed.provider, "huggingface");
    }

    #[tokio::test]
    async fn test_fallback_to_second_when_first_fails() {
        let a = FakeProvider::new("groq", true, true);
        let b = FakeProvider::new("huggingface", true, false);
        let (router, _dir) = test_router(vec![a.clone(), b]).await;

        let routed = router
            .correct_with_fallback(&texts(&["halo"]), CorrectionMode::Quick, None)
            .await;
        assert_eq!(routed.provider, "huggingface");
        // The failing provider was attempted exactly once
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_all_unavailable_returns_none_with_inputs() {
        let a = FakeProvider::new("groq", false, false);
        let b = FakeProvider::new("huggingface", false, false);
        let (router, _dir) = test_router(vec![a, b]).await;

        let inputs = texts(&["a", "b"]);
        let routed = router
            .correct_with_fallback(&inputs, CorrectionMode::Quick, None)
            .await;
        assert_eq!(routed.provider, PROVIDER_NONE);
        assert_eq!(routed.texts, inputs);
    }

    #[tokio::test]
    async fn test_all_failing_returns_none_with_inputs() {
        let a = FakeProvider::new("groq", true, true);
        let b = FakeProvider::new("huggingface", true, true);
        let (router, _dir) = test_router(vec![a, b]).await;

        let inputs = texts(&["a"]);
        let routed = router
            .correct_with_fallback(&inputs, CorrectionMode::Quick, None)
            .await;
        assert_eq!(routed.provider, PROVIDER_NONE);
        assert_eq!(routed.texts, inputs);
    }

    #[tokio::test]
    async fn test_success_increments_quota() {
        let a = FakeProvider::new("groq", true, false);
        let (router, _dir) = test_router(vec![a]).await;

        router
            .correct_with_fallback(&texts(&["a", "b", "c"]), CorrectionMode::Quick, None)
            .await;

        let (_day, minute) = router.quota.snapshot("groq").await;
        assert_eq!(minute.used, 3);
    }

    #[tokio::test]
    async fn test_provider_out_of_quota_is_skipped() {
        let a = FakeProvider::new("groq", true, false);
        let b = FakeProvider::new("huggingface", true, false);
        let (router, _dir) = test_router(vec![a.clone(), b]).await;

        // Exhaust groq's minute bucket
        router.quota.inc_quota("groq", 30).await;

        let routed = router
            .correct_with_fallback(&texts(&["halo"]), CorrectionMode::Quick, None)
            .await;
        assert_eq!(routed.provider, "huggingface");
        assert_eq!(a.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_preemptive_switch_skips_provider_near_ceiling() {
        let a = FakeProvider::new("huggingface", true, false);
        let b = FakeProvider::new("groq", true, false);
        let (router, _dir) = test_router(vec![a.clone(), b]).await;

        // 90% of huggingface's 1000/day ceiling
        router.quota.inc_quota("huggingface", 900).await;

        let routed = router
            .correct_with_fallback(&texts(&["halo"]), CorrectionMode::Quick, None)
            .await;
        assert_eq!(routed.provider, "groq");
        assert_eq!(a.calls.load(Ordering::SeqCst), 0);
    }
}
