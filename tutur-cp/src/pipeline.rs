//! Pipeline assembly
//!
//! One `Pipeline` per process owns the batch queues, the semaphores, the
//! quota ledger and the caches, and is passed by reference into request
//! handlers through the application state. Handlers never touch shared
//! mutable module state.

use crate::config::PipelineConfig;
use crate::providers::build_providers;
use crate::services::batching::AggregationQueue;
use crate::services::cache::ResultCache;
use crate::services::metrics::ProviderMetrics;
use crate::services::quota::QuotaLedger;
use crate::services::router::{BatchCorrector, ProviderRouter};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tutur_common::KvStore;

/// Process-wide pipeline state
pub struct Pipeline {
    pub quota: QuotaLedger,
    pub cache: ResultCache,
    pub metrics: ProviderMetrics,
    pub queue: AggregationQueue,
    /// Bounds concurrent persistent-store writes
    pub store_permits: Arc<Semaphore>,
    pub config: PipelineConfig,
}

impl Pipeline {
    /// Build the production pipeline: providers behind the fallback router
    /// behind the aggregation queue.
    pub fn new(kv: KvStore, config: PipelineConfig) -> Self {
        let quota = QuotaLedger::new(kv.clone());
        let metrics = ProviderMetrics::new(kv.clone());
        let providers = build_providers(&config.providers);
        let provider_permits = Arc::new(Semaphore::new(config.provider_concurrency));
        let router = Arc::new(ProviderRouter::new(
            providers,
            quota.clone(),
            metrics.clone(),
            provider_permits,
        ));
        Self::with_corrector(kv, config, router)
    }

    /// Build a pipeline around an arbitrary batch corrector
    ///
    /// Dependency-injection seam: integration tests drive the full queue,
    /// guard and orchestrator without touching the network.
    pub fn with_corrector(
        kv: KvStore,
        config: PipelineConfig,
        corrector: Arc<dyn BatchCorrector>,
    ) -> Self {
        let quota = QuotaLedger::new(kv.clone());
        let cache = ResultCache::new(kv.clone());
        let metrics = ProviderMetrics::new(kv);
        let queue = AggregationQueue::new(corrector, metrics.clone(), config.batch.clone());
        let store_permits = Arc::new(Semaphore::new(config.store_write_concurrency));

        Self {
            quota,
            cache,
            metrics,
            queue,
            store_permits,
            config,
        }
    }
}
