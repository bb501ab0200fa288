//! Request-coalescing aggregation queue
//!
//! Individual correction requests are grouped into small batches keyed by
//! (mode, glossary signature) so one router call serves several concurrent
//! requests. A queue flushes when it reaches the max batch size or when its
//! mode's flush timer fires, whichever comes first, so a lone lingering item
//! is still served promptly.
//!
//! Admission control is deliberate backpressure: past the per-queue or
//! process-wide pending ceilings new entries are rejected immediately and
//! callers fall back to uncorrected text instead of growing memory and
//! provider load without bound.

use crate::config::BatchConfig;
use crate::models::CorrectionMode;
use crate::services::cache::normalize_glossary;
use crate::services::metrics::ProviderMetrics;
use crate::services::router::{BatchCorrector, PROVIDER_NONE};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Why an enqueued correction did not produce a corrected line
#[derive(Debug, Clone, Error, PartialEq)]
pub enum QueueError {
    /// Admission control rejection; retryable
    #[error("queue_overloaded")]
    Overloaded,

    /// The whole batch this entry was flushed with failed
    #[error("correction batch failed: {0}")]
    Batch(String),

    /// The queue shut down before the entry resolved
    #[error("correction queue closed")]
    Closed,
}

/// Pending-count snapshot for one batch queue
#[derive(Debug, Clone, serde::Serialize)]
pub struct QueueStat {
    pub key: String,
    pub count: usize,
}

/// A pending segment and its completion handle
struct QueueEntry {
    text: String,
    #[allow(dead_code)]
    audio_hash: String,
    tx: oneshot::Sender<Result<String, QueueError>>,
}

/// One keyed queue; created lazily, reused across flushes for the life of
/// the process
struct BatchQueue {
    mode: CorrectionMode,
    glossary: Option<Vec<String>>,
    entries: Vec<QueueEntry>,
    /// Pending flush timer; cancelled and rescheduled, never shared
    timer: Option<JoinHandle<()>>,
    flush_ms: u64,
}

impl BatchQueue {
    fn new(mode: CorrectionMode, glossary: Option<Vec<String>>, flush_ms: u64) -> Self {
        Self {
            mode,
            glossary,
            entries: Vec::new(),
            timer: None,
            flush_ms,
        }
    }
}

struct AggregationInner {
    corrector: Arc<dyn BatchCorrector>,
    metrics: ProviderMetrics,
    config: BatchConfig,
    queues: Mutex<HashMap<String, BatchQueue>>,
    total_pending: AtomicUsize,
}

/// Cross-request correction batcher
#[derive(Clone)]
pub struct AggregationQueue {
    inner: Arc<AggregationInner>,
}

fn batch_key(mode: CorrectionMode, glossary: &Option<Vec<String>>) -> String {
    match glossary {
        Some(terms) => format!("{}|{}", mode, terms.join("|")),
        None => format!("{}|", mode),
    }
}

impl AggregationQueue {
    pub fn new(
        corrector: Arc<dyn BatchCorrector>,
        metrics: ProviderMetrics,
        config: BatchConfig,
    ) -> Self {
        Self {
            inner: Arc::new(AggregationInner {
                corrector,
                metrics,
                config,
                queues: Mutex::new(HashMap::new()),
                total_pending: AtomicUsize::new(0),
            }),
        }
    }

    /// Queue one text for correction and await its corrected line
    pub async fn enqueue(
        &self,
        mode: CorrectionMode,
        text: String,
        audio_hash: String,
        glossary: Option<&[String]>,
    ) -> Result<String, QueueError> {
        let glossary = {
            let normalized = normalize_glossary(glossary);
            if normalized.is_empty() {
                None
            } else {
                Some(normalized)
            }
        };
        let key = batch_key(mode, &glossary);

        let rx = {
            let mut queues = self.inner.queues.lock().await;
            let flush_ms = match mode {
                CorrectionMode::Quick => self.inner.config.quick_flush_ms,
                _ => self.inner.config.default_flush_ms,
            };
            let queue = queues
                .entry(key.clone())
                .or_insert_with(|| BatchQueue::new(mode, glossary, flush_ms));

            if queue.entries.len() >= self.inner.config.max_pending_per_queue
                || self.inner.total_pending.load(Ordering::SeqCst)
                    >= self.inner.config.max_total_pending
            {
                warn!(key = %key, "Aggregation queue overloaded, rejecting entry");
                return Err(QueueError::Overloaded);
            }

            let (tx, rx) = oneshot::channel();
            queue.entries.push(QueueEntry {
                text,
                audio_hash,
                tx,
            });
            self.inner.total_pending.fetch_add(1, Ordering::SeqCst);

            if queue.entries.len() >= self.inner.config.max_batch {
                // Full batch: flush in the background with zero wait
                if let Some(timer) = queue.timer.take() {
                    timer.abort();
                }
                let inner = self.inner.clone();
                let flush_key = key.clone();
                tokio::spawn(async move {
                    AggregationInner::flush(inner, flush_key, false).await;
                });
            } else if queue.timer.is_none() {
                queue.timer = Some(AggregationInner::schedule_flush(
                    self.inner.clone(),
                    key.clone(),
                    queue.flush_ms,
                ));
            }

            rx
        };

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(QueueError::Closed),
        }
    }

    /// Pending counts per batch key, for observability
    pub async fn queue_stats(&self) -> (usize, Vec<QueueStat>) {
        let queues = self.inner.queues.lock().await;
        let mut stats: Vec<QueueStat> = queues
            .iter()
            .map(|(key, q)| QueueStat {
                key: key.clone(),
                count: q.entries.len(),
            })
            .collect();
        stats.sort_by(|a, b| a.key.cmp(&b.key));
        let total = stats.iter().map(|s| s.count).sum();
        (total, stats)
    }
}

impl AggregationInner {
    fn schedule_flush(inner: Arc<Self>, key: String, delay_ms: u64) -> JoinHandle<()> {
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            Self::flush(inner, key, true).await;
        })
    }

    /// Atomically take up to one batch from the keyed queue, route it, and
    /// fan the result out to every taken entry.
    ///
    /// `from_timer` distinguishes the expiring timer from an immediate flush:
    /// the timer must not abort itself mid-flush, an immediate flush cancels
    /// whatever timer is pending.
    async fn flush(inner: Arc<Self>, key: String, from_timer: bool) {
        let (batch, mode, glossary, flush_ms) = {
            let mut queues = inner.queues.lock().await;
            let Some(queue) = queues.get_mut(&key) else {
                return;
            };

            if from_timer {
                // This very task owns the handle; dropping it is enough
                queue.timer = None;
            } else if let Some(timer) = queue.timer.take() {
                timer.abort();
            }

            if queue.entries.is_empty() {
                return;
            }

            let take = queue.entries.len().min(inner.config.max_batch);
            let batch: Vec<QueueEntry> = queue.entries.drain(..take).collect();
            inner.total_pending.fetch_sub(batch.len(), Ordering::SeqCst);

            (batch, queue.mode, queue.glossary.clone(), queue.flush_ms)
        };

        debug!(key = %key, count = batch.len(), "Flushing correction batch");

        let texts: Vec<String> = batch.iter().map(|e| e.text.clone()).collect();
        let started = Instant::now();

        match inner
            .corrector
            .correct_batch(&texts, mode, glossary.as_deref())
            .await
        {
            Ok(routed) => {
                if routed.provider != PROVIDER_NONE {
                    inner
                        .metrics
                        .record_latency(&routed.provider, started.elapsed())
                        .await;
                }
                for (i, entry) in batch.into_iter().enumerate() {
                    let corrected = routed
                        .texts
                        .get(i)
                        .cloned()
                        .unwrap_or_else(|| entry.text.clone());
                    // Receiver may have gone away; nothing to do about it
                    let _ = entry.tx.send(Ok(corrected));
                }
            }
            Err(e) => {
                // Batch-granular failure: every entry in this slice fails,
                // entries that were not taken are untouched
                warn!(key = %key, error = %e, "Correction batch failed");
                let error = QueueError::Batch(e.to_string());
                for entry in batch {
                    let _ = entry.tx.send(Err(error.clone()));
                }
            }
        }

        // More entries may have accumulated during the router call
        {
            let mut queues = inner.queues.lock().await;
            if let Some(queue) = queues.get_mut(&key) {
                if !queue.entries.is_empty() && queue.timer.is_none() {
                    queue.timer =
                        Some(Self::schedule_flush(inner.clone(), key.clone(), flush_ms));
                }
            }
        }
    }
}
