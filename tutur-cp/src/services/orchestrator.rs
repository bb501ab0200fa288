//! Job stream orchestrator
//!
//! Drives one job through its correction tiers and emits the SSE protocol:
//! `status`, then `raw`/`progress` per chunk, then the quick wave, then the
//! enhanced wave seeded from quick, then `done`. Chunk corrections run in
//! small in-flight groups with settle-all semantics so one slow or failing
//! chunk cannot stall the others; failures inside one chunk never abort the
//! job. Raw always precedes quick, quick precedes enhanced for a chunk;
//! across chunks events arrive in batch completion order.
//!
//! Job state writes are throttled: forced at start and completion, otherwise
//! only after enough mutations or elapsed time, under a hard per-job write
//! ceiling that bounds storage cost regardless of chunk count.

use crate::db::jobs::{load_job, save_job};
use crate::events::JobStreamEvent;
use crate::models::{CorrectionMode, CorrectionSegment, JobState, JobStatus};
use crate::pipeline::Pipeline;
use crate::services::correction::{self, CorrectionOutcome};
use crate::AppState;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex, Semaphore};
use tracing::{error, info, warn};
use tutur_common::{time, KvStore};

/// Hard per-job write ceiling
const MAX_JOBSTATE_WRITES: u32 = 320;
/// Mutations accumulated before an intermediate write is considered
const WRITE_BATCH_THRESHOLD: u32 = 4;
/// Minimum interval between intermediate writes
const WRITE_INTERVAL: Duration = Duration::from_millis(500);
/// Chunk corrections in flight at once per wave
const WAVE_CONCURRENCY: usize = 10;

struct PersistMeta {
    dirty: bool,
    dirty_count: u32,
    writes: u32,
    budget_warned: bool,
    last_persist: Instant,
}

/// Shared mutable job state plus its persistence throttle
struct JobTracker {
    kv: KvStore,
    store_permits: Arc<Semaphore>,
    state: Mutex<JobState>,
    meta: Mutex<PersistMeta>,
}

impl JobTracker {
    fn new(kv: KvStore, store_permits: Arc<Semaphore>, state: JobState) -> Self {
        Self {
            kv,
            store_permits,
            state: Mutex::new(state),
            meta: Mutex::new(PersistMeta {
                dirty: true,
                dirty_count: 1,
                writes: 0,
                budget_warned: false,
                last_persist: Instant::now(),
            }),
        }
    }

    /// Mutate the job state and mark it dirty
    async fn mutate<F: FnOnce(&mut JobState)>(&self, f: F) {
        {
            let mut state = self.state.lock().await;
            f(&mut state);
        }
        let mut meta = self.meta.lock().await;
        meta.dirty = true;
        meta.dirty_count += 1;
    }

    /// Read something out of the job state
    async fn with_state<T, F: FnOnce(&JobState) -> T>(&self, f: F) -> T {
        let state = self.state.lock().await;
        f(&state)
    }

    /// Persist if dirty, subject to throttling unless forced
    async fn persist(&self, force: bool) {
        {
            let mut meta = self.meta.lock().await;
            if !meta.dirty {
                return;
            }
            if !force {
                if meta.writes >= MAX_JOBSTATE_WRITES {
                    if !meta.budget_warned {
                        warn!(writes = meta.writes, "Job state write budget exhausted");
                        meta.budget_warned = true;
                    }
                    // Silently drop intermediate writes until the next
                    // forced persist
                    meta.dirty = false;
                    return;
                }
                if meta.dirty_count < WRITE_BATCH_THRESHOLD
                    && meta.last_persist.elapsed() < WRITE_INTERVAL
                {
                    return;
                }
            }
        }

        // Closed only on shutdown
        let Ok(_permit) = self.store_permits.acquire().await else {
            return;
        };

        let snapshot = {
            let mut state = self.state.lock().await;
            state.updated_at = time::now();
            state.clone()
        };

        match save_job(&self.kv, &snapshot).await {
            Ok(()) => {
                let mut meta = self.meta.lock().await;
                meta.writes += 1;
                meta.dirty = false;
                meta.dirty_count = 0;
                meta.last_persist = Instant::now();
            }
            Err(e) => warn!(job_id = %snapshot.id, error = %e, "Job state persist failed"),
        }
    }

    async fn writes(&self) -> u32 {
        self.meta.lock().await.writes
    }
}

/// Seed for one chunk's trip through a correction wave
struct WaveSeed {
    index: usize,
    audio_hash: String,
    text: String,
}

/// Run the orchestrator for one job, emitting events into `tx`
///
/// A send on a closed channel means the subscriber went away; event delivery
/// stops but in-flight correction work is not cancelled.
pub async fn run_job_stream(state: AppState, job_id: String, tx: mpsc::Sender<JobStreamEvent>) {
    if let Err(e) = run_inner(&state, &job_id, &tx).await {
        error!(job_id = %job_id, error = %e, "Job stream failed");
        let _ = tx
            .send(JobStreamEvent::Error {
                message: e.to_string(),
            })
            .await;
    }
}

async fn run_inner(
    state: &AppState,
    job_id: &str,
    tx: &mpsc::Sender<JobStreamEvent>,
) -> anyhow::Result<()> {
    let pipeline = state.pipeline.clone();

    let mut job = load_job(&state.kv, job_id)
        .await?
        .unwrap_or_else(|| JobState::new(job_id.to_string()));
    job.id = job_id.to_string();
    job.status = JobStatus::Transcribing;
    let total = job.chunks.len();

    let tracker = Arc::new(JobTracker::new(
        state.kv.clone(),
        pipeline.store_permits.clone(),
        job,
    ));
    tracker.persist(true).await;

    let _ = tx
        .send(JobStreamEvent::Status {
            job_id: job_id.to_string(),
            status: "transcribing".to_string(),
            total_chunks: total,
        })
        .await;

    // Raw tier: everything already transcribed goes out immediately
    let raw_texts = tracker
        .with_state(|job| {
            job.chunks
                .iter()
                .map(|c| (c.index, c.transcription.raw.clone()))
                .collect::<Vec<_>>()
        })
        .await;

    let mut raw_done = 0;
    for (index, raw) in raw_texts {
        if !raw.is_empty() {
            let _ = tx
                .send(JobStreamEvent::Raw {
                    chunk_index: index,
                    text: raw,
                    provider: "asr".to_string(),
                    confidence: 0.7,
                })
                .await;
        }
        raw_done += 1;
        let _ = tx
            .send(JobStreamEvent::Progress {
                stage: "raw".to_string(),
                completed: raw_done,
                total,
            })
            .await;
    }

    // Quick tier, seeded from raw
    let quick_seeds = tracker
        .with_state(|job| {
            job.chunks
                .iter()
                .filter(|c| !c.transcription.raw.is_empty() && !c.audio_hash.is_empty())
                .map(|c| WaveSeed {
                    index: c.index,
                    audio_hash: c.audio_hash.clone(),
                    text: c.transcription.raw.clone(),
                })
                .collect::<Vec<_>>()
        })
        .await;

    run_wave(
        CorrectionMode::Quick,
        quick_seeds,
        &pipeline,
        &tracker,
        tx,
        total,
    )
    .await;
    tracker.persist(true).await;

    // Enhanced tier, seeded from quick where it landed
    let enhanced_seeds = tracker
        .with_state(|job| {
            job.chunks
                .iter()
                .filter(|c| !c.audio_hash.is_empty())
                .filter_map(|c| {
                    let seed = c
                        .transcription
                        .quick
                        .clone()
                        .unwrap_or_else(|| c.transcription.raw.clone());
                    if seed.is_empty() {
                        None
                    } else {
                        Some(WaveSeed {
                            index: c.index,
                            audio_hash: c.audio_hash.clone(),
                            text: seed,
                        })
                    }
                })
                .collect::<Vec<_>>()
        })
        .await;

    run_wave(
        CorrectionMode::Enhanced,
        enhanced_seeds,
        &pipeline,
        &tracker,
        tx,
        total,
    )
    .await;

    tracker.mutate(|job| job.status = JobStatus::Done).await;
    tracker.persist(true).await;

    let _ = tx
        .send(JobStreamEvent::Done {
            job_id: job_id.to_string(),
        })
        .await;

    let writes = tracker.writes().await;
    info!(job_id, writes, "Job stream completed");
    Ok(())
}

/// Run one correction wave in small in-flight groups, settling each group
/// and ignoring individual failures.
async fn run_wave(
    mode: CorrectionMode,
    seeds: Vec<WaveSeed>,
    pipeline: &Arc<Pipeline>,
    tracker: &Arc<JobTracker>,
    tx: &mpsc::Sender<JobStreamEvent>,
    total: usize,
) {
    let done = Arc::new(AtomicUsize::new(0));
    let mut in_flight = Vec::new();

    for seed in seeds {
        let pipeline = pipeline.clone();
        let tracker = tracker.clone();
        let tx = tx.clone();
        let done = done.clone();

        in_flight.push(async move {
            let segment = CorrectionSegment {
                audio_hash: seed.audio_hash,
                text: seed.text,
                mode,
                glossary: None,
            };

            match correction::correct_segment(&pipeline, &segment).await {
                Ok(outcome) => {
                    merge_outcome(&tracker, mode, seed.index, &outcome).await;
                    tracker.persist(false).await;

                    let event = match mode {
                        CorrectionMode::Quick => JobStreamEvent::Quick {
                            chunk_index: seed.index,
                            text: outcome.text,
                            provider: outcome.provider,
                            confidence: outcome.confidence,
                        },
                        CorrectionMode::Enhanced => JobStreamEvent::Enhanced {
                            chunk_index: seed.index,
                            text: outcome.text,
                            provider: outcome.provider,
                            confidence: outcome.confidence,
                        },
                    };
                    let _ = tx.send(event).await;

                    let completed = done.fetch_add(1, Ordering::SeqCst) + 1;
                    let _ = tx
                        .send(JobStreamEvent::Progress {
                            stage: mode.as_str().to_string(),
                            completed,
                            total,
                        })
                        .await;
                }
                Err(e) => {
                    // Chunk failures are isolated; the prior tier stands
                    warn!(chunk_index = seed.index, mode = %mode, error = %e, "Chunk correction failed");
                }
            }
        });

        if in_flight.len() >= WAVE_CONCURRENCY {
            futures::future::join_all(in_flight.drain(..)).await;
        }
    }

    if !in_flight.is_empty() {
        futures::future::join_all(in_flight).await;
    }
}

async fn merge_outcome(
    tracker: &Arc<JobTracker>,
    mode: CorrectionMode,
    index: usize,
    outcome: &CorrectionOutcome,
) {
    tracker
        .mutate(|job| {
            let Some(chunk) = job.chunks.get_mut(index) else {
                return;
            };
            if outcome.faithfulness.accepted {
                match mode {
                    CorrectionMode::Quick => {
                        chunk.apply_quick(outcome.text.clone(), outcome.confidence)
                    }
                    CorrectionMode::Enhanced => {
                        chunk.apply_enhanced(outcome.text.clone(), outcome.confidence)
                    }
                }
            } else {
                chunk.apply_rejection(outcome.confidence);
            }
        })
        .await;
}
