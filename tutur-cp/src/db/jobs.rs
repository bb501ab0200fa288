//! Job state persistence
//!
//! One JSON document per job in the `JOB_STATE` namespace. Jobs are never
//! explicitly deleted; the 7-day TTL lets them expire.

use crate::models::JobState;
use std::time::Duration;
use tutur_common::kv::NS_JOB_STATE;
use tutur_common::{KvStore, Result};

/// Job documents expire after a week
pub const JOB_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

pub async fn load_job(kv: &KvStore, job_id: &str) -> Result<Option<JobState>> {
    kv.get_json(NS_JOB_STATE, job_id).await
}

pub async fn save_job(kv: &KvStore, job: &JobState) -> Result<()> {
    kv.put_json(NS_JOB_STATE, &job.id, job, Some(JOB_TTL)).await
}
