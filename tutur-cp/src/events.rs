//! Job stream event types
//!
//! The SSE protocol a subscriber sees for one job: `status`, then `raw` and
//! `progress` per chunk, then `quick`/`enhanced` waves, then `done`.
//! Corrections complete in batch arrival order, so clients index by
//! `chunkIndex` and never assume cross-chunk event order.

use axum::response::sse::Event;
use serde::Serialize;

/// One event on a job's SSE stream
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum JobStreamEvent {
    #[serde(rename_all = "camelCase")]
    Status {
        job_id: String,
        status: String,
        total_chunks: usize,
    },
    #[serde(rename_all = "camelCase")]
    Raw {
        chunk_index: usize,
        text: String,
        provider: String,
        confidence: f64,
    },
    Progress {
        stage: String,
        completed: usize,
        total: usize,
    },
    #[serde(rename_all = "camelCase")]
    Quick {
        chunk_index: usize,
        text: String,
        provider: String,
        confidence: f64,
    },
    #[serde(rename_all = "camelCase")]
    Enhanced {
        chunk_index: usize,
        text: String,
        provider: String,
        confidence: f64,
    },
    #[serde(rename_all = "camelCase")]
    Done { job_id: String },
    #[serde(rename_all = "camelCase")]
    Heartbeat { job_id: String, ts: String },
    Error { message: String },
}

impl JobStreamEvent {
    /// SSE event name for filtering on the client
    pub fn event_type(&self) -> &'static str {
        match self {
            JobStreamEvent::Status { .. } => "status",
            JobStreamEvent::Raw { .. } => "raw",
            JobStreamEvent::Progress { .. } => "progress",
            JobStreamEvent::Quick { .. } => "quick",
            JobStreamEvent::Enhanced { .. } => "enhanced",
            JobStreamEvent::Done { .. } => "done",
            JobStreamEvent::Heartbeat { .. } => "heartbeat",
            JobStreamEvent::Error { .. } => "sse-error",
        }
    }

    /// Convert to an axum SSE event
    pub fn to_sse(&self) -> Result<Event, axum::Error> {
        Event::default().event(self.event_type()).json_data(self)
    }
}
