//! Job event stream endpoint
//!
//! `GET /api/transcribe/{id}/stream` spawns the orchestrator for the job
//! and forwards its events as SSE. A heartbeat timer re-arms on every
//! forwarded event; if the stream goes quiet for a full window the server
//! sends a synthetic `heartbeat` so intermediaries keep the connection open.
//! Closing the connection stops delivery but not the in-flight work.

use crate::events::JobStreamEvent;
use crate::services::orchestrator;
use crate::AppState;
use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Quiet window before a synthetic heartbeat
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Orchestrator event buffer; the stream consumes promptly
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// GET /api/transcribe/{id}/stream
pub async fn job_event_stream(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(job_id = %job_id, "New SSE subscriber for job stream");

    let (tx, mut rx) = mpsc::channel::<JobStreamEvent>(EVENT_CHANNEL_CAPACITY);
    tokio::spawn(orchestrator::run_job_stream(
        state.clone(),
        job_id.clone(),
        tx,
    ));

    let stream = async_stream::stream! {
        let mut deadline = tokio::time::Instant::now() + HEARTBEAT_INTERVAL;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    let heartbeat = JobStreamEvent::Heartbeat {
                        job_id: job_id.clone(),
                        ts: tutur_common::time::now().to_rfc3339(),
                    };
                    if let Ok(event) = heartbeat.to_sse() {
                        yield Ok(event);
                    }
                    deadline = tokio::time::Instant::now() + HEARTBEAT_INTERVAL;
                }

                received = rx.recv() => {
                    match received {
                        Some(job_event) => {
                            deadline = tokio::time::Instant::now() + HEARTBEAT_INTERVAL;
                            match job_event.to_sse() {
                                Ok(event) => yield Ok(event),
                                Err(e) => warn!(error = %e, "Failed to serialize stream event"),
                            }
                        }
                        // Orchestrator finished; close the stream
                        None => break,
                    }
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    )
}

/// Build job stream routes
pub fn stream_routes() -> Router<AppState> {
    Router::new().route("/api/transcribe/:id/stream", get(job_event_stream))
}
