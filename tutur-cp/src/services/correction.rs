//! Shared correction path
//!
//! Every correction, whether from the batch API or the job stream
//! orchestrator, takes the same route: cache first, then the aggregation
//! queue, then the faithfulness guard on whatever came back. Only accepted
//! router output is cached; a rejected candidate is discarded and the
//! original text is returned with a deliberately depressed confidence.

use crate::faithfulness::{self, FaithfulnessOptions, FaithfulnessReport};
use crate::models::CorrectionSegment;
use crate::pipeline::Pipeline;
use crate::services::batching::QueueError;
use crate::services::cache;
use tracing::warn;

/// Confidence ceiling attached to rejected corrections
const REJECTED_CONFIDENCE: f64 = 0.4;

/// Result of one segment's trip through the pipeline
#[derive(Debug, Clone)]
pub struct CorrectionOutcome {
    /// The text to use: the accepted candidate, or the original on rejection
    pub text: String,
    pub provider: String,
    pub confidence: f64,
    pub cached: bool,
    pub faithfulness: FaithfulnessReport,
}

/// Correct one segment: cache → queue → guard
pub async fn correct_segment(
    pipeline: &Pipeline,
    segment: &CorrectionSegment,
) -> Result<CorrectionOutcome, QueueError> {
    let glossary = segment.glossary.as_deref();

    let (candidate, provider, cached) = match pipeline
        .cache
        .get_cached_text(&segment.audio_hash, segment.mode, glossary)
        .await
    {
        Some(hit) => (hit.text, hit.provider, true),
        None => {
            let corrected = pipeline
                .queue
                .enqueue(
                    segment.mode,
                    segment.text.clone(),
                    segment.audio_hash.clone(),
                    glossary,
                )
                .await?;
            (corrected, "router".to_string(), false)
        }
    };

    let report = faithfulness::evaluate(
        &segment.text,
        &candidate,
        FaithfulnessOptions {
            min_shared_ratio: segment.mode.min_shared_ratio(),
            ..Default::default()
        },
    );

    let base_confidence = segment.mode.base_confidence();

    if report.accepted {
        if !cached {
            if let Err(e) = pipeline
                .cache
                .set_response_cache(
                    &segment.audio_hash,
                    segment.mode,
                    &candidate,
                    glossary,
                    cache::DEFAULT_TTL,
                )
                .await
            {
                warn!(audio_hash = %segment.audio_hash, error = %e, "Response cache write failed");
            }
        }
        Ok(CorrectionOutcome {
            text: candidate,
            provider,
            confidence: base_confidence,
            cached,
            faithfulness: report,
        })
    } else {
        // Guard rejection: discard the candidate, keep the source text,
        // signal reduced trust downstream
        Ok(CorrectionOutcome {
            text: segment.text.clone(),
            provider,
            confidence: base_confidence.min(REJECTED_CONFIDENCE),
            cached: false,
            faithfulness: report,
        })
    }
}
