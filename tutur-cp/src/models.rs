//! Domain types for the correction pipeline
//!
//! Correction segments flow through the batcher and router; job state is the
//! durable per-job document the stream orchestrator mutates as corrections
//! resolve.

use serde::{Deserialize, Serialize};

/// Correction quality tier
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CorrectionMode {
    Quick,
    Enhanced,
}

impl CorrectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorrectionMode::Quick => "quick",
            CorrectionMode::Enhanced => "enhanced",
        }
    }

    /// Base confidence attached to an accepted correction of this tier
    pub fn base_confidence(&self) -> f64 {
        match self {
            CorrectionMode::Quick => 0.8,
            CorrectionMode::Enhanced => 0.85,
        }
    }

    /// Minimum shared-token ratio the faithfulness guard demands for this
    /// tier. The larger model gets a stricter threshold: more latitude means
    /// more hallucination risk.
    pub fn min_shared_ratio(&self) -> f64 {
        match self {
            CorrectionMode::Quick => 0.88,
            CorrectionMode::Enhanced => 0.92,
        }
    }
}

impl std::fmt::Display for CorrectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One text to correct, identified by its audio chunk hash
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionSegment {
    #[serde(rename = "audioHash")]
    pub audio_hash: String,
    pub text: String,
    pub mode: CorrectionMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub glossary: Option<Vec<String>>,
}

/// Job lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Uploading,
    Transcribing,
    Done,
}

/// Per-chunk transcription tiers
///
/// `final_text` always mirrors the best accepted tier available: enhanced
/// permanently wins, quick only overrides raw, a rejected correction never
/// overwrites a tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkTranscription {
    pub raw: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quick: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enhanced: Option<String>,
    #[serde(rename = "final")]
    pub final_text: String,
    pub confidence: f64,
}

impl ChunkTranscription {
    pub fn from_raw(raw: String) -> Self {
        Self {
            final_text: raw.clone(),
            raw,
            quick: None,
            enhanced: None,
            confidence: 0.7,
        }
    }
}

/// A fixed-duration slice of the source audio and its evolving transcription
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    #[serde(rename = "audioHash")]
    pub audio_hash: String,
    #[serde(rename = "startTime", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<f64>,
    #[serde(rename = "endTime", skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,
    pub transcription: ChunkTranscription,
}

impl Chunk {
    fn placeholder(index: usize) -> Self {
        Self {
            index,
            audio_hash: String::new(),
            start_time: None,
            end_time: None,
            transcription: ChunkTranscription::from_raw(String::new()),
        }
    }

    /// Merge an accepted quick correction into the chunk
    ///
    /// Quick only provides `final` while no enhanced text has landed yet.
    pub fn apply_quick(&mut self, text: String, confidence: f64) {
        if self.transcription.enhanced.is_none() {
            self.transcription.final_text = text.clone();
        }
        self.transcription.quick = Some(text);
        self.transcription.confidence = confidence;
    }

    /// Merge an accepted enhanced correction into the chunk
    pub fn apply_enhanced(&mut self, text: String, confidence: f64) {
        self.transcription.final_text = text.clone();
        self.transcription.enhanced = Some(text);
        self.transcription.confidence = confidence;
    }

    /// Record a rejected correction: tiers stay intact, confidence is
    /// depressed to signal reduced trust downstream.
    pub fn apply_rejection(&mut self, confidence: f64) {
        self.transcription.confidence = self.transcription.confidence.min(confidence);
    }
}

/// Durable per-job state document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobState {
    pub id: String,
    pub status: JobStatus,
    pub chunks: Vec<Chunk>,
    #[serde(rename = "createdAt")]
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl JobState {
    pub fn new(id: String) -> Self {
        let now = tutur_common::time::now();
        Self {
            id,
            status: JobStatus::Uploading,
            chunks: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Insert or replace a chunk at its index, growing the list as needed
    pub fn upsert_chunk(&mut self, chunk: Chunk) {
        let index = chunk.index;
        while self.chunks.len() <= index {
            let placeholder_index = self.chunks.len();
            self.chunks.push(Chunk::placeholder(placeholder_index));
        }
        self.chunks[index] = chunk;
        self.updated_at = tutur_common::time::now();
    }
}
