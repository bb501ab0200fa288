//! Anti-hallucination acceptance guard
//!
//! Scores a corrected text against its source: the fraction of corrected
//! tokens traceable to the original, plus detection of contiguous runs of
//! novel tokens long enough to suggest a fabricated clause. Pure function,
//! computed fresh per correction attempt, never persisted.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Tuning knobs for the guard
#[derive(Debug, Clone, Copy)]
pub struct FaithfulnessOptions {
    /// Minimum fraction of corrected tokens that must appear in the original
    pub min_shared_ratio: f64,
    /// Novel runs of at least this many tokens are reported as phrases
    pub max_novel_sequence: usize,
}

impl Default for FaithfulnessOptions {
    fn default() -> Self {
        Self {
            min_shared_ratio: 0.9,
            max_novel_sequence: 5,
        }
    }
}

/// Guard verdict for one correction attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaithfulnessReport {
    pub score: f64,
    pub accepted: bool,
    #[serde(rename = "novelPhrases")]
    pub novel_phrases: Vec<String>,
}

/// Lowercase, strip everything that is not a letter or digit, split on
/// whitespace, drop empties.
fn tokenize(input: &str) -> Vec<String> {
    input
        .to_lowercase()
        .chars()
        .map(|ch| if ch.is_alphanumeric() { ch } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .map(|s| s.to_string())
        .collect()
}

/// Walk the corrected tokens in order, accumulating contiguous runs absent
/// from the original set; runs of `max_novel_sequence` or more are phrases.
fn collect_novel_phrases(
    words: &[String],
    original_set: &HashSet<&str>,
    max_novel_sequence: usize,
) -> Vec<String> {
    let mut phrases = Vec::new();
    let mut buffer: Vec<&str> = Vec::new();

    for word in words {
        if original_set.contains(word.as_str()) {
            if buffer.len() >= max_novel_sequence {
                phrases.push(buffer.join(" "));
            }
            buffer.clear();
            continue;
        }
        buffer.push(word);
    }
    if buffer.len() >= max_novel_sequence {
        phrases.push(buffer.join(" "));
    }

    phrases
}

/// Evaluate a correction against its source text
pub fn evaluate(original: &str, corrected: &str, options: FaithfulnessOptions) -> FaithfulnessReport {
    let original_words = tokenize(original);
    let corrected_words = tokenize(corrected);

    if corrected_words.is_empty() {
        // Nothing to validate
        return FaithfulnessReport {
            score: 1.0,
            accepted: true,
            novel_phrases: Vec::new(),
        };
    }

    if original_words.is_empty() {
        // Nothing to verify against: the entire correction is novel
        return FaithfulnessReport {
            score: 0.0,
            accepted: false,
            novel_phrases: vec![corrected_words.join(" ")],
        };
    }

    let original_set: HashSet<&str> = original_words.iter().map(|s| s.as_str()).collect();
    let overlap = corrected_words
        .iter()
        .filter(|w| original_set.contains(w.as_str()))
        .count();

    let score = overlap as f64 / corrected_words.len() as f64;
    let novel_phrases =
        collect_novel_phrases(&corrected_words, &original_set, options.max_novel_sequence);
    let accepted = score >= options.min_shared_ratio && novel_phrases.is_empty();

    FaithfulnessReport {
        score: (score * 10_000.0).round() / 10_000.0,
        accepted,
        novel_phrases,
    }
}
