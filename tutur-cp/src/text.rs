//! Text normalization ahead of provider calls
//!
//! Providers are paid by the token; every batch is whitespace-collapsed,
//! punctuation-normalized and truncated to a per-mode character budget before
//! it leaves the process.

use crate::models::CorrectionMode;

/// Per-mode character budgets for outbound provider text
fn char_budget(mode: CorrectionMode) -> usize {
    match mode {
        CorrectionMode::Quick => 600,
        CorrectionMode::Enhanced => 1200,
    }
}

fn is_clause_punctuation(ch: char) -> bool {
    matches!(ch, ',' | '.' | ';' | ':' | '!' | '?')
}

/// Normalize a single text for a provider call
pub fn optimize_text(input: &str, mode: CorrectionMode) -> String {
    // Collapse all whitespace runs (tabs, newlines, repeats) to single spaces
    let mut out = String::with_capacity(input.len());
    let mut pending_space = false;
    for ch in input.trim().chars() {
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if is_clause_punctuation(ch) {
            // No space before punctuation
            pending_space = false;
            out.push(ch);
            continue;
        }
        if pending_space || out.chars().last().map(is_clause_punctuation).unwrap_or(false) {
            // Single space between words and after punctuation
            if !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
        }
        out.push(ch);
    }

    // Hard-truncate to the mode budget, marking the cut
    let max = char_budget(mode);
    if out.chars().count() > max {
        let mut truncated: String = out.chars().take(max.saturating_sub(1)).collect();
        truncated.truncate(truncated.trim_end().len());
        truncated.push('…');
        return truncated;
    }

    out
}

/// Normalize every text in a batch
pub fn optimize_batch(texts: &[String], mode: CorrectionMode) -> Vec<String> {
    texts.iter().map(|t| optimize_text(t, mode)).collect()
}
