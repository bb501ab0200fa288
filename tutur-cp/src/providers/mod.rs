//! Correction provider clients
//!
//! Each provider wraps one external HTTP API behind a common trait so the
//! router can walk its priority list without caring about payload shapes.
//! Response decoding is typed per provider; a shape the decoder does not
//! recognize is a provider failure, not a silent empty result.

pub mod groq;
pub mod huggingface;

use crate::config::ProviderConfig;
use crate::models::CorrectionMode;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub use groq::GroqClient;
pub use huggingface::HuggingFaceClient;

/// Known provider names, in router priority order
pub const PROVIDER_NAMES: [&str; 2] = ["groq", "huggingface"];

/// Provider call errors
///
/// Caught by the router per provider; they trigger fallback and are never
/// surfaced to the caller directly.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("credentials not configured for {0}")]
    MissingCredentials(&'static str),

    #[error("network error: {0}")]
    Network(String),

    #[error("{provider} returned status {status}")]
    Status { provider: &'static str, status: u16 },

    #[error("unexpected response shape from {0}")]
    ShapeMismatch(&'static str),
}

/// One external correction service
#[async_trait]
pub trait CorrectionProvider: Send + Sync {
    /// Stable provider name used in quota counters and responses
    fn name(&self) -> &'static str;

    /// Whether this provider can be attempted at all (credentials present,
    /// not disabled by configuration)
    fn available(&self) -> bool;

    /// Correct a batch of normalized texts, one output line per input
    async fn correct_batch(
        &self,
        texts: &[String],
        mode: CorrectionMode,
        glossary: Option<&[String]>,
    ) -> Result<Vec<String>, ProviderError>;
}

/// Build the fixed provider priority list
pub fn build_providers(config: &ProviderConfig) -> Vec<Arc<dyn CorrectionProvider>> {
    vec![
        Arc::new(GroqClient::new(config)),
        Arc::new(HuggingFaceClient::new(config)),
    ]
}

/// Split a model reply into one line per batch item, stripping `1)` style
/// numbering. Falls back to the whole reply as a single line.
pub(crate) fn split_numbered_lines(content: &str) -> Vec<String> {
    let lines: Vec<String> = content
        .lines()
        .map(strip_line_number)
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| l.to_string())
        .collect();

    if lines.is_empty() {
        vec![content.trim().to_string()]
    } else {
        lines
    }
}

fn strip_line_number(line: &str) -> &str {
    let trimmed = line.trim_start();
    let digits = trimmed.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        if let Some(rest) = trimmed[digits..].strip_prefix(')') {
            return rest.trim_start();
        }
    }
    trimmed
}
