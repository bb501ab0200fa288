//! Pipeline configuration
//!
//! Provider credentials come from the environment (never persisted); batch
//! timing and admission limits have compiled defaults with env overrides so
//! deployments can tune coalescing without a rebuild.

/// Provider credentials and kill switches
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    pub groq_api_key: Option<String>,
    pub hf_api_token: Option<String>,
    pub disable_groq: bool,
    pub disable_hf: bool,
}

impl ProviderConfig {
    pub fn from_env() -> Self {
        Self {
            groq_api_key: non_empty_env("GROQ_API_KEY"),
            hf_api_token: non_empty_env("HF_API_TOKEN"),
            disable_groq: flag_env("TUTUR_DISABLE_GROQ"),
            disable_hf: flag_env("TUTUR_DISABLE_HF"),
        }
    }
}

/// Aggregation queue timing and admission limits
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Entries per router call; reaching this flushes immediately
    pub max_batch: usize,
    /// Flush delay for quick-mode queues (ms)
    pub quick_flush_ms: u64,
    /// Flush delay for all other queues (ms)
    pub default_flush_ms: u64,
    /// Admission ceiling per batch queue
    pub max_pending_per_queue: usize,
    /// Admission ceiling across all queues
    pub max_total_pending: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch: 5,
            quick_flush_ms: 250,
            default_flush_ms: 700,
            max_pending_per_queue: 20,
            max_total_pending: 100,
        }
    }
}

impl BatchConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            quick_flush_ms: parse_env("TUTUR_BATCH_FLUSH_QUICK_MS", defaults.quick_flush_ms),
            default_flush_ms: parse_env("TUTUR_BATCH_FLUSH_MS", defaults.default_flush_ms),
            ..defaults
        }
    }
}

/// Everything the pipeline needs at construction time
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub providers: ProviderConfig,
    pub batch: BatchConfig,
    /// Concurrent outbound provider calls
    pub provider_concurrency: usize,
    /// Concurrent persistent-store writes
    pub store_write_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            providers: ProviderConfig::default(),
            batch: BatchConfig::default(),
            provider_concurrency: 5,
            store_write_concurrency: 4,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        Self {
            providers: ProviderConfig::from_env(),
            batch: BatchConfig::from_env(),
            ..Self::default()
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn flag_env(name: &str) -> bool {
    matches!(
        std::env::var(name).ok().as_deref(),
        Some("1") | Some("true") | Some("TRUE")
    )
}

fn parse_env(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults() {
        let config = BatchConfig::default();
        assert_eq!(config.max_batch, 5);
        assert_eq!(config.quick_flush_ms, 250);
        assert_eq!(config.default_flush_ms, 700);
        assert_eq!(config.max_pending_per_queue, 20);
        assert_eq!(config.max_total_pending, 100);
    }

    #[test]
    #[serial]
    fn test_flush_override_from_env() {
        std::env::set_var("TUTUR_BATCH_FLUSH_MS", "900");
        let config = BatchConfig::from_env();
        assert_eq!(config.default_flush_ms, 900);
        assert_eq!(config.quick_flush_ms, 250);
        std::env::remove_var("TUTUR_BATCH_FLUSH_MS");
    }

    #[test]
    #[serial]
    fn test_disable_flags() {
        std::env::set_var("TUTUR_DISABLE_GROQ", "1");
        let config = ProviderConfig::from_env();
        assert!(config.disable_groq);
        std::env::remove_var("TUTUR_DISABLE_GROQ");
    }
}
