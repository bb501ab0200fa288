//! Two-tier correction result cache
//!
//! Community tier: crowd-sourced corrections keyed by audio hash alone,
//! checked first and trusted regardless of mode or glossary. Response tier:
//! router output keyed by a signature over (hash, mode, normalized glossary),
//! written only for faithfulness-accepted corrections.

use crate::models::CorrectionMode;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::warn;
use tutur_common::kv::{NS_COMMUNITY_CACHE, NS_RESPONSE_CACHE};
use tutur_common::{time, KvStore, Result};

/// Default lifetime for both tiers
pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// A cache hit with the tier it came from
#[derive(Debug, Clone, PartialEq)]
pub struct CachedText {
    pub text: String,
    pub provider: String,
}

/// A crowd-sourced correction document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityEntry {
    pub text: String,
    #[serde(default)]
    pub corrections: String,
    #[serde(default)]
    pub contributor: String,
    #[serde(default)]
    pub upvotes: u64,
    pub provider: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

/// Normalize a glossary: trim, drop empties, dedupe, sort. Equivalent
/// glossaries collapse onto one signature regardless of input order.
pub fn normalize_glossary(glossary: Option<&[String]>) -> Vec<String> {
    let mut terms: Vec<String> = glossary
        .unwrap_or_default()
        .iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    terms.sort();
    terms.dedup();
    terms
}

/// Response-tier signature: sha256 over `audioHash|mode|sortedGlossary`
pub fn build_signature(
    audio_hash: &str,
    mode: CorrectionMode,
    glossary: Option<&[String]>,
) -> String {
    let glossary = normalize_glossary(glossary).join("|");
    let base = format!("{}|{}|{}", audio_hash, mode, glossary);

    let mut hasher = Sha256::new();
    hasher.update(base.as_bytes());
    let digest = hasher.finalize();

    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Two-tier cache over the shared KV store
#[derive(Clone)]
pub struct ResultCache {
    kv: KvStore,
}

impl ResultCache {
    pub fn new(kv: KvStore) -> Self {
        Self { kv }
    }

    /// Look up a correction: community tier first, then the per-signature
    /// response tier. Read failures degrade to a miss.
    pub async fn get_cached_text(
        &self,
        audio_hash: &str,
        mode: CorrectionMode,
        glossary: Option<&[String]>,
    ) -> Option<CachedText> {
        match self
            .kv
            .get_json::<CommunityEntry>(NS_COMMUNITY_CACHE, audio_hash)
            .await
        {
            Ok(Some(entry)) => {
                return Some(CachedText {
                    text: entry.text,
                    provider: "community".to_string(),
                });
            }
            Ok(None) => {}
            Err(e) => warn!(audio_hash, error = %e, "Community cache read failed"),
        }

        let signature = build_signature(audio_hash, mode, glossary);
        match self.kv.get(NS_RESPONSE_CACHE, &signature).await {
            Ok(Some(text)) => Some(CachedText {
                text,
                provider: "cache".to_string(),
            }),
            Ok(None) => None,
            Err(e) => {
                warn!(audio_hash, error = %e, "Response cache read failed");
                None
            }
        }
    }

    /// Store router-sourced, faithfulness-accepted output in the response tier
    pub async fn set_response_cache(
        &self,
        audio_hash: &str,
        mode: CorrectionMode,
        text: &str,
        glossary: Option<&[String]>,
        ttl: Duration,
    ) -> Result<()> {
        let signature = build_signature(audio_hash, mode, glossary);
        self.kv
            .put(NS_RESPONSE_CACHE, &signature, text, Some(ttl))
            .await
    }

    /// Store a community submission, replacing any previous document
    pub async fn put_community(
        &self,
        audio_hash: &str,
        text: &str,
        corrections: &str,
        contributor: &str,
    ) -> Result<()> {
        let entry = CommunityEntry {
            text: text.to_string(),
            corrections: corrections.to_string(),
            contributor: contributor.to_string(),
            upvotes: 0,
            provider: "community".to_string(),
            created_at: time::now().to_rfc3339(),
        };
        self.kv
            .put_json(NS_COMMUNITY_CACHE, audio_hash, &entry, Some(DEFAULT_TTL))
            .await
    }

    /// Increment a community entry's upvote counter, returning the new count
    pub async fn upvote_community(&self, audio_hash: &str) -> Result<u64> {
        let mut entry = self
            .kv
            .get_json::<CommunityEntry>(NS_COMMUNITY_CACHE, audio_hash)
            .await?
            .ok_or_else(|| {
                tutur_common::Error::NotFound(format!("No community entry for {}", audio_hash))
            })?;

        entry.upvotes += 1;
        self.kv
            .put_json(NS_COMMUNITY_CACHE, audio_hash, &entry, Some(DEFAULT_TTL))
            .await?;
        Ok(entry.upvotes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tutur_common::kv::init_database;

    async fn test_cache() -> (ResultCache, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let pool = init_database(&dir.path().join("cache_test.db"))
            .await
            .expect("init database");
        (ResultCache::new(KvStore::new(pool)), dir)
    }

    #[test]
    fn test_signature_invariant_to_glossary_order_and_whitespace() {
        let a = build_signature(
            "h",
            CorrectionMode::Quick,
            Some(&["B".to_string(), "a ".to_string()]),
        );
        let b = build_signature(
            "h",
            CorrectionMode::Quick,
            Some(&["a".to_string(), "B".to_string()]),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_signature_differs_by_mode() {
        let quick = build_signature("h", CorrectionMode::Quick, None);
        let enhanced = build_signature("h", CorrectionMode::Enhanced, None);
        assert_ne!(quick, enhanced);
    }

    #[test]
    fn test_empty_glossary_equals_none() {
        let none = build_signature("h", CorrectionMode::Quick, None);
        let empty = build_signature("h", CorrectionMode::Quick, Some(&[" ".to_string()]));
        assert_eq!(none, empty);
    }

    #[test]
    fn test_glossary_dedupes() {
        let once = build_signature("h", CorrectionMode::Quick, Some(&["a".to_string()]));
        let twice = build_signature(
            "h",
            CorrectionMode::Quick,
            Some(&["a".to_string(), "a".to_string()]),
        );
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn test_response_tier_roundtrip() {
        let (cache, _dir) = test_cache().await;

        assert!(cache
            .get_cached_text("hash1", CorrectionMode::Quick, None)
            .await
            .is_none());

        cache
            .set_response_cache("hash1", CorrectionMode::Quick, "halo dunia", None, DEFAULT_TTL)
            .await
            .unwrap();

        let hit = cache
            .get_cached_text("hash1", CorrectionMode::Quick, None)
            .await
            .unwrap();
        assert_eq!(hit.text, "halo dunia");
        assert_eq!(hit.provider, "cache");
    }

    #[tokio::test]
    async fn test_community_tier_wins_over_response_tier() {
        let (cache, _dir) = test_cache().await;

        cache
            .set_response_cache("hash1", CorrectionMode::Quick, "router text", None, DEFAULT_TTL)
            .await
            .unwrap();
        cache
            .put_community("hash1", "crowd text", "", "anon")
            .await
            .unwrap();

        let hit = cache
            .get_cached_text("hash1", CorrectionMode::Quick, None)
            .await
            .unwrap();
        assert_eq!(hit.text, "crowd text");
        assert_eq!(hit.provider, "community");
    }

    #[tokio::test]
    async fn test_community_hit_ignores_mode() {
        let (cache, _dir) = test_cache().await;
        cache
            .put_community("hash1", "crowd text", "", "anon")
            .await
            .unwrap();

        for mode in [CorrectionMode::Quick, CorrectionMode::Enhanced] {
            let hit = cache.get_cached_text("hash1", mode, None).await.unwrap();
            assert_eq!(hit.provider, "community");
        }
    }

    #[tokio::test]
    async fn test_upvote_increments() {
        let (cache, _dir) = test_cache().await;
        cache
            .put_community("hash1", "crowd text", "", "anon")
            .await
            .unwrap();

        assert_eq!(cache.upvote_community("hash1").await.unwrap(), 1);
        assert_eq!(cache.upvote_community("hash1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_upvote_missing_entry_is_not_found() {
        let (cache, _dir) = test_cache().await;
        assert!(cache.upvote_community("nope").await.is_err());
    }
}
