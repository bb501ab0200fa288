//! SQLite-backed key-value store with TTL semantics
//!
//! The pipeline persists quota counters, cached corrections and job state as
//! JSON documents in namespaced key-value entries. Entries carry an optional
//! expiry; reads treat expired entries as absent and a periodic purge deletes
//! them for good.

use crate::{time, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Namespace for per-provider quota and metrics counters
pub const NS_QUOTA_COUNTERS: &str = "QUOTA_COUNTERS";
/// Namespace for crowd-sourced corrections (trusted, mode-agnostic)
pub const NS_COMMUNITY_CACHE: &str = "COMMUNITY_CACHE";
/// Namespace for per-signature router responses
pub const NS_RESPONSE_CACHE: &str = "RESPONSE_CACHE";
/// Namespace for durable job state documents
pub const NS_JOB_STATE: &str = "JOB_STATE";

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL allows concurrent readers with one writer; the pipeline reads
    // counters while the orchestrator persists job state.
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    create_kv_entries_table(&pool).await?;

    Ok(pool)
}

async fn create_kv_entries_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS kv_entries (
            namespace TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            expires_at TEXT,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (namespace, key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_kv_entries_expires_at ON kv_entries (expires_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Namespaced key-value store over the shared SQLite pool
#[derive(Clone)]
pub struct KvStore {
    pool: SqlitePool,
}

impl KvStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get a value, treating expired entries as absent
    pub async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        let row = sqlx::query(
            r#"
            SELECT value, expires_at
            FROM kv_entries
            WHERE namespace = ? AND key = ?
            "#,
        )
        .bind(namespace)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let expires_at: Option<String> = row.get("expires_at");
        if let Some(expires_at) = expires_at {
            if let Ok(expires_at) = DateTime::parse_from_rfc3339(&expires_at) {
                if expires_at.with_timezone(&Utc) <= time::now() {
                    return Ok(None);
                }
            }
        }

        Ok(Some(row.get("value")))
    }

    /// Get a value and deserialize it as JSON
    ///
    /// Undecodable documents are treated as absent rather than fatal: a
    /// corrupt cache entry must never fail a correction request.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        namespace: &str,
        key: &str,
    ) -> Result<Option<T>> {
        match self.get(namespace, key).await? {
            Some(raw) => Ok(serde_json::from_str(&raw).ok()),
            None => Ok(None),
        }
    }

    /// Put a value with an optional TTL, overwriting any previous entry
    pub async fn put(
        &self,
        namespace: &str,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let now = time::now();
        let expires_at = ttl.map(|ttl| {
            (now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero()))
                .to_rfc3339()
        });

        sqlx::query(
            r#"
            INSERT INTO kv_entries (namespace, key, value, expires_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(namespace, key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(namespace)
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Serialize a document as JSON and store it with an optional TTL
    pub async fn put_json<T: Serialize>(
        &self,
        namespace: &str,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let raw = serde_json::to_string(value)
            .map_err(|e| crate::Error::Internal(format!("Failed to serialize document: {}", e)))?;
        self.put(namespace, key, &raw, ttl).await
    }

    pub async fn delete(&self, namespace: &str, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv_entries WHERE namespace = ? AND key = ?")
            .bind(namespace)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete all expired entries, returning the number removed
    pub async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM kv_entries WHERE expires_at IS NOT NULL AND expires_at <= ?")
            .bind(time::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
