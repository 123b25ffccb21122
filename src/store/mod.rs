//! Vector store abstraction.
//!
//! The [`VectorStore`] trait is the only contract the synchronization core
//! needs from a store: batched point lookups, an equality metadata filter,
//! upsert, and delete, all keyed by content-addressed ids.
//!
//! | Backend | Module | Notes |
//! |---------|--------|-------|
//! | `memory` | [`memory`] | Process-local; records every mutation for inspection |
//! | `sqlite` | [`sqlite`] | Durable local file via sqlx |
//! | `chroma` | [`chroma`] | ChromaDB server over its REST API |
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod chroma;
pub mod memory;
pub mod sqlite;

use std::future::Future;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::config::StoreConfig;
use crate::models::{MetadataValue, StoredRecord, UpsertRecord, SOURCE_KEY};

/// Equality filter over one flat metadata key.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataFilter {
    pub key: String,
    pub value: MetadataValue,
}

impl MetadataFilter {
    pub fn eq(key: &str, value: impl Into<MetadataValue>) -> Self {
        Self {
            key: key.to_string(),
            value: value.into(),
        }
    }

    /// Filter matching every record whose `source` is `source`.
    pub fn source(source: &str) -> Self {
        Self::eq(SOURCE_KEY, source)
    }
}

/// Abstract record store.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get_by_ids`](VectorStore::get_by_ids) | Point lookup; missing ids are simply absent |
/// | [`get_where`](VectorStore::get_where) | All records matching a metadata filter |
/// | [`upsert`](VectorStore::upsert) | Insert or overwrite records by id |
/// | [`delete`](VectorStore::delete) | Remove records by id |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Short backend name for logs (`"sqlite"`, `"chroma"`, ...).
    fn name(&self) -> &str;

    /// Verify the store is reachable. Called once before a run starts.
    async fn heartbeat(&self) -> Result<()>;

    /// Fetch the records for `ids` that exist.
    ///
    /// Embeddings are only populated when `include_embeddings` is set.
    async fn get_by_ids(&self, ids: &[String], include_embeddings: bool)
        -> Result<Vec<StoredRecord>>;

    /// Fetch every record matching `filter`, without embeddings.
    async fn get_where(&self, filter: &MetadataFilter) -> Result<Vec<StoredRecord>>;

    /// Insert records that are absent and overwrite those that are present.
    async fn upsert(&self, records: &[UpsertRecord]) -> Result<()>;

    /// Delete records by id. Unknown ids are ignored.
    async fn delete(&self, ids: &[String]) -> Result<()>;

    /// Total number of records.
    async fn count(&self) -> Result<usize>;

    /// Up to `limit` records (without embeddings), for inspection.
    async fn peek(&self, limit: usize) -> Result<Vec<StoredRecord>>;
}

/// Await `fut`, failing with a timeout error after `limit`.
///
/// A timeout is reported the same way as a connection failure.
pub async fn with_timeout<T, F>(limit: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => bail!("{} timed out after {}s", what, limit.as_secs_f64()),
    }
}

/// Create the configured store backend.
///
/// # Errors
///
/// Returns an error for unknown backends or if the backend cannot be
/// opened (sqlite file, chroma collection).
pub async fn open_store(config: &StoreConfig) -> Result<Box<dyn VectorStore>> {
    match config.backend.as_str() {
        "memory" => Ok(Box::new(memory::InMemoryStore::new())),
        "sqlite" => Ok(Box::new(sqlite::SqliteStore::open(&config.path).await?)),
        "chroma" => Ok(Box::new(
            chroma::ChromaStore::connect(&config.url, &config.collection, config.timeout())
                .await?,
        )),
        other => bail!("Unknown store backend: {}", other),
    }
}

/// Check whether a record's metadata satisfies `filter`.
pub(crate) fn matches(record: &StoredRecord, filter: &MetadataFilter) -> bool {
    record.metadata.get(&filter.key) == Some(&filter.value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::source_metadata;

    #[tokio::test]
    async fn test_with_timeout_elapses() {
        let err = with_timeout(Duration::from_millis(10), "lookup", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, anyhow::Error>(())
        })
        .await
        .unwrap_err();
        assert!(err.to_string().contains("lookup timed out"));
    }

    #[tokio::test]
    async fn test_with_timeout_passes_result() {
        let v = with_timeout(Duration::from_secs(1), "op", async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(v, 7);
    }

    #[test]
    fn test_source_filter_matches() {
        let record = StoredRecord {
            id: "x".into(),
            embedding: None,
            document: None,
            metadata: source_metadata("a.md"),
        };
        assert!(matches(&record, &MetadataFilter::source("a.md")));
        assert!(!matches(&record, &MetadataFilter::source("b.md")));
    }

    #[tokio::test]
    async fn test_open_memory_store() {
        let config = StoreConfig {
            backend: "memory".into(),
            ..StoreConfig::default()
        };
        let store = open_store(&config).await.unwrap();
        assert_eq!(store.name(), "memory");
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
