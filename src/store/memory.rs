//! In-memory [`VectorStore`] implementation for tests and ephemeral runs.
//!
//! Uses a `BTreeMap` behind `std::sync::RwLock` for thread safety. Every
//! upsert and delete is also appended to an operation log so callers can
//! assert exactly which ids a run touched.

use std::collections::BTreeMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{StoredRecord, UpsertRecord};

use super::{matches, MetadataFilter, VectorStore};

/// A single mutation applied to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Upsert(Vec<String>),
    Delete(Vec<String>),
}

/// In-memory store for testing and ephemeral runs.
pub struct InMemoryStore {
    records: RwLock<BTreeMap<String, StoredRecord>>,
    ops: RwLock<Vec<StoreOp>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            ops: RwLock::new(Vec::new()),
        }
    }

    /// Every mutation applied since creation (or the last [`clear_ops`](Self::clear_ops)).
    pub fn ops(&self) -> Vec<StoreOp> {
        self.ops.read().unwrap().clone()
    }

    pub fn clear_ops(&self) {
        self.ops.write().unwrap().clear();
    }

    /// All ids written by upserts in the operation log, in order.
    pub fn upserted_ids(&self) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                StoreOp::Upsert(ids) => Some(ids),
                StoreOp::Delete(_) => None,
            })
            .flatten()
            .collect()
    }

    /// All ids removed by deletes in the operation log, in order.
    pub fn deleted_ids(&self) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                StoreOp::Delete(ids) => Some(ids),
                StoreOp::Upsert(_) => None,
            })
            .flatten()
            .collect()
    }

    /// Ids currently stored, sorted.
    pub fn ids(&self) -> Vec<String> {
        self.records.read().unwrap().keys().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<StoredRecord> {
        self.records.read().unwrap().get(id).cloned()
    }

    /// Insert a record directly, bypassing the operation log.
    pub fn seed(&self, record: StoredRecord) {
        self.records
            .write()
            .unwrap()
            .insert(record.id.clone(), record);
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn without_embedding(record: &StoredRecord) -> StoredRecord {
    StoredRecord {
        embedding: None,
        ..record.clone()
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn heartbeat(&self) -> Result<()> {
        Ok(())
    }

    async fn get_by_ids(
        &self,
        ids: &[String],
        include_embeddings: bool,
    ) -> Result<Vec<StoredRecord>> {
        let records = self.records.read().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| records.get(id))
            .map(|r| {
                if include_embeddings {
                    r.clone()
                } else {
                    without_embedding(r)
                }
            })
            .collect())
    }

    async fn get_where(&self, filter: &MetadataFilter) -> Result<Vec<StoredRecord>> {
        let records = self.records.read().unwrap();
        Ok(records
            .values()
            .filter(|r| matches(r, filter))
            .map(without_embedding)
            .collect())
    }

    async fn upsert(&self, records: &[UpsertRecord]) -> Result<()> {
        {
            let mut stored = self.records.write().unwrap();
            for r in records {
                stored.insert(
                    r.id.clone(),
                    StoredRecord {
                        id: r.id.clone(),
                        embedding: Some(r.embedding.clone()),
                        document: Some(r.document.clone()),
                        metadata: r.metadata.clone(),
                    },
                );
            }
        }
        self.ops
            .write()
            .unwrap()
            .push(StoreOp::Upsert(records.iter().map(|r| r.id.clone()).collect()));
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        {
            let mut stored = self.records.write().unwrap();
            for id in ids {
                stored.remove(id);
            }
        }
        self.ops.write().unwrap().push(StoreOp::Delete(ids.to_vec()));
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().unwrap().len())
    }

    async fn peek(&self, limit: usize) -> Result<Vec<StoredRecord>> {
        let records = self.records.read().unwrap();
        Ok(records.values().take(limit).map(without_embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::source_metadata;

    fn record(id: &str, source: &str) -> UpsertRecord {
        UpsertRecord {
            id: id.to_string(),
            embedding: vec![1.0, 0.0],
            document: format!("text of {}", id),
            metadata: source_metadata(source),
        }
    }

    #[tokio::test]
    async fn test_get_by_ids_is_partial() {
        let store = InMemoryStore::new();
        store.upsert(&[record("a", "f"), record("b", "f")]).await.unwrap();

        let found = store
            .get_by_ids(&["a".into(), "missing".into()], true)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "a");
        assert_eq!(found[0].embedding, Some(vec![1.0, 0.0]));

        let bare = store.get_by_ids(&["a".into()], false).await.unwrap();
        assert_eq!(bare[0].embedding, None);
    }

    #[tokio::test]
    async fn test_upsert_overwrites() {
        let store = InMemoryStore::new();
        store.upsert(&[record("a", "f")]).await.unwrap();
        let mut updated = record("a", "f");
        updated.embedding = vec![0.0, 1.0];
        store.upsert(&[updated]).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.get("a").unwrap().embedding, Some(vec![0.0, 1.0]));
    }

    #[tokio::test]
    async fn test_get_where_filters_by_source() {
        let store = InMemoryStore::new();
        store
            .upsert(&[record("a", "f1"), record("b", "f2"), record("c", "f1")])
            .await
            .unwrap();
        let mut ids: Vec<String> = store
            .get_where(&MetadataFilter::source("f1"))
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_ops_are_logged() {
        let store = InMemoryStore::new();
        store.upsert(&[record("a", "f")]).await.unwrap();
        store.delete(&["a".into(), "zzz".into()]).await.unwrap();

        assert_eq!(store.upserted_ids(), vec!["a"]);
        assert_eq!(store.deleted_ids(), vec!["a", "zzz"]);
        assert_eq!(store.count().await.unwrap(), 0);

        store.clear_ops();
        assert!(store.ops().is_empty());
    }
}
