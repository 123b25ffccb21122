//! Chunk-level diff against the store.
//!
//! Given the current chunks of one source file (already carrying their
//! content-addressed ids), [`DiffResolver::resolve`] decides which chunks
//! can reuse a stored embedding, which must be embedded, and which stored
//! ids under the same source no longer correspond to any current chunk.
//!
//! Lookups are batched point reads by id; only the stale scan uses the
//! `source` metadata filter. When the id lookup fails the resolver
//! degrades instead of failing: every chunk needs embedding and nothing is
//! considered stale. The run keeps making progress at the cost of repeated
//! embedding work, and no stored record is ever deleted on the basis of a
//! lookup that did not happen.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use anyhow::Result;

use crate::models::{EmbeddedChunk, IdentifiedChunk};
use crate::store::{with_timeout, MetadataFilter, VectorStore};

/// Outcome of diffing one file's chunks against the store.
#[derive(Debug, Clone, Default)]
pub struct ChunkDiff {
    /// Chunks with no usable stored embedding.
    pub needs_embedding: Vec<IdentifiedChunk>,
    /// Chunks whose stored embedding is reused as-is.
    pub reusable: Vec<EmbeddedChunk>,
    /// Ids stored under this source that are not in the current chunk set.
    pub stale_ids: Vec<String>,
    /// Set when the id lookup failed and the diff fell back to "nothing stored".
    pub degraded: bool,
}

impl ChunkDiff {
    /// Number of distinct chunks currently produced by the file.
    pub fn current_len(&self) -> usize {
        self.needs_embedding.len() + self.reusable.len()
    }

    /// True if the store already matches the current chunk set exactly.
    pub fn is_unchanged(&self) -> bool {
        self.needs_embedding.is_empty() && self.stale_ids.is_empty()
    }
}

/// Resolves chunk diffs against a [`VectorStore`].
pub struct DiffResolver<'a> {
    store: &'a dyn VectorStore,
    lookup_batch_size: usize,
    timeout: Duration,
}

impl<'a> DiffResolver<'a> {
    pub fn new(store: &'a dyn VectorStore, lookup_batch_size: usize, timeout: Duration) -> Self {
        Self {
            store,
            lookup_batch_size: lookup_batch_size.max(1),
            timeout,
        }
    }

    /// Diff `chunks` (all from `source`) against the store.
    ///
    /// Chunks sharing an id collapse to the first occurrence. Never fails;
    /// lookup errors are logged and degrade as described in the module docs.
    pub async fn resolve(&self, source: &str, chunks: Vec<IdentifiedChunk>) -> ChunkDiff {
        let chunks = dedup_by_id(chunks);
        let ids: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();

        let mut stored = match self.lookup_embeddings(&ids).await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(source, error = %e, "chunk lookup failed, embedding every chunk");
                return ChunkDiff {
                    needs_embedding: chunks,
                    degraded: true,
                    ..ChunkDiff::default()
                };
            }
        };

        let mut diff = ChunkDiff::default();
        for chunk in chunks {
            match stored.remove(&chunk.id) {
                Some(embedding) => diff.reusable.push(EmbeddedChunk {
                    id: chunk.id,
                    chunk: chunk.chunk,
                    embedding,
                }),
                None => diff.needs_embedding.push(chunk),
            }
        }

        let current: HashSet<&str> = ids.iter().map(String::as_str).collect();
        diff.stale_ids = match self.stale_ids(source, &current).await {
            Ok(stale) => stale,
            Err(e) => {
                tracing::warn!(source, error = %e, "stale lookup failed, keeping old records");
                Vec::new()
            }
        };

        tracing::debug!(
            source,
            reused = diff.reusable.len(),
            to_embed = diff.needs_embedding.len(),
            stale = diff.stale_ids.len(),
            "chunk diff resolved"
        );

        diff
    }

    /// Map of id → embedding for every id that is stored with a usable vector.
    async fn lookup_embeddings(&self, ids: &[String]) -> Result<HashMap<String, Vec<f32>>> {
        let mut found = HashMap::with_capacity(ids.len());
        for batch in ids.chunks(self.lookup_batch_size) {
            let records = with_timeout(
                self.timeout,
                "store lookup",
                self.store.get_by_ids(batch, true),
            )
            .await?;

            for record in records {
                if let Some(embedding) = record.embedding.filter(|e| !e.is_empty()) {
                    found.insert(record.id, embedding);
                }
            }
        }
        Ok(found)
    }

    async fn stale_ids(&self, source: &str, current: &HashSet<&str>) -> Result<Vec<String>> {
        let filter = MetadataFilter::source(source);
        let records = with_timeout(self.timeout, "stale lookup", self.store.get_where(&filter)).await?;

        let mut stale: Vec<String> = records
            .into_iter()
            .map(|r| r.id)
            .filter(|id| !current.contains(id.as_str()))
            .collect();
        stale.sort();
        stale.dedup();
        Ok(stale)
    }
}

fn dedup_by_id(chunks: Vec<IdentifiedChunk>) -> Vec<IdentifiedChunk> {
    let mut seen = HashSet::with_capacity(chunks.len());
    chunks
        .into_iter()
        .filter(|c| seen.insert(c.id.clone()))
        .collect()
}
