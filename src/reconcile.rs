//! Bring the store's record set for one source into agreement with its
//! current chunks.
//!
//! Freshly embedded chunks are upserted, then stale ids are deleted, in
//! that order, so an interruption between the two leaves extra records
//! rather than missing ones. Reused chunks are already stored under the
//! same content-addressed id with identical text and metadata, so they are
//! not written again. When there is nothing to upsert and nothing to delete
//! the store is not called at all.

use std::time::Duration;

use anyhow::{Context, Result};

use crate::models::{EmbeddedChunk, UpsertRecord};
use crate::store::{with_timeout, VectorStore};

/// What a reconciliation did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Ids now current for the source, in chunk order.
    pub current_ids: Vec<String>,
    pub upserted: usize,
    pub deleted: usize,
}

impl ReconcileOutcome {
    /// True if the store was written to.
    pub fn touched_store(&self) -> bool {
        self.upserted > 0 || self.deleted > 0
    }
}

pub struct StoreReconciler<'a> {
    store: &'a dyn VectorStore,
    write_batch_size: usize,
    timeout: Duration,
}

impl<'a> StoreReconciler<'a> {
    pub fn new(store: &'a dyn VectorStore, write_batch_size: usize, timeout: Duration) -> Self {
        Self {
            store,
            write_batch_size: write_batch_size.max(1),
            timeout,
        }
    }

    /// Upsert `fresh`, then delete `stale_ids`.
    ///
    /// # Errors
    ///
    /// Fails on the first store error. Upsert batches that completed before
    /// the error stay written; no delete is attempted after a failed upsert.
    pub async fn reconcile(
        &self,
        reusable: Vec<EmbeddedChunk>,
        fresh: Vec<EmbeddedChunk>,
        stale_ids: &[String],
    ) -> Result<ReconcileOutcome> {
        let mut order: Vec<(usize, String)> = reusable
            .iter()
            .chain(fresh.iter())
            .map(|c| (c.chunk.index, c.id.clone()))
            .collect();
        order.sort();
        let current_ids = order.into_iter().map(|(_, id)| id).collect();

        if fresh.is_empty() && stale_ids.is_empty() {
            return Ok(ReconcileOutcome {
                current_ids,
                ..ReconcileOutcome::default()
            });
        }

        let records: Vec<UpsertRecord> = fresh.into_iter().map(EmbeddedChunk::into_upsert).collect();
        for batch in records.chunks(self.write_batch_size) {
            with_timeout(self.timeout, "store upsert", self.store.upsert(batch))
                .await
                .with_context(|| format!("Failed to upsert {} records", batch.len()))?;
        }

        for batch in stale_ids.chunks(self.write_batch_size) {
            with_timeout(self.timeout, "store delete", self.store.delete(batch))
                .await
                .with_context(|| format!("Failed to delete {} stale records", batch.len()))?;
        }

        Ok(ReconcileOutcome {
            current_ids,
            upserted: records.len(),
            deleted: stale_ids.len(),
        })
    }
}
