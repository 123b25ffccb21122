//! SQLite-backed [`VectorStore`] implementation.
//!
//! One `records` table keyed by chunk id. Embeddings are stored as
//! little-endian `f32` BLOBs ([`vec_to_blob`]) and metadata as a flat JSON
//! object; the `source` key is mirrored into an indexed column so the
//! per-source stale lookup does not scan the table.

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::models::{
    flatten_metadata, metadata_to_json, MetadataValue, StoredRecord, UpsertRecord, SOURCE_KEY,
};

use super::{MetadataFilter, VectorStore};

/// SQLite implementation of the [`VectorStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `path` and ensure the schema.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open store database: {}", path.display()))?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                id TEXT PRIMARY KEY,
                source TEXT,
                document TEXT NOT NULL,
                embedding BLOB,
                metadata_json TEXT NOT NULL DEFAULT '{}'
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_source ON records(source)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn row_to_record(row: &SqliteRow, include_embeddings: bool) -> Result<StoredRecord> {
    let metadata_json: String = row.get("metadata_json");
    let metadata = flatten_metadata(&serde_json::from_str(&metadata_json)?)?;
    let embedding = if include_embeddings {
        row.get::<Option<Vec<u8>>, _>("embedding")
            .map(|blob| blob_to_vec(&blob))
    } else {
        None
    };
    Ok(StoredRecord {
        id: row.get("id"),
        embedding,
        document: Some(row.get("document")),
        metadata,
    })
}

#[async_trait]
impl VectorStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn heartbeat(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn get_by_ids(
        &self,
        ids: &[String],
        include_embeddings: bool,
    ) -> Result<Vec<StoredRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT id, document, embedding, metadata_json FROM records WHERE id IN ({})",
            placeholders(ids.len())
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| row_to_record(row, include_embeddings))
            .collect()
    }

    async fn get_where(&self, filter: &MetadataFilter) -> Result<Vec<StoredRecord>> {
        let rows = if filter.key == SOURCE_KEY {
            match &filter.value {
                MetadataValue::Str(source) => {
                    sqlx::query(
                        "SELECT id, document, embedding, metadata_json FROM records WHERE source = ?",
                    )
                    .bind(source)
                    .fetch_all(&self.pool)
                    .await?
                }
                _ => Vec::new(),
            }
        } else {
            // Non-source keys are rare; filter in process.
            sqlx::query("SELECT id, document, embedding, metadata_json FROM records")
                .fetch_all(&self.pool)
                .await?
        };

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let record = row_to_record(row, false)?;
            if super::matches(&record, filter) {
                out.push(record);
            }
        }
        Ok(out)
    }

    async fn upsert(&self, records: &[UpsertRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for record in records {
            let source = match record.metadata.get(SOURCE_KEY) {
                Some(MetadataValue::Str(s)) => Some(s.as_str()),
                _ => None,
            };
            sqlx::query(
                r#"
                INSERT INTO records (id, source, document, embedding, metadata_json)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    source = excluded.source,
                    document = excluded.document,
                    embedding = excluded.embedding,
                    metadata_json = excluded.metadata_json
                "#,
            )
            .bind(&record.id)
            .bind(source)
            .bind(&record.document)
            .bind(vec_to_blob(&record.embedding))
            .bind(metadata_to_json(&record.metadata).to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let sql = format!("DELETE FROM records WHERE id IN ({})", placeholders(ids.len()));
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }
        query.execute(&self.pool).await?;
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }

    async fn peek(&self, limit: usize) -> Result<Vec<StoredRecord>> {
        let rows = sqlx::query(
            "SELECT id, document, embedding, metadata_json FROM records ORDER BY id LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(|row| row_to_record(row, false)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::source_metadata;
    use tempfile::TempDir;

    fn record(id: &str, source: &str, v: f32) -> UpsertRecord {
        UpsertRecord {
            id: id.to_string(),
            embedding: vec![v, 1.0 - v, 0.25],
            document: format!("doc {}", id),
            metadata: source_metadata(source),
        }
    }

    #[tokio::test]
    async fn test_upsert_get_delete() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteStore::open(&tmp.path().join("data/store.sqlite"))
            .await
            .unwrap();
        store.heartbeat().await.unwrap();

        store
            .upsert(&[record("a", "f1", 0.5), record("b", "f1", 0.0), record("c", "f2", 1.0)])
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 3);

        let found = store
            .get_by_ids(&["a".into(), "nope".into()], true)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].embedding, Some(vec![0.5, 0.5, 0.25]));
        assert_eq!(found[0].document.as_deref(), Some("doc a"));
        assert_eq!(found[0].metadata, source_metadata("f1"));

        let mut f1: Vec<String> = store
            .get_where(&MetadataFilter::source("f1"))
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        f1.sort();
        assert_eq!(f1, vec!["a", "b"]);

        store.delete(&["a".into(), "b".into()]).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(store
            .get_where(&MetadataFilter::source("f1"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_upsert_overwrites_and_persists() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("store.sqlite");
        {
            let store = SqliteStore::open(&path).await.unwrap();
            store.upsert(&[record("a", "f", 0.0)]).await.unwrap();
            store.upsert(&[record("a", "f", 1.0)]).await.unwrap();
            store.close().await;
        }
        let store = SqliteStore::open(&path).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        let a = store.get_by_ids(&["a".into()], true).await.unwrap();
        assert_eq!(a[0].embedding, Some(vec![1.0, 0.0, 0.25]));
        assert_eq!(store.peek(10).await.unwrap()[0].embedding, None);
    }

    #[tokio::test]
    async fn test_filter_on_other_key() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteStore::open(&tmp.path().join("s.sqlite")).await.unwrap();
        let mut r = record("a", "f", 0.0);
        r.metadata.insert("lang".into(), MetadataValue::from("en"));
        store.upsert(&[r, record("b", "f", 0.0)]).await.unwrap();

        let en = store
            .get_where(&MetadataFilter::eq("lang", "en"))
            .await
            .unwrap();
        assert_eq!(en.len(), 1);
        assert_eq!(en[0].id, "a");
    }
}
