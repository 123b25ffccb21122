//! Store and cache inspection.
//!
//! Gives a quick view of what is indexed: total record count, a sample of
//! records, and the file cache entries. Used by `csync inspect` and
//! `csync cache list`.

use anyhow::Result;
use chrono::{TimeZone, Utc};

use crate::cache::FileChangeCache;
use crate::models::{MetadataValue, StoredRecord, SOURCE_KEY};
use crate::store::VectorStore;

/// Characters of document text shown per sample.
const PREVIEW_CHARS: usize = 50;

/// Snapshot of the store contents.
#[derive(Debug, Clone)]
pub struct StoreSummary {
    pub backend: String,
    pub total: usize,
    pub samples: Vec<StoredRecord>,
}

pub async fn summarize_store(store: &dyn VectorStore, limit: usize) -> Result<StoreSummary> {
    let total = store.count().await?;
    let samples = store.peek(limit).await?;
    Ok(StoreSummary {
        backend: store.name().to_string(),
        total,
        samples,
    })
}

pub fn print_store_summary(summary: &StoreSummary) {
    println!("Store ({})", summary.backend);
    println!("  total records: {}", summary.total);
    if summary.samples.is_empty() {
        return;
    }
    println!();
    for record in &summary.samples {
        let source = record
            .metadata
            .get(SOURCE_KEY)
            .map(|v| match v {
                MetadataValue::Str(s) => s.clone(),
                other => format!("{:?}", other),
            })
            .unwrap_or_else(|| "-".to_string());
        println!("  {}", record.id);
        println!("    source: {}", source);
        println!(
            "    text:   {}",
            preview(record.document.as_deref().unwrap_or(""))
        );
    }
}

pub fn print_cache(cache: &FileChangeCache) {
    println!("File cache: {}", cache.path().display());
    println!("  entries: {}", cache.entries().len());
    for (path, entry) in cache.entries() {
        let when = Utc
            .timestamp_millis_opt(entry.last_processed)
            .single()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        println!(
            "  {}  {} chunks  {}  {}",
            path,
            entry.chunk_count,
            &entry.hash[..entry.hash.len().min(12)],
            when
        );
    }
}

/// First [`PREVIEW_CHARS`] characters of `text` on one line.
pub fn preview(text: &str) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .collect();
    let mut out: String = flat.chars().take(PREVIEW_CHARS).collect();
    if flat.chars().count() > PREVIEW_CHARS {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{source_metadata, UpsertRecord};
    use crate::store::memory::InMemoryStore;

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        assert_eq!(preview("short\ntext"), "short text");
        let long = "é".repeat(60);
        let p = preview(&long);
        assert_eq!(p.chars().count(), PREVIEW_CHARS + 3);
        assert!(p.ends_with("..."));
    }

    #[tokio::test]
    async fn test_summarize_store() {
        let store = InMemoryStore::new();
        let records: Vec<UpsertRecord> = (0..8)
            .map(|i| UpsertRecord {
                id: format!("id{}", i),
                embedding: vec![0.0],
                document: format!("text {}", i),
                metadata: source_metadata("f.md"),
            })
            .collect();
        store.upsert(&records).await.unwrap();

        let summary = summarize_store(&store, 5).await.unwrap();
        assert_eq!(summary.backend, "memory");
        assert_eq!(summary.total, 8);
        assert_eq!(summary.samples.len(), 5);
        assert!(summary.samples.iter().all(|r| r.embedding.is_none()));
    }
}
