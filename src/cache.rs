//! File-level change cache.
//!
//! Persists one [`FileCacheEntry`] per successfully processed source path:
//! the SHA-256 fingerprint of the whole file, when it was processed, and
//! how many chunks it produced. A file whose fingerprint matches its entry
//! needs no chunking, embedding, or store traffic at all.
//!
//! The cache is a single JSON object keyed by path, read in full at load
//! and rewritten in full after every successful file. Loading never fails:
//! a missing or unreadable cache is an empty cache, which only costs a full
//! reprocess.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Cache state for one source path at its last successful processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCacheEntry {
    /// Content fingerprint (hex SHA-256).
    pub hash: String,
    /// Milliseconds since the Unix epoch.
    pub last_processed: i64,
    pub chunk_count: usize,
}

/// Path-keyed change cache backed by a JSON file.
#[derive(Debug)]
pub struct FileChangeCache {
    path: PathBuf,
    entries: BTreeMap<String, FileCacheEntry>,
}

impl FileChangeCache {
    /// Load the cache from `path`, falling back to an empty cache.
    pub fn load(path: &Path) -> Self {
        let entries = match std::fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str(&data) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "file cache unreadable, starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "file cache unreadable, starting empty");
                BTreeMap::new()
            }
        };

        Self {
            path: path.to_path_buf(),
            entries,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True if `source` has no entry or its fingerprint differs.
    pub fn has_changed(&self, source: &str, fingerprint: &str) -> bool {
        match self.entries.get(source) {
            Some(entry) => entry.hash != fingerprint,
            None => true,
        }
    }

    /// Chunk count recorded at the last successful processing of `source`.
    pub fn cached_chunk_count(&self, source: &str) -> Option<usize> {
        self.entries.get(source).map(|e| e.chunk_count)
    }

    pub fn get(&self, source: &str) -> Option<&FileCacheEntry> {
        self.entries.get(source)
    }

    pub fn entries(&self) -> &BTreeMap<String, FileCacheEntry> {
        &self.entries
    }

    /// Create or overwrite the entry for `source` and persist the cache.
    ///
    /// The in-memory state is only updated once the write has landed.
    pub fn record_success(
        &mut self,
        source: &str,
        fingerprint: &str,
        chunk_count: usize,
    ) -> Result<()> {
        let mut next = self.entries.clone();
        next.insert(
            source.to_string(),
            FileCacheEntry {
                hash: fingerprint.to_string(),
                last_processed: chrono::Utc::now().timestamp_millis(),
                chunk_count,
            },
        );
        self.persist(&next)?;
        self.entries = next;
        Ok(())
    }

    /// Drop the entry for `source`. Returns whether an entry existed.
    pub fn forget(&mut self, source: &str) -> Result<bool> {
        if !self.entries.contains_key(source) {
            return Ok(false);
        }
        let mut next = self.entries.clone();
        next.remove(source);
        self.persist(&next)?;
        self.entries = next;
        Ok(true)
    }

    /// Remove every entry and delete the cache file.
    pub fn clear(&mut self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to remove file cache: {}", self.path.display())
                })
            }
        }
        self.entries.clear();
        Ok(())
    }

    /// Write `entries` to a sibling temp file, then rename it into place.
    fn persist(&self, entries: &BTreeMap<String, FileCacheEntry>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create cache directory: {}", parent.display())
                })?;
            }
        }

        let json = serde_json::to_string_pretty(entries)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write file cache: {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace file cache: {}", self.path.display()))?;
        Ok(())
    }
}
