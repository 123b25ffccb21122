//! Core data models used throughout Context Sync.
//!
//! These types represent the source files, chunks, and store records that
//! flow through the synchronization pipeline. Store records carry only
//! *flat* metadata ([`Metadata`]); structured values are flattened with
//! [`flatten_metadata`] before they reach a store.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Metadata key holding the owning source path of a chunk.
pub const SOURCE_KEY: &str = "source";

/// A text file discovered for processing.
///
/// Content is read once per run; [`fingerprint`](SourceFile::fingerprint)
/// is the SHA-256 of the whole content and drives the file change cache.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub content: String,
    pub fingerprint: String,
}

impl SourceFile {
    /// Read `path` as UTF-8 text and fingerprint it.
    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let fingerprint = crate::identity::fingerprint(&content);
        Ok(Self {
            path: path.to_path_buf(),
            content,
            fingerprint,
        })
    }

    /// The source identifier used for chunk ids, store metadata, and cache keys.
    ///
    /// Every component derives the identifier through this method so the
    /// write-time and diff-time identities can never diverge.
    pub fn source_id(&self) -> String {
        source_id(&self.path)
    }
}

/// Canonical string form of a source path.
///
/// The path is normalized lexically: `.` components are dropped, so
/// `./docs/a.md` and `docs/a.md` name the same source. Nothing else is
/// resolved. Relative and absolute spellings of one file, or paths through
/// `..` or symlinks, stay distinct sources.
pub fn source_id(path: &Path) -> String {
    let normalized: PathBuf = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    if normalized.as_os_str().is_empty() {
        return ".".to_string();
    }
    normalized.to_string_lossy().to_string()
}

/// A contiguous slice of a source file's text.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Position of the chunk within the file (0-based). Not part of the identity.
    pub index: usize,
    pub text: String,
    /// Flat metadata; always contains [`SOURCE_KEY`].
    pub metadata: Metadata,
}

impl Chunk {
    pub fn source(&self) -> &str {
        match self.metadata.get(SOURCE_KEY) {
            Some(MetadataValue::Str(s)) => s,
            _ => "",
        }
    }
}

/// A chunk paired with its content address.
#[derive(Debug, Clone)]
pub struct IdentifiedChunk {
    pub id: String,
    pub chunk: Chunk,
}

/// A chunk paired with an embedding vector, fresh or reused from the store.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub id: String,
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

impl EmbeddedChunk {
    pub fn into_upsert(self) -> UpsertRecord {
        UpsertRecord {
            id: self.id,
            embedding: self.embedding,
            document: self.chunk.text,
            metadata: self.chunk.metadata,
        }
    }
}

/// A record as returned by a store lookup.
///
/// `embedding` and `document` are optional because lookups may omit them.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: String,
    pub embedding: Option<Vec<f32>>,
    pub document: Option<String>,
    pub metadata: Metadata,
}

/// A complete record written by an upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub document: String,
    pub metadata: Metadata,
}

/// A primitive metadata value accepted by vector stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::Str(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::Str(s)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        MetadataValue::Int(v)
    }
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        MetadataValue::Bool(v)
    }
}

/// Flat key/value metadata.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Build the metadata carried by every chunk of `source`.
pub fn source_metadata(source: &str) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert(SOURCE_KEY.to_string(), MetadataValue::from(source));
    metadata
}

/// Flatten a JSON object into [`Metadata`].
///
/// Nested objects are flattened with dotted keys (`{"loc": {"line": 3}}`
/// becomes `loc.line = 3`). Arrays and `null` cannot be represented in a
/// flat store and are rejected.
pub fn flatten_metadata(value: &serde_json::Value) -> Result<Metadata> {
    let mut out = Metadata::new();
    match value {
        serde_json::Value::Object(map) => {
            for (key, v) in map {
                flatten_into(key, v, &mut out)?;
            }
        }
        serde_json::Value::Null => {}
        other => bail!("metadata must be a JSON object, got: {}", other),
    }
    Ok(out)
}

fn flatten_into(prefix: &str, value: &serde_json::Value, out: &mut Metadata) -> Result<()> {
    match value {
        serde_json::Value::Object(map) => {
            for (key, v) in map {
                flatten_into(&format!("{}.{}", prefix, key), v, out)?;
            }
        }
        serde_json::Value::String(s) => {
            out.insert(prefix.to_string(), MetadataValue::Str(s.clone()));
        }
        serde_json::Value::Bool(b) => {
            out.insert(prefix.to_string(), MetadataValue::Bool(*b));
        }
        serde_json::Value::Number(n) => {
            let v = match n.as_i64() {
                Some(i) => MetadataValue::Int(i),
                None => MetadataValue::Float(n.as_f64().unwrap_or_default()),
            };
            out.insert(prefix.to_string(), v);
        }
        serde_json::Value::Array(_) => bail!("metadata key '{}' holds an array", prefix),
        serde_json::Value::Null => bail!("metadata key '{}' is null", prefix),
    }
    Ok(())
}

/// Serialize flat metadata as a JSON object.
pub fn metadata_to_json(metadata: &Metadata) -> serde_json::Value {
    serde_json::to_value(metadata).unwrap_or_else(|_| serde_json::json!({}))
}
