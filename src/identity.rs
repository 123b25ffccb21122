//! Content addresses for chunks.
//!
//! A chunk's id is the first [`ID_LEN`] hex characters of
//! `SHA-256(chunk_text ++ source)`. The id doubles as the store record key
//! and as the chunk-level change detector, so it must be computed the same
//! way at write time and at diff time. Chunk position is deliberately not
//! an input: moving a chunk within its file keeps its id.

use rayon::prelude::*;
use sha2::{Digest, Sha256};

use crate::models::{Chunk, IdentifiedChunk};

/// Length of a chunk id in hex characters.
pub const ID_LEN: usize = 36;

/// Minimum number of chunks handed to one rayon task.
const ID_BATCH_SIZE: usize = 100;

/// Content address of `text` within `source`.
pub fn chunk_id(text: &str, source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update(source.as_bytes());
    let mut id = hex::encode(hasher.finalize());
    id.truncate(ID_LEN);
    id
}

/// SHA-256 fingerprint of a whole file's content.
pub fn fingerprint(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Compute ids for a batch of chunks of one source, preserving order.
///
/// Work is split across the rayon pool in batches of at least
/// [`ID_BATCH_SIZE`]; the result is identical to mapping [`chunk_id`]
/// sequentially.
pub fn identify(chunks: Vec<Chunk>, source: &str) -> Vec<IdentifiedChunk> {
    chunks
        .into_par_iter()
        .with_min_len(ID_BATCH_SIZE)
        .map(|chunk| IdentifiedChunk {
            id: chunk_id(&chunk.text, source),
            chunk,
        })
        .collect()
}
