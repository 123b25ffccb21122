//! Recursive character text splitter.
//!
//! Splits file text into overlapping [`Chunk`]s of at most `chunk_size`
//! characters. Splitting tries the coarsest separator first (`"\n\n"`),
//! falling back to `"\n"`, `" "`, and finally individual characters for
//! pieces that are still too long.
//!
//! # Algorithm
//!
//! 1. Pick the first separator that occurs in the text and split on it.
//! 2. Pieces shorter than `chunk_size` are collected; longer pieces are
//!    split recursively with the remaining separators.
//! 3. Collected pieces are merged back into windows no longer than
//!    `chunk_size`. When a window is emitted, pieces are dropped from its
//!    front until at most `chunk_overlap` characters remain, and those
//!    carry over into the next window.
//! 4. Windows are trimmed; empty windows are dropped, so empty text yields
//!    no chunks.
//!
//! # Example
//!
//! ```rust
//! use context_sync::chunk::{Chunker, RecursiveSplitter};
//!
//! let splitter = RecursiveSplitter::new(50, 10);
//! let chunks = splitter
//!     .split("Hello world.\n\nSecond paragraph.", "notes.txt")
//!     .unwrap();
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].source(), "notes.txt");
//! ```

use std::collections::VecDeque;

use anyhow::Result;

use crate::config::ChunkingConfig;
use crate::models::{source_metadata, Chunk};

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Source text → ordered chunks. Must be deterministic for identical input.
///
/// An error fails the file at the chunk stage; the run moves on.
pub trait Chunker: Send + Sync {
    fn split(&self, text: &str, source: &str) -> Result<Vec<Chunk>>;
}

/// Overlapping recursive character splitter.
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Split `text` into trimmed, non-empty pieces.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &SEPARATORS)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let (separator, remaining) = pick_separator(text, separators);

        let pieces: Vec<&str> = if separator.is_empty() {
            text.char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect()
        } else {
            text.split(separator).filter(|s| !s.is_empty()).collect()
        };

        let mut out = Vec::new();
        let mut short = Vec::new();
        for piece in pieces {
            if char_len(piece) < self.chunk_size {
                short.push(piece);
                continue;
            }
            if !short.is_empty() {
                out.extend(self.merge(&short, separator));
                short.clear();
            }
            if remaining.is_empty() {
                out.push(piece.to_string());
            } else {
                out.extend(self.split_recursive(piece, remaining));
            }
        }
        if !short.is_empty() {
            out.extend(self.merge(&short, separator));
        }
        out
    }

    fn merge(&self, pieces: &[&str], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut merged = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            let joiner = if window.is_empty() { 0 } else { sep_len };

            if total + len + joiner > self.chunk_size && !window.is_empty() {
                push_window(&mut merged, &window, separator);

                // Keep at most `chunk_overlap` characters for the next window.
                while total > self.chunk_overlap
                    || (total > 0
                        && total + len + if window.is_empty() { 0 } else { sep_len }
                            > self.chunk_size)
                {
                    let joiner = if window.len() > 1 { sep_len } else { 0 };
                    match window.pop_front() {
                        Some(front) => total = total.saturating_sub(char_len(front) + joiner),
                        None => break,
                    }
                }
            }

            window.push_back(piece);
            total += len + if window.len() > 1 { sep_len } else { 0 };
        }

        push_window(&mut merged, &window, separator);
        merged
    }
}

impl Default for RecursiveSplitter {
    fn default() -> Self {
        Self::from_config(&ChunkingConfig::default())
    }
}

impl Chunker for RecursiveSplitter {
    fn split(&self, text: &str, source: &str) -> Result<Vec<Chunk>> {
        Ok(self
            .split_text(text)
            .into_iter()
            .enumerate()
            .map(|(index, text)| Chunk {
                index,
                text,
                metadata: source_metadata(source),
            })
            .collect())
    }
}

fn pick_separator<'a, 'b>(text: &str, separators: &'b [&'a str]) -> (&'a str, &'b [&'a str]) {
    for (i, sep) in separators.iter().enumerate() {
        if sep.is_empty() || text.contains(sep) {
            return (sep, &separators[i + 1..]);
        }
    }
    ("", &[])
}

fn push_window(out: &mut Vec<String>, window: &VecDeque<&str>, separator: &str) {
    let joined = window.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
