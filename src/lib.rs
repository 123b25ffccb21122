//! # Context Sync
//!
//! Incremental, content-addressed synchronization of text files into a
//! vector store.
//!
//! Each file is split into chunks, and each chunk is keyed by a hash of its
//! text and its source path. On every run only new chunks are embedded,
//! unchanged chunks keep their stored vectors, and chunks that disappeared
//! from a file are deleted from the store. Files whose content has not
//! changed since the last successful run are skipped after a single hash.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌────────────┐   ┌──────────────┐   ┌───────────┐
//! │ discover  │──▶│ file cache │──▶│ chunk + id   │──▶│ diff vs   │
//! │ (walkdir) │   │ (skip?)    │   │ (sha256)     │   │ store     │
//! └───────────┘   └────────────┘   └──────────────┘   └─────┬─────┘
//!                                                           │
//!              ┌────────────┐   ┌──────────────┐   ┌────────▼──┐
//!              │ file cache │◀──│ reconcile    │◀──│ embed new │
//!              │ update     │   │ upsert→delete│   │ chunks    │
//!              └────────────┘   └──────────────┘   └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! csync init                         # create store schema / collection
//! csync sync ./docs --recursive      # index changed files
//! csync sync ./docs --dry-run        # show what would change
//! csync inspect                      # record count and samples
//! csync cache list                   # file cache entries
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`discover`] | Filesystem discovery |
//! | [`chunk`] | Recursive character splitter |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Vector store abstraction and backends |
//! | [`cache`] | File-level change cache |
//! | [`identity`] | Content-addressed chunk ids |
//! | [`resolve`] | Chunk diff against the store |
//! | [`reconcile`] | Store upsert/delete for one source |
//! | [`pipeline`] | Run orchestration and statistics |
//! | [`progress`] | Progress reporting on stderr |
//! | [`inspect`] | Store and cache inspection |

pub mod cache;
pub mod chunk;
pub mod config;
pub mod discover;
pub mod embedding;
pub mod identity;
pub mod inspect;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod reconcile;
pub mod resolve;
pub mod store;
