//! # Context Sync CLI (`csync`)
//!
//! Keeps a vector store in sync with a set of text files, embedding only
//! the chunks that changed since the last run.
//!
//! ## Usage
//!
//! ```bash
//! csync --config ./config/csync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `csync init` | Create the store schema or collection |
//! | `csync sync <paths>...` | Index changed files under the given paths |
//! | `csync inspect` | Show record count and sample records |
//! | `csync cache list` | Show file cache entries |
//! | `csync cache clear` | Delete the file cache (next sync reprocesses everything) |
//! | `csync cache forget <path>` | Drop one file's cache entry |
//!
//! Diagnostic logs go to stderr and are controlled with `RUST_LOG`
//! (default `warn`).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use context_sync::cache::FileChangeCache;
use context_sync::chunk::RecursiveSplitter;
use context_sync::config::{self, Config};
use context_sync::embedding::{create_provider, Embedder};
use context_sync::inspect;
use context_sync::models::source_id;
use context_sync::pipeline::{self, Pipeline, PipelineOptions, PipelineSettings};
use context_sync::progress::ProgressMode;
use context_sync::store::{open_store, VectorStore};

/// Context Sync: incremental, content-addressed indexing of text files
/// into a vector store.
#[derive(Parser)]
#[command(
    name = "csync",
    about = "Context Sync — incremental, content-addressed indexing of text files into a vector store",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/csync.toml`. Cache, discovery, chunking,
    /// embedding, and store settings are read from this file.
    #[arg(long, global = true, default_value = "./config/csync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the store.
    ///
    /// Creates the SQLite schema or the Chroma collection. Idempotent.
    Init,

    /// Index changed files.
    ///
    /// Files whose content is unchanged since the last successful sync are
    /// skipped. For changed files only new chunks are embedded, and chunks
    /// that no longer exist are deleted from the store.
    Sync {
        /// Files or directories to index.
        ///
        /// Each file is recorded under the path it was reached by, with `.`
        /// components dropped: `docs` and `./docs` are the same source, but
        /// `docs` and `/abs/path/docs` are not. Use one spelling per tree.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Descend into subdirectories.
        #[arg(long)]
        recursive: bool,

        /// Maximum directory depth when recursing (overrides config).
        #[arg(long)]
        max_depth: Option<usize>,

        /// Ignore the file cache and diff every file against the store.
        #[arg(long)]
        full: bool,

        /// Show what would be processed without touching the store or embedder.
        #[arg(long)]
        dry_run: bool,

        /// Progress output on stderr.
        #[arg(long, value_enum, default_value_t = ProgressArg::Auto)]
        progress: ProgressArg,
    },

    /// Show the number of stored records and a sample.
    Inspect {
        /// Number of sample records to show.
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },

    /// Inspect or reset the file cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// List cached files with their fingerprint and chunk count.
    List,
    /// Delete the cache file.
    Clear,
    /// Drop one file's entry so the next sync reprocesses it.
    Forget {
        /// The file, spelled as it was passed to `sync`.
        path: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Auto,
    Human,
    Json,
    Off,
}

impl ProgressArg {
    fn mode(self) -> ProgressMode {
        match self {
            ProgressArg::Auto => ProgressMode::default_for_tty(),
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
            ProgressArg::Off => ProgressMode::Off,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Commands that work without a config file
    match &cli.command {
        Commands::Cache { action } => {
            let cfg = config::load_config(&cli.config).unwrap_or_else(|_| Config::minimal());
            let mut cache = FileChangeCache::load(&cfg.cache.path);
            match action {
                CacheAction::List => inspect::print_cache(&cache),
                CacheAction::Clear => {
                    let n = cache.entries().len();
                    cache.clear()?;
                    println!("Cleared {} cache entries.", n);
                }
                CacheAction::Forget { path } => {
                    let source = source_id(path);
                    if cache.forget(&source)? {
                        println!("Forgot {}.", source);
                    } else {
                        println!("No cache entry for {}.", source);
                    }
                }
            }
            return Ok(());
        }
        Commands::Sync {
            paths,
            recursive,
            max_depth,
            full,
            dry_run: true,
            ..
        } => {
            let mut cfg = config::load_config(&cli.config).unwrap_or_else(|_| Config::minimal());
            apply_discovery_flags(&mut cfg, *recursive, *max_depth);
            let cache = FileChangeCache::load(&cfg.cache.path);
            let chunker = RecursiveSplitter::from_config(&cfg.chunking);
            let planned = pipeline::plan(
                paths,
                &cfg.discovery,
                &cache,
                &chunker,
                PipelineOptions { force: *full },
            )?;
            pipeline::print_plan(&planned);
            return Ok(());
        }
        _ => {}
    }

    let mut cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let store = open_store(&cfg.store).await?;
            store.heartbeat().await?;
            println!("Store initialized ({}).", store.name());
        }
        Commands::Sync {
            paths,
            recursive,
            max_depth,
            full,
            progress,
            ..
        } => {
            apply_discovery_flags(&mut cfg, recursive, max_depth);
            if !cfg.store.is_durable() {
                bail!(
                    "store.backend = \"{}\" keeps nothing between runs, so the file cache would \
                     skip files the store no longer has. Use sqlite or chroma for sync.",
                    cfg.store.backend
                );
            }
            if !cfg.embedding.is_enabled() {
                bail!(
                    "No embedding provider configured. Set [embedding] provider in {}",
                    cli.config.display()
                );
            }

            let embedder: Arc<dyn Embedder> = Arc::from(create_provider(&cfg.embedding)?);
            let store: Arc<dyn VectorStore> = Arc::from(open_store(&cfg.store).await?);
            let cache = FileChangeCache::load(&cfg.cache.path);

            let mut pipeline = Pipeline::new(
                Arc::new(RecursiveSplitter::from_config(&cfg.chunking)),
                embedder,
                store,
                cache,
                PipelineSettings::from_config(&cfg),
            )
            .with_options(PipelineOptions { force: full })
            .with_progress(progress.mode().reporter());

            let report = pipeline.run(&paths).await?;
            report.print_summary();
            if report.stats.files_failed > 0 {
                bail!("{} file(s) failed to sync", report.stats.files_failed);
            }
        }
        Commands::Inspect { limit } => {
            let store = open_store(&cfg.store).await?;
            let summary = inspect::summarize_store(store.as_ref(), limit).await?;
            inspect::print_store_summary(&summary);
        }
        Commands::Cache { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}

fn apply_discovery_flags(cfg: &mut Config, recursive: bool, max_depth: Option<usize>) {
    if recursive {
        cfg.discovery.recursive = true;
    }
    if let Some(depth) = max_depth {
        cfg.discovery.max_depth = depth;
    }
}
