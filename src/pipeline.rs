//! Sync pipeline orchestration.
//!
//! Drives one run across a set of files:
//! discover → cache check → chunk → diff against store → embed new chunks →
//! reconcile store → update cache.
//!
//! Files are processed one at a time. A file that is unchanged since its
//! last successful run costs one read and one hash. A file that fails at
//! any step is reported and left out of the cache, so the next run retries
//! it from scratch; the run itself moves on to the next file. Only an
//! unreachable store at startup aborts the run.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::cache::FileChangeCache;
use crate::chunk::Chunker;
use crate::config::{Config, DiscoveryConfig};
use crate::discover::discover_files;
use crate::embedding::{embed_all, EmbedLimits, Embedder};
use crate::identity::identify;
use crate::models::{EmbeddedChunk, SourceFile};
use crate::progress::{NoProgress, ProgressEvent, ProgressReporter};
use crate::reconcile::StoreReconciler;
use crate::resolve::DiffResolver;
use crate::store::{with_timeout, VectorStore};

/// Per-run switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineOptions {
    /// Ignore the file cache and diff every file against the store.
    pub force: bool,
}

/// Tunables taken from [`Config`].
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub discovery: DiscoveryConfig,
    pub lookup_batch_size: usize,
    pub write_batch_size: usize,
    pub store_timeout: Duration,
    pub embed_limits: EmbedLimits,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            discovery: config.discovery.clone(),
            lookup_batch_size: config.store.lookup_batch_size,
            write_batch_size: config.store.write_batch_size,
            store_timeout: config.store.timeout(),
            embed_limits: EmbedLimits::from_config(&config.embedding),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Per-file processing steps, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStage {
    Load,
    Chunk,
    Embed,
    Reconcile,
    CacheUpdate,
}

impl fmt::Display for FileStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileStage::Load => "load",
            FileStage::Chunk => "chunk",
            FileStage::Embed => "embed",
            FileStage::Reconcile => "reconcile",
            FileStage::CacheUpdate => "cache update",
        };
        f.write_str(name)
    }
}

/// Terminal state of one file.
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    /// Unchanged since the last successful run; `chunks` comes from the cache.
    Skipped { chunks: usize },
    /// Store and cache now reflect the current content.
    ///
    /// `degraded` is set when the store lookup failed and every chunk was
    /// embedded again; records left behind are removed by a later run.
    Completed {
        chunks: usize,
        reused: usize,
        embedded: usize,
        deleted: usize,
        degraded: bool,
    },
    /// `stage` failed; the cache entry was not touched.
    Failed { stage: FileStage, error: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileReport {
    pub path: PathBuf,
    pub outcome: FileOutcome,
}

/// Aggregate counters for a run. Chunk totals only count skipped and
/// completed files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub files_discovered: usize,
    pub files_skipped: usize,
    pub files_processed: usize,
    pub files_failed: usize,
    /// Completed files whose store lookup degraded.
    pub files_degraded: usize,
    pub chunks_reused: usize,
    pub chunks_embedded: usize,
    pub chunks_deleted: usize,
    pub total_chunks: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub stats: RunStats,
    pub files: Vec<FileReport>,
}

impl RunReport {
    fn record(&mut self, path: PathBuf, outcome: FileOutcome) {
        let stats = &mut self.stats;
        match &outcome {
            FileOutcome::Skipped { chunks } => {
                stats.files_skipped += 1;
                stats.total_chunks += chunks;
            }
            FileOutcome::Completed {
                chunks,
                reused,
                embedded,
                deleted,
                degraded,
            } => {
                stats.files_processed += 1;
                if *degraded {
                    stats.files_degraded += 1;
                }
                stats.chunks_reused += reused;
                stats.chunks_embedded += embedded;
                stats.chunks_deleted += deleted;
                stats.total_chunks += chunks;
            }
            FileOutcome::Failed { .. } => stats.files_failed += 1,
        }
        self.files.push(FileReport { path, outcome });
    }

    /// Reports of the files that failed.
    pub fn failures(&self) -> impl Iterator<Item = &FileReport> {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, FileOutcome::Failed { .. }))
    }

    /// Print the run summary to stdout.
    pub fn print_summary(&self) {
        let s = &self.stats;
        println!("sync");
        println!("  files discovered: {}", s.files_discovered);
        println!(
            "  files processed: {}/{}",
            s.files_processed,
            s.files_discovered - s.files_skipped
        );
        println!("  files skipped (unchanged): {}", s.files_skipped);
        if s.files_degraded > 0 {
            println!(
                "  files re-embedded after a failed store lookup: {}",
                s.files_degraded
            );
        }
        if s.files_failed > 0 {
            println!("  files failed: {}", s.files_failed);
            for failure in self.failures() {
                if let FileOutcome::Failed { stage, error } = &failure.outcome {
                    println!("    {} ({}): {}", failure.path.display(), stage, error);
                }
            }
        }
        println!("  total chunks: {}", s.total_chunks);
        println!("  new embeddings: {}", s.chunks_embedded);
        println!("  reused embeddings: {}", s.chunks_reused);
        println!("  deleted records: {}", s.chunks_deleted);
        println!("ok");
    }
}

type StageResult<T> = std::result::Result<T, (FileStage, anyhow::Error)>;

fn at<T>(stage: FileStage, result: Result<T>) -> StageResult<T> {
    result.map_err(|e| (stage, e))
}

/// Incremental sync pipeline.
///
/// Collaborators are injected at construction and live for the run.
pub struct Pipeline {
    chunker: Arc<dyn Chunker>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    cache: FileChangeCache,
    settings: PipelineSettings,
    options: PipelineOptions,
    progress: Box<dyn ProgressReporter>,
}

impl Pipeline {
    pub fn new(
        chunker: Arc<dyn Chunker>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        cache: FileChangeCache,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            chunker,
            embedder,
            store,
            cache,
            settings,
            options: PipelineOptions::default(),
            progress: Box::new(NoProgress),
        }
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn cache(&self) -> &FileChangeCache {
        &self.cache
    }

    /// Discover files under `inputs` and sync them.
    ///
    /// # Errors
    ///
    /// Fails if discovery is misconfigured or the store is unreachable at
    /// startup. Per-file failures are reported in the [`RunReport`].
    pub async fn run(&mut self, inputs: &[PathBuf]) -> Result<RunReport> {
        self.progress.report(ProgressEvent::Discovering {
            inputs: inputs.len(),
        });
        let files = discover_files(inputs, &self.settings.discovery)?;
        self.run_files(files).await
    }

    /// Sync an explicit list of files.
    pub async fn run_files(&mut self, files: Vec<PathBuf>) -> Result<RunReport> {
        let mut report = RunReport::default();
        report.stats.files_discovered = files.len();

        if files.is_empty() {
            tracing::warn!("no files to process");
            return Ok(report);
        }

        with_timeout(
            self.settings.store_timeout,
            "store heartbeat",
            self.store.heartbeat(),
        )
        .await
        .with_context(|| format!("Store '{}' is not reachable", self.store.name()))?;

        let total = files.len() as u64;
        for (i, path) in files.into_iter().enumerate() {
            self.progress.report(ProgressEvent::Processing {
                path: path.clone(),
                n: i as u64 + 1,
                total,
            });

            let outcome = match self.process_file(&path).await {
                Ok(outcome) => outcome,
                Err((stage, e)) => {
                    tracing::warn!(path = %path.display(), %stage, error = %format!("{:#}", e), "file failed");
                    FileOutcome::Failed {
                        stage,
                        error: format!("{:#}", e),
                    }
                }
            };
            report.record(path, outcome);
        }

        tracing::info!(
            processed = report.stats.files_processed,
            skipped = report.stats.files_skipped,
            failed = report.stats.files_failed,
            "sync run finished"
        );
        Ok(report)
    }

    async fn process_file(&mut self, path: &Path) -> StageResult<FileOutcome> {
        let file = at(FileStage::Load, SourceFile::read(path))?;
        let source = file.source_id();

        if !self.options.force && !self.cache.has_changed(&source, &file.fingerprint) {
            let chunks = self.cache.cached_chunk_count(&source).unwrap_or(0);
            tracing::debug!(path = %source, chunks, "unchanged, skipping");
            return Ok(FileOutcome::Skipped { chunks });
        }

        let chunks = at(
            FileStage::Chunk,
            self.chunker
                .split(&file.content, &source)
                .with_context(|| format!("Failed to chunk {}", path.display())),
        )?;
        let identified = identify(chunks, &source);

        let diff = DiffResolver::new(
            self.store.as_ref(),
            self.settings.lookup_batch_size,
            self.settings.store_timeout,
        )
        .resolve(&source, identified)
        .await;

        let texts: Vec<String> = diff
            .needs_embedding
            .iter()
            .map(|c| c.chunk.text.clone())
            .collect();
        let vectors = at(
            FileStage::Embed,
            embed_all(self.embedder.as_ref(), &texts, self.settings.embed_limits).await,
        )?;
        let fresh: Vec<EmbeddedChunk> = diff
            .needs_embedding
            .into_iter()
            .zip(vectors)
            .map(|(c, embedding)| EmbeddedChunk {
                id: c.id,
                chunk: c.chunk,
                embedding,
            })
            .collect();

        let reused = diff.reusable.len();
        let embedded = fresh.len();
        let degraded = diff.degraded;
        let outcome = at(
            FileStage::Reconcile,
            StoreReconciler::new(
                self.store.as_ref(),
                self.settings.write_batch_size,
                self.settings.store_timeout,
            )
            .reconcile(diff.reusable, fresh, &diff.stale_ids)
            .await,
        )?;

        let chunks = outcome.current_ids.len();
        at(
            FileStage::CacheUpdate,
            self.cache.record_success(&source, &file.fingerprint, chunks),
        )?;

        tracing::info!(
            path = %source,
            chunks,
            reused,
            embedded,
            stale = outcome.deleted,
            degraded,
            "file synced"
        );

        Ok(FileOutcome::Completed {
            chunks,
            reused,
            embedded,
            deleted: outcome.deleted,
            degraded,
        })
    }
}

/// One file as seen by a dry run.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedFile {
    pub path: PathBuf,
    pub changed: bool,
    pub estimated_chunks: usize,
}

/// Discover files and report which would be processed, without touching
/// the store or the embedder.
pub fn plan(
    inputs: &[PathBuf],
    discovery: &DiscoveryConfig,
    cache: &FileChangeCache,
    chunker: &dyn Chunker,
    options: PipelineOptions,
) -> Result<Vec<PlannedFile>> {
    let files = discover_files(inputs, discovery)?;
    let mut planned = Vec::with_capacity(files.len());
    for path in files {
        let file = match SourceFile::read(&path) {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %format!("{:#}", e), "cannot read file");
                continue;
            }
        };
        let source = file.source_id();
        let changed = options.force || cache.has_changed(&source, &file.fingerprint);
        let estimated_chunks = if changed {
            match chunker.split(&file.content, &source) {
                Ok(chunks) => chunks.len(),
                Err(e) => {
                    tracing::warn!(path = %source, error = %format!("{:#}", e), "cannot chunk file");
                    0
                }
            }
        } else {
            cache.cached_chunk_count(&source).unwrap_or(0)
        };
        planned.push(PlannedFile {
            path,
            changed,
            estimated_chunks,
        });
    }
    Ok(planned)
}

/// Print a dry-run plan to stdout.
pub fn print_plan(planned: &[PlannedFile]) {
    println!("sync (dry-run)");
    println!("  files found: {}", planned.len());
    for file in planned {
        let status = if file.changed { "changed" } else { "unchanged" };
        println!(
            "    {}  {}  ~{} chunks",
            file.path.display(),
            status,
            file.estimated_chunks
        );
    }
    let changed = planned.iter().filter(|f| f.changed).count();
    let chunks: usize = planned.iter().map(|f| f.estimated_chunks).sum();
    println!("  files to process: {}", changed);
    println!("  estimated chunks: {}", chunks);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_only_count_successful_chunks() {
        let mut report = RunReport::default();
        report.record(PathBuf::from("a"), FileOutcome::Skipped { chunks: 4 });
        report.record(
            PathBuf::from("b"),
            FileOutcome::Completed {
                chunks: 3,
                reused: 1,
                embedded: 2,
                deleted: 5,
                degraded: true,
            },
        );
        report.record(
            PathBuf::from("c"),
            FileOutcome::Failed {
                stage: FileStage::Embed,
                error: "boom".into(),
            },
        );

        assert_eq!(
            report.stats,
            RunStats {
                files_discovered: 0,
                files_skipped: 1,
                files_processed: 1,
                files_failed: 1,
                files_degraded: 1,
                chunks_reused: 1,
                chunks_embedded: 2,
                chunks_deleted: 5,
                total_chunks: 7,
            }
        );
        assert_eq!(report.failures().count(), 1);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(FileStage::CacheUpdate.to_string(), "cache update");
        assert_eq!(FileStage::Load.to_string(), "load");
        assert_eq!(FileStage::Chunk.to_string(), "chunk");
    }
}
