//! Filesystem discovery of candidate source files.
//!
//! Inputs may be files or directories. A file input is kept when its
//! extension is on the allow-list. A directory input is walked with
//! `walkdir`: one level deep unless `recursive` is set, in which case
//! files up to `max_depth` directory levels below it are kept.
//!
//! Exclude globs are matched against the path relative to the directory
//! being walked. `.git`, `target`, and `node_modules` trees are always
//! excluded.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::config::DiscoveryConfig;

const DEFAULT_EXCLUDES: [&str; 3] = ["**/.git/**", "**/target/**", "**/node_modules/**"];

/// Discover candidate files under `inputs`.
///
/// The result is de-duplicated and sorted. Inputs that do not exist or
/// cannot be read are logged and skipped.
///
/// # Errors
///
/// Returns an error only if an exclude glob is invalid.
pub fn discover_files(inputs: &[PathBuf], config: &DiscoveryConfig) -> Result<Vec<PathBuf>> {
    let mut patterns: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
    patterns.extend(config.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&patterns)?;

    let extensions: Vec<String> = config
        .extensions
        .iter()
        .map(|e| normalize_extension(e))
        .collect();

    let mut found = BTreeSet::new();
    for input in inputs {
        let meta = match std::fs::metadata(input) {
            Ok(meta) => meta,
            Err(e) => {
                tracing::warn!(path = %input.display(), error = %e, "cannot read input, skipping");
                continue;
            }
        };

        if meta.is_file() {
            if has_allowed_extension(input, &extensions) {
                found.insert(input.clone());
            }
        } else if meta.is_dir() {
            scan_dir(input, config, &extensions, &exclude_set, &mut found);
        }
    }

    Ok(found.into_iter().collect())
}

fn scan_dir(
    root: &Path,
    config: &DiscoveryConfig,
    extensions: &[String],
    exclude_set: &GlobSet,
    found: &mut BTreeSet<PathBuf>,
) {
    let max_depth = if config.recursive {
        config.max_depth
    } else {
        config.max_depth.min(1)
    };

    for entry in WalkDir::new(root).max_depth(max_depth) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(root = %root.display(), error = %e, "error while scanning, skipping entry");
                continue;
            }
        };

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        if exclude_set.is_match(relative) {
            continue;
        }

        if entry.file_type().is_dir() {
            if config.recursive && entry.depth() > 0 && entry.depth() == max_depth {
                tracing::debug!(path = %path.display(), max_depth, "max depth reached, not scanning");
            }
            continue;
        }

        if entry.file_type().is_file() && has_allowed_extension(path, extensions) {
            found.insert(path.to_path_buf());
        }
    }
}

fn normalize_extension(ext: &str) -> String {
    ext.trim_start_matches('.').to_lowercase()
}

fn has_allowed_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .is_some_and(|e| extensions.iter().any(|allowed| *allowed == e))
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
