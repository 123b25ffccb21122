//! Sync progress reporting.
//!
//! Reports observable progress during `csync sync` so users see which file
//! is being processed and how many are left. Progress is emitted on
//! **stderr** so the stdout summary stays parseable for scripts.

use std::io::Write;
use std::path::PathBuf;

/// A single progress event for a sync run.
#[derive(Clone, Debug, PartialEq)]
pub enum ProgressEvent {
    /// Walking the inputs. Total unknown.
    Discovering { inputs: usize },
    /// File `n` of `total` is being checked and, if changed, processed.
    Processing { path: PathBuf, n: u64, total: u64 },
}

/// Reports sync progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the pipeline.
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "sync  processing  12 / 1,500  docs/a.md".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Discovering { inputs } => {
                format!("sync  discovering files in {} input(s)...\n", inputs)
            }
            ProgressEvent::Processing { path, n, total } => format!(
                "sync  processing  {} / {}  {}\n",
                format_number(*n),
                format_number(*total),
                path.display()
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Discovering { inputs } => serde_json::json!({
                "event": "progress",
                "phase": "discovering",
                "inputs": inputs
            }),
            ProgressEvent::Processing { path, n, total } => serde_json::json!({
                "event": "progress",
                "phase": "processing",
                "path": path.to_string_lossy(),
                "n": n,
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
