use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use context_sync::cache::FileChangeCache;
use context_sync::identity::fingerprint;
use context_sync::models::source_id;
use tempfile::TempDir;

fn csync_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("csync");
    path
}

struct TestEnv {
    _tmp: TempDir,
    root: PathBuf,
    config_path: PathBuf,
}

impl TestEnv {
    fn files_dir(&self) -> PathBuf {
        self.root.join("files")
    }
    fn cache_path(&self) -> PathBuf {
        self.root.join("data/.file_cache.json")
    }
    fn store_path(&self) -> PathBuf {
        self.root.join("data/store.sqlite")
    }
}

fn setup_test_env() -> TestEnv {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(files_dir.join("nested")).unwrap();
    fs::write(
        files_dir.join("alpha.md"),
        "# Alpha Document\n\nThis is the alpha document about Rust programming.\n\nIt contains information about cargo and crates.",
    )
    .unwrap();
    fs::write(
        files_dir.join("beta.md"),
        "# Beta Document\n\nThis document discusses Python and machine learning.",
    )
    .unwrap();
    fs::write(
        files_dir.join("gamma.txt"),
        "Gamma plain text file.\n\nContains notes about deployment and infrastructure.",
    )
    .unwrap();
    fs::write(files_dir.join("ignored.rs"), "fn main() {}").unwrap();
    fs::write(files_dir.join("nested/delta.md"), "Delta lives one level down.").unwrap();

    let config_content = format!(
        r#"[cache]
path = "{root}/data/.file_cache.json"

[discovery]
extensions = [".md", ".txt"]

[chunking]
chunk_size = 50
chunk_overlap = 10

[embedding]
provider = "disabled"

[store]
backend = "sqlite"
path = "{root}/data/store.sqlite"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("csync.toml");
    fs::write(&config_path, config_content).unwrap();

    TestEnv {
        _tmp: tmp,
        root,
        config_path,
    }
}

fn run_csync(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = csync_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run csync binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_store() {
    let env = setup_test_env();

    let (stdout, stderr, success) = run_csync(&env.config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(env.store_path().exists());
}

#[test]
fn test_init_idempotent() {
    let env = setup_test_env();

    let (_, _, success1) = run_csync(&env.config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_csync(&env.config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_inspect_empty_store() {
    let env = setup_test_env();
    run_csync(&env.config_path, &["init"]);

    let (stdout, stderr, success) = run_csync(&env.config_path, &["inspect"]);
    assert!(success, "inspect failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Store (sqlite)"));
    assert!(stdout.contains("total records: 0"));
}

#[test]
fn test_dry_run_lists_files() {
    let env = setup_test_env();
    let files = env.files_dir();

    let (stdout, stderr, success) = run_csync(
        &env.config_path,
        &["sync", files.to_str().unwrap(), "--dry-run"],
    );
    assert!(success, "dry-run failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("files found: 3"), "stdout={}", stdout);
    assert!(stdout.contains("files to process: 3"));
    assert!(stdout.contains("alpha.md"));
    assert!(!stdout.contains("ignored.rs"));
    assert!(!stdout.contains("delta.md"));

    // Dry run must not create the store or the cache.
    assert!(!env.store_path().exists());
    assert!(!env.cache_path().exists());
}

#[test]
fn test_dry_run_recursive() {
    let env = setup_test_env();
    let files = env.files_dir();

    let (stdout, _, success) = run_csync(
        &env.config_path,
        &["sync", files.to_str().unwrap(), "--dry-run", "--recursive"],
    );
    assert!(success);
    assert!(stdout.contains("files found: 4"), "stdout={}", stdout);
    assert!(stdout.contains("delta.md"));
}

#[test]
fn test_dry_run_respects_cache() {
    let env = setup_test_env();
    let alpha = env.files_dir().join("alpha.md");
    let content = fs::read_to_string(&alpha).unwrap();

    let mut cache = FileChangeCache::load(&env.cache_path());
    cache
        .record_success(&source_id(&alpha), &fingerprint(&content), 7)
        .unwrap();

    let files = env.files_dir();
    let (stdout, _, success) = run_csync(
        &env.config_path,
        &["sync", files.to_str().unwrap(), "--dry-run"],
    );
    assert!(success);
    assert!(stdout.contains("unchanged"), "stdout={}", stdout);
    assert!(stdout.contains("files to process: 2"));

    let (stdout, _, success) = run_csync(
        &env.config_path,
        &["sync", files.to_str().unwrap(), "--dry-run", "--full"],
    );
    assert!(success);
    assert!(stdout.contains("files to process: 3"), "stdout={}", stdout);
}

#[test]
fn test_cache_list_and_clear() {
    let env = setup_test_env();
    let alpha = env.files_dir().join("alpha.md");

    let mut cache = FileChangeCache::load(&env.cache_path());
    cache.record_success(&source_id(&alpha), "abc123", 3).unwrap();

    let (stdout, stderr, success) = run_csync(&env.config_path, &["cache", "list"]);
    assert!(success, "cache list failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("entries: 1"));
    assert!(stdout.contains("alpha.md"));
    assert!(stdout.contains("3 chunks"));

    let (stdout, _, success) = run_csync(&env.config_path, &["cache", "clear"]);
    assert!(success);
    assert!(stdout.contains("Cleared 1 cache entries."));
    assert!(!env.cache_path().exists());

    let (stdout, _, success) = run_csync(&env.config_path, &["cache", "list"]);
    assert!(success);
    assert!(stdout.contains("entries: 0"));
}

#[test]
fn test_cache_forget_single_entry() {
    let env = setup_test_env();
    let alpha = env.files_dir().join("alpha.md");
    let beta = env.files_dir().join("beta.md");

    let mut cache = FileChangeCache::load(&env.cache_path());
    cache.record_success(&source_id(&alpha), "abc123", 3).unwrap();
    cache.record_success(&source_id(&beta), "def456", 1).unwrap();

    let (stdout, stderr, success) =
        run_csync(&env.config_path, &["cache", "forget", alpha.to_str().unwrap()]);
    assert!(success, "cache forget failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Forgot"), "stdout={}", stdout);

    let cache = FileChangeCache::load(&env.cache_path());
    assert!(cache.get(&source_id(&alpha)).is_none());
    assert!(cache.get(&source_id(&beta)).is_some());

    let (stdout, _, success) =
        run_csync(&env.config_path, &["cache", "forget", alpha.to_str().unwrap()]);
    assert!(success);
    assert!(stdout.contains("No cache entry"), "stdout={}", stdout);
}

#[test]
fn test_sync_rejects_memory_backend() {
    let env = setup_test_env();
    let config = fs::read_to_string(&env.config_path)
        .unwrap()
        .replace("backend = \"sqlite\"", "backend = \"memory\"");
    fs::write(&env.config_path, config).unwrap();

    let files = env.files_dir();
    let (_, stderr, success) = run_csync(&env.config_path, &["sync", files.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("keeps nothing between runs"), "stderr={}", stderr);
    assert!(!env.cache_path().exists());
}

#[test]
fn test_corrupt_cache_is_not_fatal() {
    let env = setup_test_env();
    fs::create_dir_all(env.cache_path().parent().unwrap()).unwrap();
    fs::write(env.cache_path(), "{ not json").unwrap();

    let files = env.files_dir();
    let (stdout, stderr, success) = run_csync(
        &env.config_path,
        &["sync", files.to_str().unwrap(), "--dry-run"],
    );
    assert!(success, "stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("files to process: 3"));
}

#[test]
fn test_sync_requires_embedding_provider() {
    let env = setup_test_env();
    let files = env.files_dir();

    let (_, stderr, success) = run_csync(&env.config_path, &["sync", files.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("No embedding provider configured"), "stderr={}", stderr);
    assert!(!env.cache_path().exists());
}

#[test]
fn test_sync_requires_paths() {
    let env = setup_test_env();
    let (_, _, success) = run_csync(&env.config_path, &["sync"]);
    assert!(!success);
}

#[test]
fn test_invalid_config_rejected() {
    let env = setup_test_env();
    fs::write(
        &env.config_path,
        "[chunking]\nchunk_size = 10\nchunk_overlap = 20\n",
    )
    .unwrap();

    let (_, stderr, success) = run_csync(&env.config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("chunk_overlap"), "stderr={}", stderr);
}
