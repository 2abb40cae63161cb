//! End-to-end behavior of a watched policy file: debounced reloads, resilience
//! to bad content, and the admin write path racing with file edits.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rulegate_rules::cache::Cache;
use rulegate_rules::{BypassAction, Bypass, CommitOutcome, PolicyError, PolicyFile};
use tempfile::TempDir;

const DEBOUNCE: Duration = Duration::from_millis(150);

/// Long enough for the watcher to see an event and the debounce to fire.
async fn wait_for_reload() {
    tokio::time::sleep(DEBOUNCE * 4).await;
}

fn setup(name: &str, content: &str) -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    (dir, path)
}

fn bypasses(policy: &PolicyFile<Bypass>, path: &str) -> bool {
    policy.snapshot().unwrap().evaluate(path) == BypassAction::Bypass
}

/// Editors that save via temp file + rename.
fn replace_by_rename(path: &Path, content: &[u8]) {
    let tmp = path.with_extension("swp");
    fs::write(&tmp, content).unwrap();
    fs::rename(&tmp, path).unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn edit_is_picked_up_after_debounce() {
    let (_dir, path) = setup("bypass.conf", "/old\n");
    let policy = Arc::new(PolicyFile::<Bypass>::open(&path).unwrap());
    let mut watcher = policy.watch(DEBOUNCE).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    fs::write(&path, "/new\n").unwrap();
    // Still inside the quiet period.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(bypasses(&policy, "/old"));

    wait_for_reload().await;
    assert!(bypasses(&policy, "/new"));
    assert!(!bypasses(&policy, "/old"));

    watcher.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rename_into_place_is_picked_up() {
    let (_dir, path) = setup("bypass.conf", "/old\n");
    let policy = Arc::new(PolicyFile::<Bypass>::open(&path).unwrap());
    let mut watcher = policy.watch(DEBOUNCE).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    replace_by_rename(&path, b"/renamed\n");
    wait_for_reload().await;

    assert!(bypasses(&policy, "/renamed"));
    watcher.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn burst_of_writes_collapses_into_one_reload() {
    let (_dir, path) = setup("bypass.conf", "/v0\n");
    let policy = Arc::new(PolicyFile::<Bypass>::open(&path).unwrap());
    let mut watcher = policy.watch(DEBOUNCE).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let before = policy.reload_count();

    for i in 1..=10 {
        fs::write(&path, format!("/v{i}\n")).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    wait_for_reload().await;

    assert_eq!(policy.reload_count(), before + 1);
    assert!(bypasses(&policy, "/v10"));
    watcher.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreadable_content_keeps_last_good_rules() {
    let (_dir, path) = setup("bypass.conf", "/health\n");
    let policy = Arc::new(PolicyFile::<Bypass>::open(&path).unwrap());
    let mut watcher = policy.watch(DEBOUNCE).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    fs::write(&path, [0xc3, 0x28, b'\n']).unwrap();
    wait_for_reload().await;

    assert!(policy.failed_reload_count() >= 1);
    assert!(bypasses(&policy, "/health"));

    fs::write(&path, "/ready\n").unwrap();
    wait_for_reload().await;
    assert!(bypasses(&policy, "/ready"));

    watcher.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_cache_lines_are_skipped_on_reload() {
    let (_dir, path) = setup("cache.conf", "ALLOW prefix=/static/\n");
    let policy = Arc::new(PolicyFile::<Cache>::open(&path).unwrap());
    let mut watcher = policy.watch(DEBOUNCE).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    fs::write(&path, "MAYBE prefix=/x\nALLOW regex=([\nALLOW prefix=/img/ ttl=60\n").unwrap();
    wait_for_reload().await;

    let rs = policy.snapshot().unwrap();
    assert_eq!(rs.len(), 2);
    assert!(!rs.evaluate("GET", "/static/app.js").cacheable);
    let decision = rs.evaluate("GET", "/img/logo.png");
    assert!(decision.cacheable);
    assert_eq!(decision.rule.unwrap().ttl, 60);

    watcher.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn commit_reloads_immediately_and_watcher_settles() {
    let (dir, path) = setup("bypass.conf", "/a\n");
    let policy = Arc::new(PolicyFile::<Bypass>::open(&path).unwrap());
    let mut watcher = policy.watch(DEBOUNCE).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let e1 = policy.read_raw().unwrap().etag;
    let outcome = policy.commit("/a\n/b\n", Some(&e1)).unwrap();
    let e2 = match outcome {
        CommitOutcome::Committed { etag, .. } => etag,
        other => panic!("expected commit, got {other:?}"),
    };
    // Visible before the watcher catches up.
    assert!(bypasses(&policy, "/b"));

    let stale = policy.commit("/c\n", Some(&e1)).unwrap();
    assert_eq!(stale, CommitOutcome::Conflict { current_etag: e2.clone() });

    wait_for_reload().await;
    assert!(bypasses(&policy, "/b"));
    assert_eq!(policy.read_raw().unwrap().etag, e2);

    let backups = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".bak"))
        .count();
    assert_eq!(backups, 1);

    watcher.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn external_edit_invalidates_admin_etag() {
    let (_dir, path) = setup("cache.conf", "ALLOW prefix=/\n");
    let policy = PolicyFile::<Cache>::open(&path).unwrap();

    let seen = policy.read_raw().unwrap().etag;
    fs::write(&path, "DENY prefix=/\n").unwrap();

    match policy.commit("ALLOW prefix=/a/\n", Some(&seen)).unwrap() {
        CommitOutcome::Conflict { current_etag } => {
            assert_eq!(current_etag, policy.read_raw().unwrap().etag);
        }
        other => panic!("expected conflict, got {other:?}"),
    }
    assert_eq!(fs::read_to_string(&path).unwrap(), "DENY prefix=/\n");
}

#[test]
fn invalid_admin_content_is_rejected_before_precondition() {
    let (_dir, path) = setup("cache.conf", "ALLOW prefix=/\n");
    let policy = PolicyFile::<Cache>::open(&path).unwrap();

    let err = policy
        .commit("ALLOW prefix=/a/ ttl=-5\n", Some("W/\"sha256:stale\""))
        .unwrap_err();
    match err {
        PolicyError::Invalid(report) => {
            assert!(!report.ok);
            assert_eq!(report.messages, vec!["line 1: ttl must be >= 0".to_string()]);
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}
