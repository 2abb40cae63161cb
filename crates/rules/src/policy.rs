//! [`PolicyFile`]: one backing file, its published ruleset, and the admin
//! write path.
//!
//! Startup, the watcher and admin commits all go through [`PolicyFile::reload`],
//! so there is exactly one way a ruleset gets published.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::cache::{from_dto, render_file, Cache, RuleDto};
use crate::error::{PolicyError, Result};
use crate::etag::{check_precondition, fingerprint};
use crate::grammar::{load, Grammar, Ruleset};
use crate::persist::write_with_backup;
use crate::store::RuleStore;
use crate::validation::ValidationReport;
use crate::watcher::PolicyWatcher;

/// Raw file content as last written, with its fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPolicy {
    pub raw: String,
    pub etag: String,
}

/// Result of an admin write that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Written and reloaded.
    Committed { etag: String, rules: usize },
    /// The file changed since the caller read it; nothing was written.
    Conflict { current_etag: String },
}

/// A file-backed policy of grammar `G`.
pub struct PolicyFile<G: Grammar> {
    path: PathBuf,
    store: RuleStore<G>,
    reloads: AtomicU64,
    failed_reloads: AtomicU64,
}

impl<G: Grammar> fmt::Debug for PolicyFile<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyFile")
            .field("grammar", &G::NAME)
            .field("path", &self.path)
            .field("rules", &self.store.len())
            .field("reloads", &self.reload_count())
            .field("failed_reloads", &self.failed_reload_count())
            .finish()
    }
}

impl<G: Grammar> PolicyFile<G> {
    /// A policy with nothing published yet. Call [`reload`](Self::reload) to load.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            store: RuleStore::new(),
            reloads: AtomicU64::new(0),
            failed_reloads: AtomicU64::new(0),
        }
    }

    /// Create the policy and perform the initial load.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let policy = Self::new(path);
        policy.reload()?;
        Ok(policy)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn store(&self) -> &RuleStore<G> {
        &self.store
    }

    /// Current published ruleset, lock-free.
    pub fn snapshot(&self) -> Option<Arc<Ruleset<G>>> {
        self.store.get()
    }

    /// Re-read and publish the backing file. On failure the previously
    /// published ruleset stays live.
    pub fn reload(&self) -> Result<usize> {
        match load::<G>(&self.path) {
            Ok(ruleset) => {
                let count = ruleset.len();
                self.store.publish(ruleset);
                self.reloads.fetch_add(1, Ordering::SeqCst);
                info!(grammar = G::NAME, path = %self.path.display(), rules = count, "loaded policy");
                Ok(count)
            }
            Err(e) => {
                self.failed_reloads.fetch_add(1, Ordering::SeqCst);
                warn!(
                    grammar = G::NAME,
                    path = %self.path.display(),
                    error = %e,
                    "failed to reload policy, keeping previous rules"
                );
                Err(e)
            }
        }
    }

    /// Number of successful loads so far.
    pub fn reload_count(&self) -> u64 {
        self.reloads.load(Ordering::SeqCst)
    }

    pub fn failed_reload_count(&self) -> u64 {
        self.failed_reloads.load(Ordering::SeqCst)
    }

    /// Read the file as it is on disk now. A missing file reads as empty.
    pub fn read_raw(&self) -> Result<RawPolicy> {
        let bytes = self.read_bytes()?;
        Ok(RawPolicy {
            etag: fingerprint(&bytes),
            raw: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }

    /// Strictly check candidate content. Touches neither the store nor the file.
    pub fn validate(&self, content: &str) -> ValidationReport {
        G::validate(content)
    }

    /// Validate, check the `If-Match` precondition, write atomically with a
    /// backup, then reload.
    pub fn commit(&self, content: &str, if_match: Option<&str>) -> Result<CommitOutcome> {
        let report = G::validate(content);
        if !report.is_ok() {
            return Err(PolicyError::Invalid(report));
        }
        self.commit_bytes(content.as_bytes(), if_match)
    }

    fn commit_bytes(&self, bytes: &[u8], if_match: Option<&str>) -> Result<CommitOutcome> {
        let current = self.read_bytes()?;
        if let Err(conflict) = check_precondition(&current, if_match) {
            info!(
                grammar = G::NAME,
                path = %self.path.display(),
                current_etag = %conflict.current_etag,
                "rejected policy write with stale precondition"
            );
            return Ok(CommitOutcome::Conflict {
                current_etag: conflict.current_etag,
            });
        }

        write_with_backup(&self.path, bytes)?;
        let etag = fingerprint(bytes);
        info!(grammar = G::NAME, path = %self.path.display(), etag = %etag, "committed policy");

        // The write succeeded; a failed reload is already logged and the
        // watcher will retry on the rename event.
        let rules = self.reload().unwrap_or_else(|_| self.store.len());
        Ok(CommitOutcome::Committed { etag, rules })
    }

    fn read_bytes(&self) -> Result<Vec<u8>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Hot-reload this policy whenever its file changes.
    pub fn watch(self: &Arc<Self>, debounce: Duration) -> Result<PolicyWatcher> {
        let policy = Arc::clone(self);
        PolicyWatcher::spawn(&self.path, debounce, move || {
            let _ = policy.reload();
        })
    }
}

impl PolicyFile<Cache> {
    /// Commit structured rules, rendering them into the file format.
    pub fn commit_rules(&self, rules: &[RuleDto], if_match: Option<&str>) -> Result<CommitOutcome> {
        let ruleset = from_dto(rules).map_err(PolicyError::Invalid)?;
        let content = render_file(&ruleset);
        // What reaches the file must parse back to what was checked.
        let report = Cache::validate(&content);
        if !report.is_ok() {
            return Err(PolicyError::Invalid(report));
        }
        self.commit_bytes(content.as_bytes(), if_match)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::bypass::{Bypass, BypassAction};
    use crate::cache::MatchDto;

    fn bypass_policy(content: &str) -> (TempDir, PolicyFile<Bypass>) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bypass.conf");
        fs::write(&path, content).unwrap();
        let policy = PolicyFile::open(path).unwrap();
        (dir, policy)
    }

    #[test]
    fn open_fails_on_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = PolicyFile::<Bypass>::open(dir.path().join("missing.conf")).unwrap_err();
        assert!(matches!(err, PolicyError::Io(_)));

        let policy = PolicyFile::<Bypass>::new(dir.path().join("missing.conf"));
        let debug = format!("{policy:?}");
        assert!(debug.contains("grammar: \"bypass\""), "{debug}");
        assert!(debug.contains("reloads: 0"), "{debug}");
    }

    #[test]
    fn failed_reload_keeps_previous_rules() {
        let (dir, policy) = bypass_policy("/health\n");
        assert_eq!(policy.reload_count(), 1);

        fs::write(dir.path().join("bypass.conf"), [0xff, 0xfe, 0x00]).unwrap();
        assert!(policy.reload().is_err());

        assert_eq!(policy.failed_reload_count(), 1);
        let rs = policy.snapshot().unwrap();
        assert_eq!(rs.evaluate("/health"), BypassAction::Bypass);
    }

    #[test]
    fn read_raw_of_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let policy = PolicyFile::<Bypass>::new(dir.path().join("bypass.conf"));
        let raw = policy.read_raw().unwrap();
        assert_eq!(raw.raw, "");
        assert_eq!(raw.etag, fingerprint(b""));
    }

    #[test]
    fn commit_with_current_etag_succeeds_then_stale_etag_conflicts() {
        let (_dir, policy) = bypass_policy("/a\n");
        let e1 = policy.read_raw().unwrap().etag;

        let first = policy.commit("/a\n/b\n", Some(&e1)).unwrap();
        let e2 = match first {
            CommitOutcome::Committed { etag, rules } => {
                assert_eq!(rules, 2);
                etag
            }
            other => panic!("expected commit, got {other:?}"),
        };
        assert_ne!(e1, e2);
        assert_eq!(policy.read_raw().unwrap().etag, e2);

        let second = policy.commit("/c\n", Some(&e1)).unwrap();
        assert_eq!(second, CommitOutcome::Conflict { current_etag: e2 });
        assert_eq!(policy.read_raw().unwrap().raw, "/a\n/b\n");
    }

    #[test]
    fn commit_without_precondition_always_writes() {
        let (_dir, policy) = bypass_policy("/a\n");
        let outcome = policy.commit("/z\n", None).unwrap();
        assert!(matches!(outcome, CommitOutcome::Committed { rules: 1, .. }));
        assert_eq!(policy.snapshot().unwrap().evaluate("/z"), BypassAction::Bypass);
    }

    #[test]
    fn invalid_commit_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.conf");
        fs::write(&path, "ALLOW prefix=/\n").unwrap();
        let policy = PolicyFile::<Cache>::open(&path).unwrap();

        let err = policy.commit("ALLOW methods=POST\n", None).unwrap_err();
        match err {
            PolicyError::Invalid(report) => assert_eq!(report.messages.len(), 2),
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(fs::read_to_string(&path).unwrap(), "ALLOW prefix=/\n");
        assert_eq!(policy.reload_count(), 1);
    }

    #[test]
    fn validate_has_no_side_effects() {
        let (dir, policy) = bypass_policy("/a\n");
        let report = policy.validate("/b\n");
        assert!(report.is_ok());
        assert_eq!(policy.reload_count(), 1);
        assert_eq!(fs::read_to_string(dir.path().join("bypass.conf")).unwrap(), "/a\n");
    }

    #[test]
    fn commit_rules_renders_structured_rules() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.conf");
        let policy = PolicyFile::<Cache>::new(&path);

        let rules = vec![RuleDto {
            kind: "ALLOW".to_string(),
            matcher: MatchDto {
                kind: "prefix".to_string(),
                value: "/static/".to_string(),
            },
            methods: vec!["get".to_string()],
            ttl: Some(60),
            vary: vec!["Accept-Encoding".to_string()],
        }];
        let outcome = policy.commit_rules(&rules, None).unwrap();
        assert!(matches!(outcome, CommitOutcome::Committed { rules: 1, .. }));

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("# cache.conf"));
        assert!(written.contains("ALLOW prefix=/static/ methods=GET ttl=60 vary=Accept-Encoding"));

        let decision = policy.snapshot().unwrap().evaluate("GET", "/static/app.js").cacheable;
        assert!(decision);
    }
}
