//! File-backed request policies with hot reload.
//!
//! This crate provides:
//! - Line-oriented grammars for bypass rules and cache rules
//! - A lock-free store holding the currently published ruleset
//! - Debounced filesystem watching with `notify`
//! - Atomic writes with timestamped backups
//! - Content fingerprints for optimistic concurrency on admin writes
//! - Strict validation reports for candidate content

pub mod bypass;
pub mod cache;
pub mod error;
pub mod etag;
pub mod grammar;
pub mod persist;
pub mod policy;
pub mod store;
pub mod validation;
pub mod watcher;

pub use bypass::{Bypass, BypassAction, BypassEntry, BypassRuleset};
pub use cache::{Cache, CacheDecision, CacheRule, CacheRuleset, Disposition, PathMatcher};
pub use error::{PolicyError, Result};
pub use grammar::{Grammar, Ruleset};
pub use policy::{CommitOutcome, PolicyFile, RawPolicy};
pub use store::RuleStore;
pub use validation::ValidationReport;
pub use watcher::{PolicyWatcher, DEFAULT_DEBOUNCE};
