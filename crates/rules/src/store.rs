//! Lock-free handle to the currently published ruleset.

use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::grammar::{Grammar, Ruleset};

/// Holds at most one published [`Ruleset`].
///
/// Readers take an `Arc` snapshot without locking; a publish is a single
/// pointer swap. Snapshots already handed out stay valid and unchanged.
pub struct RuleStore<G: Grammar> {
    current: ArcSwapOption<Ruleset<G>>,
}

impl<G: Grammar> RuleStore<G> {
    pub fn new() -> Self {
        Self {
            current: ArcSwapOption::empty(),
        }
    }

    /// Latest published ruleset, or `None` before the first load.
    pub fn get(&self) -> Option<Arc<Ruleset<G>>> {
        self.current.load_full()
    }

    /// Atomically replace the published ruleset.
    pub fn publish(&self, ruleset: Ruleset<G>) {
        self.current.store(Some(Arc::new(ruleset)));
    }

    /// Rule count of the published ruleset (0 before the first load).
    pub fn len(&self) -> usize {
        match &*self.current.load() {
            Some(rs) => rs.len(),
            None => 0,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.current.load().is_some()
    }
}

impl<G: Grammar> Default for RuleStore<G> {
    fn default() -> Self {
        Self::new()
    }
}
