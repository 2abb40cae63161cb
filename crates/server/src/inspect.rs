//! Boundary to the request-inspection engine.
//!
//! The gate hands the engine request metadata and gets back a verdict. The
//! engine itself is opaque here; [`PassThrough`] is the shipped default.

use axum::http::{HeaderMap, Method, Uri};

/// What the inspector gets to see about an inbound request.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub request_id: String,
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    /// Extra rule file selected by a bypass entry, applied instead of the
    /// default rule set.
    pub extra_rule: Option<String>,
}

impl RequestMeta {
    pub fn path(&self) -> &str {
        self.uri.path()
    }
}

/// Outcome of inspecting one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Verdict {
    pub blocked: bool,
    /// Identifiers of every rule that matched, blocking or not.
    pub rule_ids: Vec<String>,
}

impl Verdict {
    pub fn allow() -> Self {
        Self::default()
    }

    pub fn block(rule_ids: Vec<String>) -> Self {
        Self {
            blocked: true,
            rule_ids,
        }
    }

    pub fn is_hit(&self) -> bool {
        !self.rule_ids.is_empty()
    }

    /// Rule ids deduplicated in first-seen order, comma separated.
    pub fn rule_id_header(&self) -> String {
        let mut seen: Vec<&str> = Vec::with_capacity(self.rule_ids.len());
        for id in &self.rule_ids {
            if !seen.contains(&id.as_str()) {
                seen.push(id);
            }
        }
        seen.join(",")
    }
}

/// A request-inspection engine.
pub trait Inspector: Send + Sync + 'static {
    fn inspect(&self, request: &RequestMeta) -> Verdict;
}

/// Never blocks and never matches.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl Inspector for PassThrough {
    fn inspect(&self, _request: &RequestMeta) -> Verdict {
        Verdict::allow()
    }
}
