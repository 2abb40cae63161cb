//! Bypass policy: which requests skip inspection entirely.
//!
//! One rule per line: a path, optionally followed by a rule-file reference
//! (`rules/...` or `*.conf`). A plain path means "skip inspection"; a path
//! with a reference means "skip default inspection, apply this rule file
//! instead". A path ending in `/` also matches everything below it.
//!
//! ```text
//! /healthz
//! /static/
//! /api/upload rules/upload-relaxed.conf
//! ```

mod normalize;


use serde::Serialize;

use crate::grammar::{Grammar, Line, Ruleset};
use crate::validation::ValidationReport;

pub use normalize::{decode_path, eq_loosely, normalize};

/// Grammar marker for bypass policy files.
#[derive(Debug, Clone, Copy)]
pub struct Bypass;

pub type BypassRuleset = Ruleset<Bypass>;

/// One bypass rule line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BypassEntry {
    /// Path as written in the file.
    pub path: String,
    /// Rule file to apply instead of default inspection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_rule: Option<String>,
    #[serde(skip)]
    normalized: String,
}

impl BypassEntry {
    pub fn new(path: impl Into<String>, extra_rule: Option<String>) -> Self {
        let path = path.into();
        let normalized = normalize(&path);
        Self {
            path,
            extra_rule,
            normalized,
        }
    }

    /// True when the raw path ends in `/`, making this a prefix rule.
    pub fn is_prefix(&self) -> bool {
        self.path.ends_with('/')
    }

    /// Match against an already-normalized request path.
    fn matches(&self, request: &str) -> bool {
        eq_loosely(request, &self.normalized)
            || (self.is_prefix() && request.starts_with(&self.normalized))
    }

    fn action(&self) -> BypassAction {
        match &self.extra_rule {
            Some(rule) => BypassAction::Rule(rule.clone()),
            None => BypassAction::Bypass,
        }
    }
}

/// What the request path should do with inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BypassAction {
    /// No rule matched: run default inspection.
    None,
    /// Skip inspection entirely.
    Bypass,
    /// Skip default inspection and apply the referenced rule file.
    Rule(String),
}

fn is_rule_reference(token: &str) -> bool {
    token.starts_with("rules/") || token.ends_with(".conf")
}

impl Grammar for Bypass {
    type Rule = BypassEntry;

    const NAME: &'static str = "bypass";

    fn parse_line(line: &Line<'_>) -> Option<BypassEntry> {
        let path = line.tokens.first()?;
        let extra_rule = line
            .args()
            .iter()
            .find(|token| is_rule_reference(token))
            .map(|token| token.to_string());
        Some(BypassEntry::new(*path, extra_rule))
    }

    fn validate(text: &str) -> ValidationReport {
        let mut report = ValidationReport::new();
        for line in crate::grammar::lines(text) {
            let path = line.keyword();
            if urlencoding::decode(path).is_err() {
                report.error(line.location(), format!("path {:?} has invalid percent-encoding", path));
            }
            let references = line
                .args()
                .iter()
                .filter(|token| is_rule_reference(token))
                .count();
            if references > 1 {
                report.error(
                    line.location(),
                    "more than one rule file reference (only the first would apply)",
                );
            }
        }
        report
    }

    fn render_line(rule: &BypassEntry) -> String {
        match &rule.extra_rule {
            Some(extra) => format!("{} {}", rule.path, extra),
            None => rule.path.clone(),
        }
    }
}

impl Ruleset<Bypass> {
    /// Decide what to do with a request path. First matching rule wins.
    ///
    /// Bypass rules are path-only; the method plays no part.
    pub fn evaluate(&self, request_path: &str) -> BypassAction {
        let request = normalize(request_path);
        self.rules()
            .iter()
            .find(|entry| entry.matches(&request))
            .map(BypassEntry::action)
            .unwrap_or(BypassAction::None)
    }
}
