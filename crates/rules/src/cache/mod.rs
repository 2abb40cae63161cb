//! Cache policy: which GET/HEAD responses may be cached, for how long, and
//! with which `Vary` headers.
//!
//! ```text
//! DENY  prefix=/api/private
//! ALLOW prefix=/static/ methods=GET,HEAD ttl=3600 vary=Accept-Encoding
//! ALLOW regex=^/img/.*\.png$ ttl=86400
//! ```
//!
//! The first token is the disposition; options may appear in any order.
//! Exactly one of `exact=`, `prefix=` or `regex=` selects the path.

mod dto;


use std::collections::BTreeSet;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::grammar::{lines, split_list, Grammar, Line, Ruleset};
use crate::validation::ValidationReport;

pub use dto::{from_dto, render_file, to_dto, MatchDto, RuleDto, FILE_HEADER};

/// TTL applied when a rule does not give one.
pub const DEFAULT_TTL: u64 = 600;

/// Methods a cache rule may name.
pub const SUPPORTED_METHODS: [&str; 2] = ["GET", "HEAD"];

/// Grammar marker for cache policy files.
#[derive(Debug, Clone, Copy)]
pub struct Cache;

pub type CacheRuleset = Ruleset<Cache>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Disposition {
    Allow,
    Deny,
}

impl Disposition {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ALLOW" => Some(Self::Allow),
            "DENY" => Some(Self::Deny),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "ALLOW",
            Self::Deny => "DENY",
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a rule selects request paths.
#[derive(Debug, Clone)]
pub enum PathMatcher {
    Exact(String),
    Prefix(String),
    Regex(Regex),
}

impl PathMatcher {
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Exact(value) => path == value,
            Self::Prefix(value) => path.starts_with(value.as_str()),
            Self::Regex(re) => re.is_match(path),
        }
    }

    /// Option key this matcher is written with.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Exact(_) => "exact",
            Self::Prefix(_) => "prefix",
            Self::Regex(_) => "regex",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Self::Exact(value) | Self::Prefix(value) => value,
            Self::Regex(re) => re.as_str(),
        }
    }
}

impl PartialEq for PathMatcher {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key() && self.value() == other.value()
    }
}

/// One cache rule line.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRule {
    pub disposition: Disposition,
    /// `None` only when lenient loading could not build a matcher; such a
    /// rule never matches.
    pub matcher: Option<PathMatcher>,
    /// Upper-cased methods. Empty means any method.
    pub methods: BTreeSet<String>,
    pub ttl: u64,
    pub vary: Vec<String>,
}

impl CacheRule {
    pub fn new(disposition: Disposition, matcher: PathMatcher) -> Self {
        Self {
            disposition,
            matcher: Some(matcher),
            methods: BTreeSet::new(),
            ttl: DEFAULT_TTL,
            vary: Vec::new(),
        }
    }

    /// `method` must already be upper-cased.
    fn matches(&self, method: &str, path: &str) -> bool {
        if !self.methods.is_empty() && !self.methods.contains(method) {
            return false;
        }
        self.matcher
            .as_ref()
            .map(|m| m.matches(path))
            .unwrap_or(false)
    }
}

/// Outcome of evaluating a response against the cache ruleset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheDecision<'a> {
    /// The rule that decided, if any.
    pub rule: Option<&'a CacheRule>,
    pub cacheable: bool,
}

impl Ruleset<Cache> {
    /// First matching rule decides. `DENY` stops evaluation as not cacheable;
    /// no match is not cacheable either.
    pub fn evaluate(&self, method: &str, path: &str) -> CacheDecision<'_> {
        let method = method.to_ascii_uppercase();
        match self.rules().iter().find(|r| r.matches(&method, path)) {
            Some(rule) => CacheDecision {
                rule: Some(rule),
                cacheable: rule.disposition == Disposition::Allow,
            },
            None => CacheDecision {
                rule: None,
                cacheable: false,
            },
        }
    }
}

/// TTLs live in the non-negative `i64` range; anything else is ignored.
fn parse_ttl(value: &str) -> Option<u64> {
    value.parse::<i64>().ok().and_then(|t| u64::try_from(t).ok())
}

fn upper_methods(value: &str) -> BTreeSet<String> {
    split_list(value)
        .into_iter()
        .map(|m| m.to_ascii_uppercase())
        .collect()
}

impl Grammar for Cache {
    type Rule = CacheRule;

    const NAME: &'static str = "cache";

    fn parse_line(line: &Line<'_>) -> Option<CacheRule> {
        if line.tokens.len() < 2 {
            return None;
        }
        let disposition = Disposition::parse(line.keyword())?;

        let mut rule = CacheRule {
            disposition,
            matcher: None,
            methods: BTreeSet::new(),
            ttl: DEFAULT_TTL,
            vary: Vec::new(),
        };

        // When several matchers are given the last non-empty one wins.
        for (key, value) in line.options() {
            match key.as_str() {
                "prefix" if !value.is_empty() => {
                    rule.matcher = Some(PathMatcher::Prefix(value.to_string()));
                }
                "exact" if !value.is_empty() => {
                    rule.matcher = Some(PathMatcher::Exact(value.to_string()));
                }
                "regex" if !value.is_empty() => match Regex::new(value) {
                    Ok(re) => rule.matcher = Some(PathMatcher::Regex(re)),
                    Err(e) => {
                        warn!(line = line.number, pattern = %value, error = %e, "invalid cache rule regex, rule will never match");
                        rule.matcher = None;
                    }
                },
                "methods" => rule.methods = upper_methods(value),
                "ttl" => {
                    if let Some(ttl) = parse_ttl(value) {
                        rule.ttl = ttl;
                    }
                }
                "vary" => rule.vary = split_list(value),
                _ => {}
            }
        }

        Some(rule)
    }

    fn validate(text: &str) -> ValidationReport {
        let mut report = ValidationReport::new();
        for line in lines(text) {
            validate_line(&line, &mut report);
        }
        report
    }

    fn render_line(rule: &CacheRule) -> String {
        let mut parts = vec![rule.disposition.as_str().to_string()];
        if let Some(matcher) = &rule.matcher {
            parts.push(format!("{}={}", matcher.key(), matcher.value()));
        }
        if !rule.methods.is_empty() {
            let methods: Vec<&str> = rule.methods.iter().map(String::as_str).collect();
            parts.push(format!("methods={}", methods.join(",")));
        }
        parts.push(format!("ttl={}", rule.ttl));
        if !rule.vary.is_empty() {
            parts.push(format!("vary={}", rule.vary.join(",")));
        }
        parts.join(" ")
    }
}

fn validate_line(line: &Line<'_>, report: &mut ValidationReport) {
    let loc = line.location();

    if Disposition::parse(line.keyword()).is_none() {
        report.error(&loc, format!("kind must be ALLOW or DENY (got {:?})", line.keyword()));
    }

    let mut matchers = 0usize;
    for (key, value) in line.options() {
        match key.as_str() {
            "prefix" | "exact" | "regex" => {
                matchers += 1;
                check_match_value(&key, value, &loc, report);
            }
            "methods" => check_methods(&split_list(value), &loc, report),
            "vary" => check_vary(&split_list(value), &loc, report),
            "ttl" => match value.parse::<i64>() {
                Ok(ttl) if ttl < 0 => report.error(&loc, "ttl must be >= 0"),
                Ok(_) => {}
                Err(_) => report.error(&loc, format!("ttl must be an integer (got {:?})", value)),
            },
            _ => {}
        }
    }

    match matchers {
        0 => report.error(&loc, "one of exact=, prefix= or regex= is required"),
        1 => {}
        _ => report.error(&loc, "only one of exact=, prefix= or regex= may be given"),
    }
}

/// Shared by raw-text and structured validation.
fn check_match_value(kind: &str, value: &str, loc: &str, report: &mut ValidationReport) {
    if value.is_empty() {
        report.error(loc, format!("{} value required", kind));
        return;
    }
    if value.chars().any(char::is_whitespace) {
        report.error(loc, format!("{} value must not contain whitespace", kind));
        return;
    }
    if kind == "regex" {
        if let Err(e) = Regex::new(value) {
            report.error(loc, format!("invalid regex: {}", e));
        }
    }
}

fn check_methods<S: AsRef<str>>(methods: &[S], loc: &str, report: &mut ValidationReport) {
    for method in methods {
        let upper = method.as_ref().trim().to_ascii_uppercase();
        if upper.is_empty() {
            continue;
        }
        if !SUPPORTED_METHODS.contains(&upper.as_str()) {
            report.error(loc, format!("unsupported method {:?} (only GET/HEAD)", upper));
        }
    }
}

/// Vary entries are written comma-joined into one token.
fn check_vary<S: AsRef<str>>(headers: &[S], loc: &str, report: &mut ValidationReport) {
    for header in headers {
        let header = header.as_ref().trim();
        if header.contains(',') || header.chars().any(char::is_whitespace) {
            report.error(loc, format!("vary header {:?} must not contain ',' or whitespace", header));
        }
    }
}
