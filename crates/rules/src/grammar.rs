//! Shared line grammar and the immutable [`Ruleset`] container.
//!
//! Both policy files use the same conventions: one rule per line, blank lines
//! and `#` comments skipped, whitespace-separated tokens where the first token
//! is the rule keyword and the rest are `key=value` options. A [`Grammar`]
//! decides what a tokenized line means.

use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::{PolicyError, Result};
use crate::validation::ValidationReport;

/// A line-oriented rule grammar.
pub trait Grammar: Sized + Send + Sync + 'static {
    /// One parsed rule line.
    type Rule: Clone + fmt::Debug + Send + Sync;

    /// Short name used in logs (`bypass`, `cache`).
    const NAME: &'static str;

    /// Leniently turn one tokenized line into a rule. `None` drops the line.
    fn parse_line(line: &Line<'_>) -> Option<Self::Rule>;

    /// Strictly check candidate file content, collecting every defect.
    fn validate(text: &str) -> ValidationReport;

    /// Render one rule back into its line form.
    fn render_line(rule: &Self::Rule) -> String;
}

/// An ordered, immutable list of rules evaluated first-match-wins.
pub struct Ruleset<G: Grammar> {
    rules: Vec<G::Rule>,
}

impl<G: Grammar> Ruleset<G> {
    pub fn new(rules: Vec<G::Rule>) -> Self {
        Self { rules }
    }

    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn rules(&self) -> &[G::Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Render every rule, one per line, with a trailing newline.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for rule in &self.rules {
            out.push_str(&G::render_line(rule));
            out.push('\n');
        }
        out
    }
}

impl<G: Grammar> Clone for Ruleset<G> {
    fn clone(&self) -> Self {
        Self {
            rules: self.rules.clone(),
        }
    }
}

impl<G: Grammar> fmt::Debug for Ruleset<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ruleset")
            .field("grammar", &G::NAME)
            .field("rules", &self.rules)
            .finish()
    }
}

/// A non-comment, non-blank source line split into tokens.
#[derive(Debug, Clone)]
pub struct Line<'a> {
    /// 1-based line number in the source text.
    pub number: usize,
    pub tokens: Vec<&'a str>,
}

impl<'a> Line<'a> {
    pub fn keyword(&self) -> &'a str {
        self.tokens.first().copied().unwrap_or("")
    }

    /// Tokens after the keyword.
    pub fn args(&self) -> &[&'a str] {
        self.tokens.get(1..).unwrap_or(&[])
    }

    /// `key=value` options after the keyword, keys lower-cased.
    pub fn options(&self) -> impl Iterator<Item = (String, &'a str)> + '_ {
        self.args().iter().filter_map(|token| split_option(*token))
    }

    pub fn location(&self) -> String {
        format!("line {}", self.number)
    }
}

/// Iterate the meaningful lines of `text`.
pub fn lines(text: &str) -> impl Iterator<Item = Line<'_>> {
    text.lines().enumerate().filter_map(|(idx, raw)| {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return None;
        }
        Some(Line {
            number: idx + 1,
            tokens: trimmed.split_whitespace().collect(),
        })
    })
}

/// Split `key=value` on the first `=`. Tokens without `=` yield `None`.
pub fn split_option(token: &str) -> Option<(String, &str)> {
    let (key, value) = token.split_once('=')?;
    Some((key.to_ascii_lowercase(), value))
}

/// Split a comma-separated list, trimming entries and dropping empty ones.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Leniently parse rule text. Malformed lines are dropped, never fatal.
pub fn parse_str<G: Grammar>(text: &str) -> Ruleset<G> {
    let rules = lines(text)
        .filter_map(|line| {
            let rule = G::parse_line(&line);
            if rule.is_none() {
                tracing::debug!(grammar = G::NAME, line = line.number, "dropped malformed rule line");
            }
            rule
        })
        .collect();
    Ruleset::new(rules)
}

/// Read and leniently parse a policy file. Only I/O and encoding errors fail.
pub fn load<G: Grammar>(path: &Path) -> Result<Ruleset<G>> {
    let bytes = fs::read(path)?;
    let text = decode(path, bytes)?;
    Ok(parse_str(&text))
}

/// Interpret raw file bytes as UTF-8 text.
pub fn decode(path: &Path, bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|_| PolicyError::Encoding {
        path: path.to_path_buf(),
    })
}
