//! Structured (JSON) form of cache rules used by the admin API.

use std::collections::BTreeSet;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{
    check_match_value, check_methods, check_vary, CacheRule, CacheRuleset, Disposition, PathMatcher,
    DEFAULT_TTL, SUPPORTED_METHODS,
};
use crate::validation::ValidationReport;

/// Comment block written above rendered rules.
pub const FILE_HEADER: &str = "\
# cache.conf - cache rules
# Top-down evaluation; first match wins.
# Syntax: ALLOW|DENY prefix=...|regex=...|exact=... methods=GET,HEAD ttl=<sec> vary=Header,Header
";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchDto {
    /// `exact`, `prefix` or `regex`.
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDto {
    pub kind: String,
    #[serde(rename = "match")]
    pub matcher: MatchDto,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<String>,
    /// Absent means the default TTL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vary: Vec<String>,
}

/// Structured view of a ruleset. Empty method sets are shown as `GET, HEAD`.
pub fn to_dto(ruleset: &CacheRuleset) -> Vec<RuleDto> {
    ruleset
        .rules()
        .iter()
        .map(|rule| {
            let matcher = rule
                .matcher
                .as_ref()
                .map(|m| MatchDto {
                    kind: m.key().to_string(),
                    value: m.value().to_string(),
                })
                .unwrap_or_default();
            let methods = if rule.methods.is_empty() {
                SUPPORTED_METHODS.iter().map(|m| m.to_string()).collect()
            } else {
                rule.methods.iter().cloned().collect()
            };
            RuleDto {
                kind: rule.disposition.as_str().to_string(),
                matcher,
                methods,
                ttl: Some(i64::try_from(rule.ttl).unwrap_or(i64::MAX)),
                vary: rule.vary.clone(),
            }
        })
        .collect()
}

/// Strictly build a ruleset from structured rules, collecting every defect.
pub fn from_dto(dtos: &[RuleDto]) -> Result<CacheRuleset, ValidationReport> {
    let mut report = ValidationReport::new();
    let mut rules = Vec::with_capacity(dtos.len());

    for (i, dto) in dtos.iter().enumerate() {
        let loc = format!("rules[{}]", i);

        let disposition = Disposition::parse(&dto.kind);
        if disposition.is_none() {
            report.error(&loc, "kind must be ALLOW or DENY");
        }

        let kind = dto.matcher.kind.to_ascii_lowercase();
        let value = dto.matcher.value.as_str();
        let matcher = match kind.as_str() {
            "exact" | "prefix" | "regex" => {
                check_match_value(&kind, value, &loc, &mut report);
                build_matcher(&kind, value)
            }
            _ => {
                report.error(&loc, "match.type must be prefix|regex|exact");
                None
            }
        };

        check_methods(&dto.methods, &loc, &mut report);
        let mut methods: BTreeSet<String> = dto
            .methods
            .iter()
            .map(|m| m.trim().to_ascii_uppercase())
            .filter(|m| !m.is_empty())
            .collect();
        if methods.is_empty() {
            methods = SUPPORTED_METHODS.iter().map(|m| m.to_string()).collect();
        }

        let ttl = match dto.ttl {
            None => DEFAULT_TTL,
            Some(t) if t < 0 => {
                report.error(&loc, "ttl must be >= 0");
                DEFAULT_TTL
            }
            Some(t) => t as u64,
        };

        check_vary(&dto.vary, &loc, &mut report);
        let vary = dto
            .vary
            .iter()
            .map(|h| h.trim())
            .filter(|h| !h.is_empty())
            .map(str::to_string)
            .collect();

        if let (Some(disposition), Some(matcher)) = (disposition, matcher) {
            rules.push(CacheRule {
                disposition,
                matcher: Some(matcher),
                methods,
                ttl,
                vary,
            });
        }
    }

    report.into_result()?;
    Ok(CacheRuleset::new(rules))
}

fn build_matcher(kind: &str, value: &str) -> Option<PathMatcher> {
    if value.is_empty() {
        return None;
    }
    match kind {
        "exact" => Some(PathMatcher::Exact(value.to_string())),
        "prefix" => Some(PathMatcher::Prefix(value.to_string())),
        "regex" => Regex::new(value).ok().map(PathMatcher::Regex),
        _ => None,
    }
}

/// Full file content for a ruleset: header comment plus one line per rule.
pub fn render_file(ruleset: &CacheRuleset) -> String {
    format!("{}\n{}", FILE_HEADER, ruleset.render())
}
