//! Request/response types for the admin API.

use serde::{Deserialize, Serialize};

use rulegate_rules::cache::RuleDto;

// ── Request Types ───────────────────────────────────────────────────

/// Body of `POST /bypass-rules:validate` and `PUT /bypass-rules`.
#[derive(Debug, Deserialize)]
pub struct BypassBody {
    #[serde(default)]
    pub raw: String,
}

/// Body of `POST /cache-rules:validate` and `PUT /cache-rules`.
///
/// `rawMode` selects between the raw file text and structured rules.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheBody {
    #[serde(default)]
    pub raw_mode: bool,
    #[serde(default)]
    pub raw: String,
    #[serde(default)]
    pub rules: Vec<RuleDto>,
}

// ── Response Types ──────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct RawRulesResponse {
    pub etag: String,
    pub raw: String,
}

#[derive(Debug, Serialize)]
pub struct CacheRulesResponse {
    pub etag: String,
    pub raw: String,
    /// Published rules, not a re-parse of `raw`.
    pub rules: Vec<RuleDto>,
    /// Strict validation messages for `raw` as it is on disk.
    pub errors: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CommitResponse {
    pub ok: bool,
    pub etag: String,
}

#[derive(Debug, Serialize)]
pub struct ConflictResponse {
    pub error: &'static str,
    #[serde(rename = "currentETag")]
    pub current_etag: String,
}

#[derive(Debug, Serialize)]
pub struct PolicyStatus {
    pub file: String,
    pub loaded: bool,
    pub rules: usize,
    pub reloads: u64,
    pub failed_reloads: u64,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub api_base: String,
    pub upstream: Option<String>,
    pub bypass: PolicyStatus,
    pub cache: PolicyStatus,
}
