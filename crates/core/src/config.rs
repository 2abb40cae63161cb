use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub policy: PolicyConfig,
    pub admin: AdminConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `RULEGATE_PROFILE` env var. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("RULEGATE_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            server: ServerConfig::from_env_profiled(p),
            upstream: UpstreamConfig::from_env_profiled(p),
            policy: PolicyConfig::from_env_profiled(p),
            admin: AdminConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Reject settings the server cannot start with.
    pub fn validate(&self) -> Result<(), String> {
        if self.admin.base_path == "/" {
            return Err("API_BASE_PATH cannot be the root path '/'".to_string());
        }
        Ok(())
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  server:      {}:{}", self.server.host, self.server.port);
        tracing::info!("  upstream:    url={}", self.upstream.url.as_deref().unwrap_or("(none)"));
        tracing::info!("  bypass:      file={}", self.policy.bypass_file.display());
        tracing::info!("  cache:       file={}", self.policy.cache_file.display());
        tracing::info!("  reload:      debounce={}ms", self.policy.debounce_ms);
        tracing::info!(
            "  admin:       base_path={}, auth={}",
            self.admin.base_path,
            if self.admin.auth_disabled { "disabled" } else { "api-key" }
        );
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "HOST", "0.0.0.0"),
            port: profiled_env_u16(p, "PORT", 9090),
        }
    }
}

// ── Upstream ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL requests are forwarded to, e.g. `http://app:8080`.
    pub url: Option<String>,
    pub timeout_secs: u64,
}

impl UpstreamConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            url: profiled_env_opt(p, "UPSTREAM_URL"),
            timeout_secs: profiled_env_u64(p, "UPSTREAM_TIMEOUT_SECS", 30),
        }
    }
}

// ── Policy files ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub bypass_file: PathBuf,
    pub cache_file: PathBuf,
    pub debounce_ms: u64,
}

impl PolicyConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            bypass_file: PathBuf::from(profiled_env_or(p, "BYPASS_FILE", "conf/bypass.conf")),
            cache_file: PathBuf::from(profiled_env_or(p, "CACHE_FILE", "conf/cache.conf")),
            debounce_ms: profiled_env_u64(p, "RELOAD_DEBOUNCE_MS", 200),
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

// ── Admin API ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    pub base_path: String,
    #[serde(skip_serializing)]
    pub api_key_primary: Option<String>,
    #[serde(skip_serializing)]
    pub api_key_secondary: Option<String>,
    pub auth_disabled: bool,
}

impl AdminConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            base_path: normalize_base_path(&profiled_env_or(p, "API_BASE_PATH", "/rulegate-api")),
            api_key_primary: profiled_env_opt(p, "API_KEY_PRIMARY").map(|k| k.trim().to_string()),
            api_key_secondary: profiled_env_opt(p, "API_KEY_SECONDARY").map(|k| k.trim().to_string()),
            auth_disabled: profiled_env_or(p, "API_AUTH_DISABLE", "0") == "1",
        }
    }

    /// True when the given key matches one of the configured keys.
    pub fn accepts_key(&self, key: &str) -> bool {
        let key = key.trim();
        if key.is_empty() {
            return false;
        }
        [&self.api_key_primary, &self.api_key_secondary]
            .into_iter()
            .flatten()
            .any(|k| !k.is_empty() && k == key)
    }
}

/// Ensure a leading `/` and drop trailing slashes (root stays `/`).
fn normalize_base_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin(primary: Option<&str>, secondary: Option<&str>) -> AdminConfig {
        AdminConfig {
            base_path: "/rulegate-api".to_string(),
            api_key_primary: primary.map(str::to_string),
            api_key_secondary: secondary.map(str::to_string),
            auth_disabled: false,
        }
    }

    #[test]
    fn base_path_gets_leading_slash() {
        assert_eq!(normalize_base_path("admin-api"), "/admin-api");
        assert_eq!(normalize_base_path("/admin-api/"), "/admin-api");
        assert_eq!(normalize_base_path(""), "/");
        assert_eq!(normalize_base_path("/"), "/");
    }

    #[test]
    fn root_base_path_is_rejected() {
        let mut config = Config::for_profile("UNITTEST_NO_SUCH_PROFILE");
        config.admin.base_path = "/".to_string();
        assert!(config.validate().is_err());

        config.admin.base_path = "/api".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn accepts_primary_or_secondary_key() {
        let cfg = admin(Some("alpha"), Some("beta"));
        assert!(cfg.accepts_key("alpha"));
        assert!(cfg.accepts_key(" beta "));
        assert!(!cfg.accepts_key("gamma"));
        assert!(!cfg.accepts_key(""));
    }

    #[test]
    fn no_keys_configured_accepts_nothing() {
        let cfg = admin(None, None);
        assert!(!cfg.accepts_key("anything"));
    }
}
