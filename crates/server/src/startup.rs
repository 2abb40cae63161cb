//! Server startup: policy loading, shared state and watchers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use rulegate_core::Config;
use rulegate_rules::persist::ensure_file;
use rulegate_rules::{Grammar, PolicyFile, PolicyWatcher};

use crate::inspect::{Inspector, PassThrough};
use crate::state::AppState;
use crate::upstream::Upstream;

/// Load both policy files (creating empty ones if missing) and build `AppState`.
pub fn build_app_state(config: Config) -> anyhow::Result<Arc<AppState>> {
    build_app_state_with(config, Arc::new(PassThrough))
}

pub fn build_app_state_with(config: Config, inspector: Arc<dyn Inspector>) -> anyhow::Result<Arc<AppState>> {
    let bypass = open_policy(&config.policy.bypass_file)?;
    let cache = open_policy(&config.policy.cache_file)?;

    let upstream = match &config.upstream.url {
        Some(url) => {
            let upstream = Upstream::new(url, Duration::from_secs(config.upstream.timeout_secs))
                .with_context(|| format!("failed to build upstream client for {}", url))?;
            info!(upstream = %upstream.base(), "forwarding to upstream");
            Some(upstream)
        }
        None => {
            tracing::warn!("UPSTREAM_URL not set; proxied requests will get 502");
            None
        }
    };

    Ok(Arc::new(AppState {
        config,
        bypass: Arc::new(bypass),
        cache: Arc::new(cache),
        inspector,
        upstream,
    }))
}

fn open_policy<G: Grammar>(path: &std::path::Path) -> anyhow::Result<PolicyFile<G>> {
    ensure_file(path).with_context(|| format!("failed to create {}", path.display()))?;
    PolicyFile::open(path).with_context(|| format!("failed to load {} policy from {}", G::NAME, path.display()))
}

/// Start hot-reload watchers for both policy files.
pub fn spawn_watchers(state: &AppState) -> anyhow::Result<Vec<PolicyWatcher>> {
    let debounce = state.config.policy.debounce();
    Ok(vec![
        state.bypass.watch(debounce).context("failed to watch bypass policy")?,
        state.cache.watch(debounce).context("failed to watch cache policy")?,
    ])
}
