use std::sync::Arc;

use rulegate_core::Config;
use rulegate_rules::cache::Cache;
use rulegate_rules::{Bypass, PolicyFile};

use crate::inspect::Inspector;
use crate::upstream::Upstream;

pub type BypassPolicy = Arc<PolicyFile<Bypass>>;
pub type CachePolicy = Arc<PolicyFile<Cache>>;

pub struct AppState {
    pub config: Config,
    pub bypass: BypassPolicy,
    pub cache: CachePolicy,
    pub inspector: Arc<dyn Inspector>,
    /// `None` when no upstream is configured; proxied requests then get 502.
    pub upstream: Option<Upstream>,
}
