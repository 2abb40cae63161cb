//! HTTP router construction.
//!
//! The admin API is nested under the configured base path. Everything else
//! goes through the policy gate to the upstream forwarder.

use std::sync::Arc;

use axum::middleware;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::admin::admin_router;
use crate::gate::policy_gate;
use crate::state::AppState;
use crate::upstream;

/// Build the complete application router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    let proxy = Router::new()
        .fallback(upstream::forward)
        .layer(middleware::from_fn_with_state(state.clone(), policy_gate));

    Router::new()
        .nest(&state.config.admin.base_path, admin_router(state.clone()))
        .merge(proxy)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
