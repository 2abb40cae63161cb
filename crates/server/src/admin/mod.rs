//! Admin API for reading, validating and replacing the policy files.
//!
//! Every write runs validation, then the `If-Match` precondition, then the
//! atomic write, then a reload. Outcomes map to 200 / 409 / 422; I/O failures
//! map to 500. File reads, writes and reloads run on the blocking pool, never
//! on the workers serving proxied requests.

mod bypass;
mod cache;
mod types;

use std::io;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::error;

use rulegate_rules::{CommitOutcome, Grammar, PolicyError, PolicyFile, ValidationReport};

use crate::auth::require_api_key;
use crate::state::AppState;

pub use bypass::*;
pub use cache::*;
pub use types::*;

/// Build the admin sub-router. Every route requires an API key.
pub fn admin_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/bypass-rules", get(get_bypass_rules).put(put_bypass_rules))
        .route("/bypass-rules:validate", post(validate_bypass_rules))
        .route("/cache-rules", get(get_cache_rules).put(put_cache_rules))
        .route("/cache-rules:validate", post(validate_cache_rules))
        .route("/status", get(status))
        .route_layer(middleware::from_fn_with_state(state, require_api_key))
}

/// Report policy load state and reload counters.
pub(crate) async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "running",
        api_base: state.config.admin.base_path.clone(),
        upstream: state.upstream.as_ref().map(|u| u.base().to_string()),
        bypass: policy_status(&state.bypass),
        cache: policy_status(&state.cache),
    })
}

fn policy_status<G: Grammar>(policy: &PolicyFile<G>) -> PolicyStatus {
    PolicyStatus {
        file: policy.path().display().to_string(),
        loaded: policy.store().is_loaded(),
        rules: policy.store().len(),
        reloads: policy.reload_count(),
        failed_reloads: policy.failed_reload_count(),
    }
}

// ── Shared response mapping ─────────────────────────────────────────

/// Run policy file I/O on the blocking pool.
async fn off_worker<T, F>(work: F) -> Result<T, PolicyError>
where
    F: FnOnce() -> Result<T, PolicyError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result,
        Err(e) => Err(PolicyError::Io(io::Error::other(e))),
    }
}

/// Owned so it can move onto the blocking pool.
fn if_match(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::IF_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn validation_response(report: ValidationReport) -> Response {
    let status = if report.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    (status, Json(report)).into_response()
}

fn commit_response(result: Result<CommitOutcome, PolicyError>) -> Response {
    match result {
        Ok(CommitOutcome::Committed { etag, .. }) => {
            let mut response = Json(CommitResponse {
                ok: true,
                etag: etag.clone(),
            })
            .into_response();
            if let Ok(value) = HeaderValue::from_str(&etag) {
                response.headers_mut().insert(header::ETAG, value);
            }
            response
        }
        Ok(CommitOutcome::Conflict { current_etag }) => (
            StatusCode::CONFLICT,
            Json(ConflictResponse {
                error: "conflict",
                current_etag,
            }),
        )
            .into_response(),
        Err(PolicyError::Invalid(report)) => validation_response(report),
        Err(e) => {
            error!(error = %e, "policy write failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

fn read_error(e: PolicyError) -> (StatusCode, String) {
    error!(error = %e, "failed to read policy file");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
