use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::Json;

use crate::state::AppState;

use super::{
    commit_response, if_match, off_worker, read_error, validation_response, BypassBody,
    RawRulesResponse,
};

/// Current bypass file text and its ETag.
pub(crate) async fn get_bypass_rules(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RawRulesResponse>, (StatusCode, String)> {
    let policy = state.bypass.clone();
    let raw = off_worker(move || policy.read_raw()).await.map_err(read_error)?;
    Ok(Json(RawRulesResponse {
        etag: raw.etag,
        raw: raw.raw,
    }))
}

/// Dry-run validation; nothing is written.
pub(crate) async fn validate_bypass_rules(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BypassBody>,
) -> Response {
    validation_response(state.bypass.validate(&body.raw))
}

/// Replace the bypass file.
pub(crate) async fn put_bypass_rules(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<BypassBody>,
) -> Response {
    let policy = state.bypass.clone();
    let precondition = if_match(&headers);
    let result = off_worker(move || policy.commit(&body.raw, precondition.as_deref())).await;
    commit_response(result)
}
