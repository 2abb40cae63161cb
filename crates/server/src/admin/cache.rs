use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::Json;

use rulegate_rules::cache::{from_dto, to_dto};
use rulegate_rules::ValidationReport;

use crate::state::AppState;

use super::{
    commit_response, if_match, off_worker, read_error, validation_response, CacheBody,
    CacheRulesResponse,
};

/// Raw cache file, its ETag, the published rules and any defects in the raw text.
pub(crate) async fn get_cache_rules(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CacheRulesResponse>, (StatusCode, String)> {
    let policy = state.cache.clone();
    let raw = off_worker(move || policy.read_raw()).await.map_err(read_error)?;
    let rules = state
        .cache
        .snapshot()
        .map(|rs| to_dto(&rs))
        .unwrap_or_default();
    let errors = state.cache.validate(&raw.raw).messages;
    Ok(Json(CacheRulesResponse {
        etag: raw.etag,
        raw: raw.raw,
        rules,
        errors,
    }))
}

pub(crate) async fn validate_cache_rules(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CacheBody>,
) -> Response {
    let report = if body.raw_mode {
        state.cache.validate(&body.raw)
    } else {
        match from_dto(&body.rules) {
            Ok(_) => ValidationReport::new(),
            Err(report) => report,
        }
    };
    validation_response(report)
}

/// Replace the cache file from raw text or structured rules.
pub(crate) async fn put_cache_rules(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CacheBody>,
) -> Response {
    let policy = state.cache.clone();
    let precondition = if_match(&headers);
    let result = off_worker(move || {
        if body.raw_mode {
            policy.commit(&body.raw, precondition.as_deref())
        } else {
            policy.commit_rules(&body.rules, precondition.as_deref())
        }
    })
    .await;
    commit_response(result)
}
