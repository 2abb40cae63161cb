//! `X-API-Key` gate for the admin API.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderName, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::warn;

use crate::state::AppState;

pub const API_KEY: HeaderName = HeaderName::from_static("x-api-key");

pub async fn require_api_key(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let admin = &state.config.admin;
    if admin.auth_disabled {
        return next.run(req).await;
    }

    let configured = [&admin.api_key_primary, &admin.api_key_secondary]
        .into_iter()
        .flatten()
        .any(|k| !k.is_empty());
    if !configured {
        warn!(path = %req.uri().path(), "admin request rejected: no API keys configured");
        return unauthorized("admin API keys are not configured");
    }

    let presented = req
        .headers()
        .get(&API_KEY)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !admin.accepts_key(presented) {
        warn!(path = %req.uri().path(), "admin request rejected: invalid API key");
        return unauthorized("unauthorized");
    }

    next.run(req).await
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}
