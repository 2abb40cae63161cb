//! Per-request policy middleware.
//!
//! Runs the bypass policy, then the inspector unless bypassed, then annotates
//! GET/HEAD responses from the cache policy. Both lookups are lock-free
//! snapshot reads.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{debug, info, warn};
use uuid::Uuid;

use rulegate_rules::cache::{CacheRuleset, DEFAULT_TTL};
use rulegate_rules::bypass::decode_path;
use rulegate_rules::BypassAction;

use crate::inspect::{RequestMeta, Verdict};
use crate::state::AppState;

pub const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
pub const CACHEABLE: HeaderName = HeaderName::from_static("x-rulegate-cacheable");
pub const ACCEL_EXPIRES: HeaderName = HeaderName::from_static("x-accel-expires");
pub const HIT: HeaderName = HeaderName::from_static("x-rulegate-hit");
pub const RULE_IDS: HeaderName = HeaderName::from_static("x-rulegate-rule-ids");

pub async fn policy_gate(State(state): State<Arc<AppState>>, mut req: Request, next: Next) -> Response {
    let request_id = ensure_request_id(req.headers_mut());
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    // Cache rules match the decoded path, as the upstream will see it.
    let cache_path = decode_path(&path).into_owned();

    let action = state
        .bypass
        .snapshot()
        .map(|rs| rs.evaluate(&path))
        .unwrap_or(BypassAction::None);

    let verdict = match action {
        BypassAction::Bypass => {
            debug!(request_id = %request_id, path = %path, "bypass hit, skipping inspection");
            None
        }
        BypassAction::Rule(extra) => {
            debug!(request_id = %request_id, path = %path, extra_rule = %extra, "bypass rule hit");
            Some(inspect(&state, &req, &request_id, Some(extra)))
        }
        BypassAction::None => Some(inspect(&state, &req, &request_id, None)),
    };

    if let Some(verdict) = verdict.as_ref().filter(|v| v.blocked) {
        warn!(
            request_id = %request_id,
            method = %method,
            path = %path,
            rules = %verdict.rule_id_header(),
            "request blocked"
        );
        let mut response = (StatusCode::FORBIDDEN, "Forbidden").into_response();
        annotate_verdict(response.headers_mut(), verdict);
        set_header(response.headers_mut(), REQUEST_ID, &request_id);
        return response;
    }

    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    set_header(headers, REQUEST_ID, &request_id);

    if let Some(verdict) = verdict.as_ref().filter(|v| v.is_hit()) {
        info!(
            request_id = %request_id,
            path = %path,
            rules = %verdict.rule_id_header(),
            status = response.status().as_u16(),
            "inspection hit, allowed"
        );
        annotate_verdict(response.headers_mut(), verdict);
    }

    // Gateway and upstream failures are never marked cacheable.
    if !response.status().is_server_error() {
        if let Some(rs) = state.cache.snapshot() {
            annotate_cache(response.headers_mut(), &rs, &method, &cache_path);
        }
    }
    response
}

fn inspect(state: &AppState, req: &Request, request_id: &str, extra_rule: Option<String>) -> Verdict {
    let meta = RequestMeta {
        request_id: request_id.to_string(),
        method: req.method().clone(),
        uri: req.uri().clone(),
        headers: req.headers().clone(),
        extra_rule,
    };
    state.inspector.inspect(&meta)
}

/// Reuse the caller's `X-Request-ID` or mint one.
fn ensure_request_id(headers: &mut HeaderMap) -> String {
    if let Some(id) = headers
        .get(&REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        return id.to_string();
    }
    let id = Uuid::new_v4().simple().to_string();
    set_header(headers, REQUEST_ID, &id);
    id
}

fn annotate_verdict(headers: &mut HeaderMap, verdict: &Verdict) {
    if !verdict.is_hit() {
        return;
    }
    headers.insert(HIT, HeaderValue::from_static("1"));
    set_header(headers, RULE_IDS, &verdict.rule_id_header());
}

/// Mark a GET/HEAD response cacheable when the cache policy allows it.
pub fn annotate_cache(headers: &mut HeaderMap, ruleset: &CacheRuleset, method: &Method, path: &str) {
    if method != Method::GET && method != Method::HEAD {
        return;
    }
    let decision = ruleset.evaluate(method.as_str(), path);
    let Some(rule) = decision.rule.filter(|_| decision.cacheable) else {
        return;
    };

    let ttl = if rule.ttl == 0 { DEFAULT_TTL } else { rule.ttl };
    headers.insert(CACHEABLE, HeaderValue::from_static("1"));
    set_header(headers, ACCEL_EXPIRES, &ttl.to_string());
    if !rule.vary.is_empty() {
        set_header(headers, axum::http::header::VARY, &rule.vary.join(", "));
    }
}

fn set_header(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(v) => {
            headers.insert(name, v);
        }
        Err(e) => warn!(header = %name, error = %e, "dropping invalid header value"),
    }
}
