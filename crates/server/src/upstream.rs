//! Minimal forwarder to the protected application.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::state::AppState;

/// Largest request body forwarded upstream.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Connection-scoped headers that must not be forwarded in either direction.
const HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    header::HOST,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

#[derive(Debug, Clone)]
pub struct Upstream {
    client: reqwest::Client,
    base: String,
}

impl Upstream {
    pub fn new(base_url: &str, timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            client,
            base: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Forward one request and relay the response as-is.
    pub async fn forward(&self, req: Request) -> Result<Response, String> {
        let (parts, body) = req.into_parts();
        let target = format!(
            "{}{}",
            self.base,
            parts.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/")
        );
        let body = to_bytes(body, MAX_BODY_BYTES)
            .await
            .map_err(|e| format!("failed to read request body: {}", e))?;

        let resp = self
            .client
            .request(parts.method, &target)
            .headers(strip_hop_by_hop(parts.headers))
            .body(body)
            .send()
            .await
            .map_err(|e| format!("upstream request to {} failed: {}", target, e))?;

        let status = resp.status();
        let headers = strip_hop_by_hop(resp.headers().clone());
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| format!("failed to read upstream response: {}", e))?;

        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

fn strip_hop_by_hop(mut headers: HeaderMap) -> HeaderMap {
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
    headers.remove(header::CONTENT_LENGTH);
    headers
}

/// Fallback handler: everything that is not an admin route goes upstream.
pub async fn forward(State(state): State<Arc<AppState>>, req: Request) -> Response {
    let Some(upstream) = &state.upstream else {
        return (StatusCode::BAD_GATEWAY, "no upstream configured").into_response();
    };
    match upstream.forward(req).await {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "upstream forward failed");
            (StatusCode::BAD_GATEWAY, "bad gateway").into_response()
        }
    }
}
