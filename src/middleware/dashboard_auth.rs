use axum::Json;
use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, StatusCode, request::Parts};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use subtle::ConstantTimeEq;

use crate::handlers::dashboard::DashboardState;

/// Ensure the dashboard API request carries the configured key.
/// Accepts either:
/// - Header: `x-portico-key: ...`
/// - Header: `Authorization: Bearer <key>`
pub fn ensure_authorized(headers: &HeaderMap, expected: &str) -> Result<(), Response> {
    if let Some(hv) = headers.get("x-portico-key").and_then(|v| v.to_str().ok())
        && key_matches(hv, expected)
    {
        return Ok(());
    }

    if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        let auth = auth.trim();
        if let Some(token) = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            && key_matches(token, expected)
        {
            return Ok(());
        }
    }

    Err((
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "unauthorized", "reason": "invalid or missing dashboard key"})),
    )
        .into_response())
}

fn key_matches(presented: &str, expected: &str) -> bool {
    !expected.is_empty() && presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

#[derive(Debug, Clone, Copy)]
pub struct RequireDashboardKey;

impl FromRequestParts<DashboardState> for RequireDashboardKey {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &DashboardState,
    ) -> Result<Self, Self::Rejection> {
        ensure_authorized(&parts.headers, &state.key)?;
        Ok(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_and_plain_header_both_work() {
        let mut headers = HeaderMap::new();
        headers.insert("x-portico-key", HeaderValue::from_static("s3cr3t"));
        assert!(ensure_authorized(&headers, "s3cr3t").is_ok());

        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer s3cr3t"));
        assert!(ensure_authorized(&headers, "s3cr3t").is_ok());
    }

    #[test]
    fn wrong_or_missing_key_is_rejected() {
        let headers = HeaderMap::new();
        assert!(ensure_authorized(&headers, "s3cr3t").is_err());

        let mut headers = HeaderMap::new();
        headers.insert("x-portico-key", HeaderValue::from_static("nope"));
        assert!(ensure_authorized(&headers, "s3cr3t").is_err());
    }

    #[test]
    fn empty_configured_key_never_authorizes() {
        let mut headers = HeaderMap::new();
        headers.insert("x-portico-key", HeaderValue::from_static(""));
        assert!(ensure_authorized(&headers, "").is_err());
    }
}
