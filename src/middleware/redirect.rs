//! Canonical-URL policies: plaintext traffic is redirected to TLS, and
//! `www.` hosts are rewritten to the apex, both folded into one computation
//! so a `http://www.…` request converges in a single hop.

use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::rules::matcher::normalize_host;

/// Compute the canonical `https://` target for a request, or `None` when the
/// request is already canonical (TLS entrypoint, non-`www` host).
///
/// The host may carry a port; canonical URLs use the default entrypoint
/// ports, so it is dropped. A bare `www.` host has nothing left after
/// stripping and is left alone.
pub fn canonical_target(tls: bool, raw_host: &str, path_and_query: &str) -> Option<String> {
    let host = normalize_host(raw_host);
    if host.is_empty() {
        return None;
    }
    let apex = match host.strip_prefix("www.") {
        Some(rest) if !rest.is_empty() => rest,
        _ => host.as_str(),
    };
    if tls && apex == host {
        return None;
    }
    let pq = if path_and_query.starts_with('/') {
        path_and_query
    } else {
        "/"
    };
    Some(format!("https://{apex}{pq}"))
}

/// 308 keeps the method and body across the redirect.
pub fn redirect_response(location: &str) -> Response {
    (
        StatusCode::PERMANENT_REDIRECT,
        [(header::LOCATION, location.to_string())],
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plaintext_requests_always_redirect_to_https() {
        assert_eq!(
            canonical_target(false, "example.com", "/some/path?q=1"),
            Some("https://example.com/some/path?q=1".to_string())
        );
    }

    #[test]
    fn www_and_scheme_fold_into_one_hop() {
        assert_eq!(
            canonical_target(false, "www.example.com", "/api/x"),
            Some("https://example.com/api/x".to_string())
        );
    }

    #[test]
    fn tls_www_host_is_rewritten_to_apex() {
        assert_eq!(
            canonical_target(true, "www.example.com", "/"),
            Some("https://example.com/".to_string())
        );
    }

    #[test]
    fn canonical_tls_request_is_left_alone() {
        assert_eq!(canonical_target(true, "example.com", "/api/x"), None);
        assert_eq!(canonical_target(true, "db.example.com", "/"), None);
    }

    #[test]
    fn host_port_is_dropped_from_the_target() {
        assert_eq!(
            canonical_target(false, "Example.com:8080", "/x"),
            Some("https://example.com/x".to_string())
        );
    }

    #[test]
    fn bare_www_host_is_not_emptied() {
        assert_eq!(canonical_target(true, "www.", "/"), None);
    }
}
