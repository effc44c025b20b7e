mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use common::{StaticIssuer, edge_state, spawn_cert_actor, test_config};

async fn apps() -> (axum::Router, axum::Router, TempDir) {
    let dir = TempDir::new().unwrap();
    let cfg = test_config("example.com");
    let (certs, _keys) = spawn_cert_actor(
        Arc::new(StaticIssuer),
        &dir.path().join("store.json"),
        vec![],
    )
    .await;
    let state = edge_state(&cfg, certs);
    (
        portico::router::plain_app(state.clone()),
        portico::router::secure_app(state),
        dir,
    )
}

fn get(host: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header(header::HOST, host)
        .body(Body::empty())
        .expect("failed to build request")
}

fn location(resp: &axum::response::Response) -> String {
    resp.headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .expect("missing Location header")
        .to_string()
}

#[tokio::test]
async fn plaintext_requests_redirect_to_https() {
    let (plain, _secure, _dir) = apps().await;

    let resp = plain
        .oneshot(get("example.com", "/some/path?q=1"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::PERMANENT_REDIRECT);
    assert_eq!(location(&resp), "https://example.com/some/path?q=1");
}

#[tokio::test]
async fn plaintext_www_request_converges_in_one_hop() {
    let (plain, _secure, _dir) = apps().await;

    // The end-to-end property: scheme and www are fixed in a single redirect.
    let resp = plain
        .oneshot(get("www.example.com", "/api/x"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::PERMANENT_REDIRECT);
    assert_eq!(location(&resp), "https://example.com/api/x");
}

#[tokio::test]
async fn tls_www_host_is_redirected_to_apex() {
    let (_plain, secure, _dir) = apps().await;

    let resp = secure
        .oneshot(get("www.example.com", "/about"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::PERMANENT_REDIRECT);
    assert_eq!(location(&resp), "https://example.com/about");
}

#[tokio::test]
async fn plaintext_redirect_applies_to_any_host() {
    let (plain, _secure, _dir) = apps().await;

    let resp = plain.oneshot(get("whatever.org", "/x")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::PERMANENT_REDIRECT);
    assert_eq!(location(&resp), "https://whatever.org/x");
}

#[tokio::test]
async fn unknown_challenge_token_is_not_found_and_not_redirected() {
    let (plain, _secure, _dir) = apps().await;

    let resp = plain
        .oneshot(get(
            "example.com",
            "/.well-known/acme-challenge/no-such-token",
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn request_without_host_is_rejected() {
    let (plain, _secure, _dir) = apps().await;

    let resp = plain
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/x")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
