mod common;

use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;

use chrono::{Duration as ChronoDuration, Utc};

use portico::certs::{CertStore, StoredCert, challenge};
use common::{
    BadPemIssuer, GateIssuer, StaticIssuer, TEST_ACCOUNT_KEY, edge_state, spawn_cert_actor,
    test_config,
};

#[tokio::test]
async fn issuance_persists_to_the_store_and_reports_ready() {
    let dir = TempDir::new().unwrap();
    let store_path = dir.path().join("store.json");
    let (certs, keys) = spawn_cert_actor(
        Arc::new(StaticIssuer),
        &store_path,
        vec!["example.com".to_string()],
    )
    .await;

    // The initial ensure pass runs asynchronously; poll until it lands.
    let mut ready = false;
    for _ in 0..50 {
        let snapshot = certs.snapshot().await.unwrap();
        if snapshot.iter().any(|s| s.host == "example.com" && s.state == "ready") {
            ready = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(ready, "certificate never became ready");
    // Ready implies a live key in the TLS resolver.
    assert!(keys.contains("example.com"));

    // Survives a restart: a fresh store load sees the cert.
    let reloaded = CertStore::load(&store_path).unwrap();
    assert!(reloaded.get("example.com").is_some());
}

#[tokio::test]
async fn unusable_stored_cert_is_reissued_not_reported_ready() {
    let dir = TempDir::new().unwrap();
    let store_path = dir.path().join("store.json");

    // Seed a long-lived record whose PEM cannot produce a key.
    {
        let mut store = CertStore::load(&store_path).unwrap();
        store
            .insert(StoredCert {
                host: "example.com".to_string(),
                cert_pem: "garbage".to_string(),
                key_pem: "garbage".to_string(),
                issued_at: Utc::now(),
                not_after: Utc::now() + ChronoDuration::days(90),
            })
            .unwrap();
    }

    let (certs, keys) = spawn_cert_actor(
        Arc::new(StaticIssuer),
        &store_path,
        vec!["example.com".to_string()],
    )
    .await;

    let mut live = false;
    for _ in 0..50 {
        let snapshot = certs.snapshot().await.unwrap();
        let ready = snapshot
            .iter()
            .any(|s| s.host == "example.com" && s.state == "ready");
        if ready && keys.contains("example.com") {
            live = true;
            break;
        }
        // Ready must never be reported while there is no live key.
        assert!(!ready, "ready reported without an installed key");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(live, "unusable stored cert was never replaced");

    // The garbage record was replaced on disk by the reissued bundle.
    let reloaded = CertStore::load(&store_path).unwrap();
    assert_ne!(reloaded.get("example.com").unwrap().cert_pem, "garbage");
}

#[tokio::test]
async fn issued_cert_that_fails_install_is_never_ready_or_persisted() {
    let dir = TempDir::new().unwrap();
    let store_path = dir.path().join("store.json");
    let (certs, keys) = spawn_cert_actor(
        Arc::new(BadPemIssuer),
        &store_path,
        vec!["example.com".to_string()],
    )
    .await;

    // Give the order time to complete and the install to be attempted.
    for _ in 0..20 {
        let snapshot = certs.snapshot().await.unwrap();
        let entry = snapshot.iter().find(|s| s.host == "example.com").unwrap();
        assert_ne!(entry.state, "ready");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(!keys.contains("example.com"));
    assert!(CertStore::load(&store_path).unwrap().is_empty());
}

#[tokio::test]
async fn in_flight_challenge_is_served_on_the_plaintext_entrypoint() {
    let dir = TempDir::new().unwrap();
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let (certs, _keys) = spawn_cert_actor(
        Arc::new(GateIssuer { started: started_tx }),
        &dir.path().join("store.json"),
        vec!["example.com".to_string()],
    )
    .await;

    let (host, token) = tokio::time::timeout(Duration::from_secs(5), started_rx.recv())
        .await
        .expect("issuance never started")
        .expect("issuer channel closed");
    assert_eq!(host, "example.com");

    // Direct actor lookup.
    let key_auth = certs
        .challenge_response(&token)
        .await
        .unwrap()
        .expect("token should be pending");
    assert_eq!(key_auth, challenge::key_authorization(&token, TEST_ACCOUNT_KEY));

    // And over HTTP, exempt from the https redirect.
    let cfg = test_config("example.com");
    let plain = portico::router::plain_app(edge_state(&cfg, certs.clone()));
    let resp = plain
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(format!("/.well-known/acme-challenge/{token}"))
                .header(header::HOST, "example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(String::from_utf8_lossy(&body), key_auth);

    // While the order is in flight the host reports pending.
    let snapshot = certs.snapshot().await.unwrap();
    let entry = snapshot.iter().find(|s| s.host == "example.com").unwrap();
    assert_eq!(entry.state, "pending");
}

#[tokio::test]
async fn unknown_token_yields_none() {
    let dir = TempDir::new().unwrap();
    let (certs, _keys) = spawn_cert_actor(
        Arc::new(StaticIssuer),
        &dir.path().join("store.json"),
        vec![],
    )
    .await;
    assert!(certs.challenge_response("nope").await.unwrap().is_none());
}
