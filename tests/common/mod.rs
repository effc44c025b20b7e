#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use portico::certs::{CertActorArgs, CertHandle, CertStore, IssuedCert, Issuer, actor};
use portico::config::Config;
use portico::error::PorticoError;
use portico::handlers::dashboard::{DashboardState, dashboard_router};
use portico::proxy::UpstreamClient;
use portico::router::EdgeState;
use portico::rules::RouterTable;
use portico::service::health::HealthRegistry;
use portico::tls::TlsKeyMap;

pub const TEST_DASHBOARD_KEY: &str = "test-key";
pub const TEST_ACCOUNT_KEY: &str = "test-account";

/// Self-signed cert for `example.com`, usable by the real TLS key map.
pub const TEST_CERT_PEM: &str = include_str!("../fixtures/cert.pem");
pub const TEST_KEY_PEM: &str = include_str!("../fixtures/key.pem");

pub fn test_config(domain: &str) -> Config {
    let mut cfg = Config::default();
    cfg.domain = domain.to_string();
    cfg.dashboard.key = TEST_DASHBOARD_KEY.to_string();
    cfg.acme.account_key = TEST_ACCOUNT_KEY.to_string();
    cfg
}

/// Issuer that always succeeds immediately with a valid self-signed bundle.
pub struct StaticIssuer;

#[async_trait]
impl Issuer for StaticIssuer {
    async fn issue(&self, _host: &str, _token: &str) -> Result<IssuedCert, PorticoError> {
        Ok(IssuedCert {
            cert_pem: TEST_CERT_PEM.to_string(),
            key_pem: TEST_KEY_PEM.to_string(),
            not_after: Utc::now() + ChronoDuration::days(90),
        })
    }
}

/// Issuer whose orders complete but whose PEM material never parses.
pub struct BadPemIssuer;

#[async_trait]
impl Issuer for BadPemIssuer {
    async fn issue(&self, _host: &str, _token: &str) -> Result<IssuedCert, PorticoError> {
        Ok(IssuedCert {
            cert_pem: "not a certificate".to_string(),
            key_pem: "not a key".to_string(),
            not_after: Utc::now() + ChronoDuration::days(90),
        })
    }
}

/// Issuer that reports each started order on a channel and then parks, so a
/// test can observe the challenge while it is in flight.
pub struct GateIssuer {
    pub started: mpsc::UnboundedSender<(String, String)>,
}

#[async_trait]
impl Issuer for GateIssuer {
    async fn issue(&self, host: &str, token: &str) -> Result<IssuedCert, PorticoError> {
        let _ = self.started.send((host.to_string(), token.to_string()));
        // Park until the actor is dropped at end of test.
        std::future::pending::<()>().await;
        unreachable!("gate issuer never completes")
    }
}

pub async fn spawn_cert_actor(
    issuer: Arc<dyn Issuer>,
    store_path: &Path,
    hosts: Vec<String>,
) -> (CertHandle, Arc<TlsKeyMap>) {
    let keys = TlsKeyMap::new();
    let store = CertStore::load(store_path).expect("load cert store");
    let handle = actor::spawn(CertActorArgs {
        store,
        issuer,
        keys: keys.clone(),
        hosts,
        account_key: TEST_ACCOUNT_KEY.to_string(),
        renew_before: ChronoDuration::days(30),
        retry_delay: Duration::from_secs(60),
        renew_interval: Duration::from_secs(3600),
    })
    .await
    .expect("spawn cert actor");
    (handle, keys)
}

pub fn edge_state(cfg: &Config, certs: CertHandle) -> EdgeState {
    let table = Arc::new(RouterTable::from_config(cfg));
    let health = HealthRegistry::new(&cfg.proxied_upstreams());
    let dashboard = dashboard_router(DashboardState::new(
        cfg,
        table.clone(),
        certs.clone(),
        health,
    ));
    EdgeState::new(
        cfg,
        table,
        UpstreamClient::new().expect("build upstream client"),
        certs,
        dashboard,
    )
}
