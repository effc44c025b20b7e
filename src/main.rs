use mimalloc::MiMalloc;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use portico::certs::{CertActorArgs, CertStore, HttpIssuer};
use portico::handlers::dashboard::{DashboardState, dashboard_router};
use portico::proxy::UpstreamClient;
use portico::service::health::{HealthRegistry, spawn_prober};
use portico::service::prestart;
use portico::tls::TlsKeyMap;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = &portico::config::CONFIG;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        domain = %cfg.domain,
        web = cfg.entrypoints.web,
        websecure = cfg.entrypoints.websecure,
        dashboard = cfg.entrypoints.dashboard,
        loglevel = %cfg.loglevel,
        "configuration loaded"
    );

    let http = UpstreamClient::new()?;

    // Pre-start gate: nothing binds until config validates and every proxied
    // upstream answers.
    prestart::run(cfg, &http.http_client()).await?;

    let keys = TlsKeyMap::new();
    let store = CertStore::load(&cfg.acme.store_path)?;
    let issuer = Arc::new(HttpIssuer::new(
        http.http_client(),
        cfg.acme.issuer_url.clone(),
        cfg.acme.account_key.clone(),
        cfg.acme.contact.clone(),
    ));
    let certs = portico::certs::actor::spawn(CertActorArgs {
        store,
        issuer,
        keys: keys.clone(),
        hosts: cfg.tls_hosts(),
        account_key: cfg.acme.account_key.clone(),
        renew_before: chrono::Duration::days(cfg.acme.renew_before_days),
        retry_delay: Duration::from_secs(cfg.acme.retry_secs),
        renew_interval: Duration::from_secs(3600),
    })
    .await?;

    let upstreams = cfg.proxied_upstreams();
    let health = HealthRegistry::new(&upstreams);
    spawn_prober(
        health.clone(),
        http.http_client(),
        upstreams,
        Duration::from_secs(30),
    );

    let table = Arc::new(portico::RouterTable::from_config(cfg));
    let dashboard = dashboard_router(DashboardState::new(cfg, table.clone(), certs.clone(), health));
    let state = portico::router::EdgeState::new(cfg, table, http, certs, dashboard);
    let secure = portico::router::secure_app(state.clone());
    let plain = portico::router::plain_app(state.clone());

    let web_listener =
        TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], cfg.entrypoints.web))).await?;
    let secure_listener =
        TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], cfg.entrypoints.websecure))).await?;
    let dashboard_ip: IpAddr = if cfg.dashboard.insecure {
        Ipv4Addr::UNSPECIFIED.into()
    } else {
        Ipv4Addr::LOCALHOST.into()
    };
    let dashboard_listener =
        TcpListener::bind(SocketAddr::new(dashboard_ip, cfg.entrypoints.dashboard)).await?;
    info!(
        web = %web_listener.local_addr()?,
        websecure = %secure_listener.local_addr()?,
        dashboard = %dashboard_listener.local_addr()?,
        "entrypoints listening"
    );

    let tls_config = Arc::new(portico::tls::server_config(keys)?);

    tokio::select! {
        r = axum::serve(web_listener, plain) => r?,
        r = portico::tls::serve(secure_listener, tls_config, secure) => r?,
        r = axum::serve(dashboard_listener, state.dashboard.clone()) => r?,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }
    Ok(())
}
