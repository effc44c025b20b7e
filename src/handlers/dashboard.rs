//! Dashboard API: the `proxy.<domain>` service. Read-only introspection of
//! the routing table, entrypoints, upstream health, and certificate state.

use axum::{Json, Router, extract::State, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::certs::CertHandle;
use crate::config::Config;
use crate::error::PorticoError;
use crate::middleware::dashboard_auth::RequireDashboardKey;
use crate::rules::RouterTable;
use crate::service::health::HealthRegistry;

#[derive(Debug, Clone, Serialize)]
pub struct EntrypointsInfo {
    pub web: u16,
    pub websecure: u16,
    pub dashboard: u16,
}

#[derive(Clone)]
pub struct DashboardState {
    pub key: Arc<str>,
    pub domain: String,
    pub entrypoints: EntrypointsInfo,
    pub started_at: DateTime<Utc>,
    pub table: Arc<RouterTable>,
    pub certs: CertHandle,
    pub health: Arc<HealthRegistry>,
}

impl DashboardState {
    pub fn new(
        cfg: &Config,
        table: Arc<RouterTable>,
        certs: CertHandle,
        health: Arc<HealthRegistry>,
    ) -> Self {
        Self {
            key: Arc::from(cfg.dashboard.key.as_str()),
            domain: cfg.domain.clone(),
            entrypoints: EntrypointsInfo {
                web: cfg.entrypoints.web,
                websecure: cfg.entrypoints.websecure,
                dashboard: cfg.entrypoints.dashboard,
            },
            started_at: Utc::now(),
            table,
            certs,
            health,
        }
    }
}

pub fn dashboard_router(state: DashboardState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/overview", get(overview))
        .route("/api/entrypoints", get(entrypoints))
        .route("/api/routes", get(routes))
        .route("/api/services", get(services))
        .route("/api/certs", get(certs))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn overview(
    State(state): State<DashboardState>,
    _auth: RequireDashboardKey,
) -> Json<Value> {
    let uptime_secs = (Utc::now() - state.started_at).num_seconds();
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "domain": state.domain,
        "uptime_secs": uptime_secs,
        "routes": state.table.routes().len(),
        "entrypoints": state.entrypoints,
    }))
}

async fn entrypoints(
    State(state): State<DashboardState>,
    _auth: RequireDashboardKey,
) -> Json<Value> {
    Json(json!({"entrypoints": state.entrypoints}))
}

async fn routes(State(state): State<DashboardState>, _auth: RequireDashboardKey) -> Json<Value> {
    let routes: Vec<Value> = state
        .table
        .routes()
        .iter()
        .map(|route| {
            json!({
                "name": route.name,
                "rule": route.rule.render(),
                "priority": route.priority,
                "target": route.target,
            })
        })
        .collect();
    Json(json!({"routes": routes}))
}

async fn services(State(state): State<DashboardState>, _auth: RequireDashboardKey) -> Json<Value> {
    Json(json!({"services": state.health.snapshot()}))
}

async fn certs(
    State(state): State<DashboardState>,
    _auth: RequireDashboardKey,
) -> Result<Json<Value>, PorticoError> {
    let snapshot = state.certs.snapshot().await?;
    Ok(Json(json!({"certificates": snapshot})))
}
