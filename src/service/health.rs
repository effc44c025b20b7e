use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Unknown,
    Up,
    Degraded,
    Down,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub name: String,
    pub url: String,
    pub status: HealthStatus,
    pub latency_ms: Option<u64>,
    pub checked_at: Option<DateTime<Utc>>,
}

/// Last-known health of every proxied upstream, fed by the background prober
/// and read by the dashboard.
#[derive(Debug)]
pub struct HealthRegistry {
    services: RwLock<HashMap<String, ServiceHealth>>,
}

impl HealthRegistry {
    pub fn new(targets: &[(String, Url)]) -> Arc<Self> {
        let services = targets
            .iter()
            .map(|(name, url)| {
                (
                    name.clone(),
                    ServiceHealth {
                        name: name.clone(),
                        url: url.to_string(),
                        status: HealthStatus::Unknown,
                        latency_ms: None,
                        checked_at: None,
                    },
                )
            })
            .collect();
        Arc::new(Self {
            services: RwLock::new(services),
        })
    }

    pub fn record(&self, name: &str, status: HealthStatus, latency_ms: Option<u64>) {
        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = services.get_mut(name) {
            entry.status = status;
            entry.latency_ms = latency_ms;
            entry.checked_at = Some(Utc::now());
        }
    }

    pub fn snapshot(&self) -> Vec<ServiceHealth> {
        let services = self.services.read().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<ServiceHealth> = services.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }
}

/// Probe each upstream on an interval. Any HTTP answer below 5xx counts as
/// up; a 5xx answer is degraded; a transport error is down.
pub fn spawn_prober(
    registry: Arc<HealthRegistry>,
    client: reqwest::Client,
    targets: Vec<(String, Url)>,
    interval: Duration,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            for (name, url) in &targets {
                let started = Instant::now();
                let outcome = client
                    .get(url.clone())
                    .timeout(Duration::from_secs(5))
                    .send()
                    .await;
                let latency = started.elapsed().as_millis() as u64;
                let status = match outcome {
                    Ok(resp) if resp.status().is_server_error() => HealthStatus::Degraded,
                    Ok(_) => HealthStatus::Up,
                    Err(e) => {
                        debug!(service = name, "health probe failed: {e}");
                        HealthStatus::Down
                    }
                };
                registry.record(name, status, Some(latency));
            }
        }
    });
}
