use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::LazyLock;
use url::Url;

use crate::error::PorticoError;

/// Global runtime configuration. Layered: built-in defaults, then
/// `portico.toml`, then `PORTICO_*` environment variables (nested fields
/// separated by `__`, e.g. `PORTICO_ENTRYPOINTS__WEB=8080`).
pub static CONFIG: LazyLock<Config> = LazyLock::new(|| match Config::load() {
    Ok(cfg) => cfg,
    Err(e) => {
        eprintln!("FATAL: invalid configuration: {e}");
        std::process::exit(1);
    }
});

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Apex domain every hostname rule is derived from.
    pub domain: String,
    pub loglevel: String,
    pub entrypoints: Entrypoints,
    pub services: Services,
    pub dashboard: Dashboard,
    pub acme: Acme,
    pub prestart: Prestart,
}

/// Listening ports of the edge router. One port per entrypoint; the table is
/// validated as a whole so a duplicate assignment is caught at startup rather
/// than surfacing as a bind race.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Entrypoints {
    /// Plaintext entrypoint; serves ACME challenges and redirects to TLS.
    pub web: u16,
    /// TLS entrypoint; all routed traffic enters here.
    pub websecure: u16,
    /// Dashboard API entrypoint, loopback-only unless `dashboard.insecure`.
    pub dashboard: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Services {
    /// Proxied frontend. Mutually exclusive with `frontend_static_root`.
    pub frontend_upstream: Option<Url>,
    /// Serve the frontend bundle directly from this directory.
    pub frontend_static_root: Option<PathBuf>,
    pub backend_upstream: Url,
    /// Path prefixes on the apex host that belong to the backend.
    pub backend_prefixes: Vec<String>,
    pub adminer_upstream: Url,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Dashboard {
    pub enabled: bool,
    /// Shared key required for dashboard API calls (compared constant-time).
    pub key: String,
    /// Bind the dashboard entrypoint on all interfaces instead of loopback.
    pub insecure: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Acme {
    /// Issuance endpoint performing the HTTP-01 validation.
    pub issuer_url: Url,
    /// Account key registered with the issuer; also bound into the challenge
    /// key authorization.
    pub account_key: String,
    pub contact: Option<String>,
    /// JSON certificate store, persisted across restarts.
    pub store_path: PathBuf,
    pub renew_before_days: i64,
    /// Delay before retrying a failed issuance.
    pub retry_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Prestart {
    /// Upper bound on the upstream readiness wait before giving up.
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            domain: "localhost".to_string(),
            loglevel: "info".to_string(),
            entrypoints: Entrypoints::default(),
            services: Services::default(),
            dashboard: Dashboard::default(),
            acme: Acme::default(),
            prestart: Prestart::default(),
        }
    }
}

impl Default for Entrypoints {
    fn default() -> Self {
        Self {
            web: 80,
            websecure: 443,
            dashboard: 8090,
        }
    }
}

impl Default for Services {
    fn default() -> Self {
        Self {
            frontend_upstream: None,
            frontend_static_root: Some(PathBuf::from("./dist")),
            backend_upstream: parse_static_url("http://127.0.0.1:8000"),
            backend_prefixes: vec![
                "/api".to_string(),
                "/docs".to_string(),
                "/redoc".to_string(),
            ],
            adminer_upstream: parse_static_url("http://127.0.0.1:8080"),
        }
    }
}

impl Default for Dashboard {
    fn default() -> Self {
        Self {
            enabled: true,
            key: String::new(),
            insecure: false,
        }
    }
}

impl Default for Acme {
    fn default() -> Self {
        Self {
            issuer_url: parse_static_url("https://127.0.0.1:14000"),
            account_key: String::new(),
            contact: None,
            store_path: PathBuf::from("./certs/store.json"),
            renew_before_days: 30,
            retry_secs: 60,
        }
    }
}

impl Default for Prestart {
    fn default() -> Self {
        Self { timeout_secs: 120 }
    }
}

fn parse_static_url(s: &str) -> Url {
    match Url::parse(s) {
        Ok(u) => u,
        Err(_) => unreachable!("built-in default URL must parse"),
    }
}

impl Config {
    pub fn load() -> Result<Self, PorticoError> {
        let cfg: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("portico.toml"))
            .merge(Env::prefixed("PORTICO_").split("__"))
            .extract()
            .map_err(|e| PorticoError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), PorticoError> {
        if self.domain.is_empty() {
            return Err(PorticoError::Config("domain must not be empty".into()));
        }
        if self.domain.contains('/') || self.domain.contains(':') {
            return Err(PorticoError::Config(format!(
                "domain must be a bare hostname, got {:?}",
                self.domain
            )));
        }

        // Entrypoint ports are a single table; duplicates are a hard error.
        let ports = [
            ("web", self.entrypoints.web),
            ("websecure", self.entrypoints.websecure),
            ("dashboard", self.entrypoints.dashboard),
        ];
        let mut seen: HashSet<u16> = HashSet::new();
        for (name, port) in ports {
            if !seen.insert(port) {
                return Err(PorticoError::Config(format!(
                    "entrypoint {name} reuses port {port} already assigned to another entrypoint"
                )));
            }
        }

        match (
            &self.services.frontend_upstream,
            &self.services.frontend_static_root,
        ) {
            (Some(_), Some(_)) => {
                return Err(PorticoError::Config(
                    "frontend_upstream and frontend_static_root are mutually exclusive".into(),
                ));
            }
            (None, None) => {
                return Err(PorticoError::Config(
                    "one of frontend_upstream or frontend_static_root must be set".into(),
                ));
            }
            _ => {}
        }

        for prefix in &self.services.backend_prefixes {
            if !prefix.starts_with('/') || prefix.len() < 2 {
                return Err(PorticoError::Config(format!(
                    "backend prefix {prefix:?} must start with '/' and not be bare"
                )));
            }
        }
        if self.services.backend_prefixes.is_empty() {
            return Err(PorticoError::Config(
                "at least one backend path prefix is required".into(),
            ));
        }

        if self.dashboard.enabled && self.dashboard.key.is_empty() {
            return Err(PorticoError::Config(
                "dashboard.key must be set when the dashboard is enabled".into(),
            ));
        }

        if self.acme.renew_before_days < 1 {
            return Err(PorticoError::Config(
                "acme.renew_before_days must be at least 1".into(),
            ));
        }

        Ok(())
    }

    pub fn db_host(&self) -> String {
        format!("db.{}", self.domain)
    }

    pub fn proxy_host(&self) -> String {
        format!("proxy.{}", self.domain)
    }

    pub fn www_host(&self) -> String {
        format!("www.{}", self.domain)
    }

    /// Every hostname the TLS entrypoint must hold a certificate for.
    pub fn tls_hosts(&self) -> Vec<String> {
        let mut hosts = vec![self.domain.clone(), self.www_host(), self.db_host()];
        if self.dashboard.enabled {
            hosts.push(self.proxy_host());
        }
        hosts
    }

    /// Upstreams the router proxies to; the pre-start gate waits on these.
    pub fn proxied_upstreams(&self) -> Vec<(String, Url)> {
        let mut upstreams = vec![
            ("backend".to_string(), self.services.backend_upstream.clone()),
            ("adminer".to_string(), self.services.adminer_upstream.clone()),
        ];
        if let Some(frontend) = &self.services.frontend_upstream {
            upstreams.push(("frontend".to_string(), frontend.clone()));
        }
        upstreams
    }
}
