use serde::Serialize;

use crate::config::Config;
use crate::rules::matcher::{Rule, normalize_host};

/// Logical service a matched request is dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteTarget {
    Frontend,
    Backend,
    Adminer,
    Dashboard,
}

#[derive(Debug, Clone)]
pub struct Route {
    pub name: String,
    pub rule: Rule,
    pub priority: usize,
    pub target: RouteTarget,
}

/// Ordered routing table for the TLS entrypoint. Built once from config and
/// treated as immutable per request; `select` walks routes in descending
/// priority and returns the first match.
#[derive(Debug, Clone)]
pub struct RouterTable {
    routes: Vec<Route>,
}

impl RouterTable {
    pub fn from_config(cfg: &Config) -> Self {
        let mut routes = Vec::new();

        let backend_rule =
            Rule::host_with_prefixes(cfg.domain.clone(), &cfg.services.backend_prefixes);
        routes.push(Route {
            name: "backend".to_string(),
            priority: backend_rule.priority(),
            rule: backend_rule,
            target: RouteTarget::Backend,
        });

        let frontend_rule = Rule::host(cfg.domain.clone());
        routes.push(Route {
            name: "frontend".to_string(),
            priority: frontend_rule.priority(),
            rule: frontend_rule,
            target: RouteTarget::Frontend,
        });

        let adminer_rule = Rule::host(cfg.db_host());
        routes.push(Route {
            name: "adminer".to_string(),
            priority: adminer_rule.priority(),
            rule: adminer_rule,
            target: RouteTarget::Adminer,
        });

        if cfg.dashboard.enabled {
            let dashboard_rule = Rule::host(cfg.proxy_host());
            routes.push(Route {
                name: "dashboard".to_string(),
                priority: dashboard_rule.priority(),
                rule: dashboard_rule,
                target: RouteTarget::Dashboard,
            });
        }

        // Stable sort keeps insertion order for equal priorities.
        routes.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self { routes }
    }

    /// Pick the handling service for a request. `host` may be a raw Host
    /// header value (port and case are normalized here).
    pub fn select(&self, host: &str, path: &str) -> Option<RouteTarget> {
        let host = normalize_host(host);
        self.routes
            .iter()
            .find(|route| route.rule.matches(&host, path))
            .map(|route| route.target)
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }
}
