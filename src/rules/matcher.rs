//! Host/path request matchers.
//!
//! A rule is a host matcher plus an optional set of path prefixes. Rules are
//! rendered to a canonical text form, and a rule's default priority is the
//! length of that text: a host+prefix rule is textually longer than the
//! host-only rule for the same host, so the more specific rule wins without
//! anyone having to hand-assign priorities.

/// Matches the host portion of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostMatcher {
    /// Case-insensitive exact hostname match (port stripped beforehand).
    Exact(String),
    /// Catch-all, matches every host.
    Any,
}

impl HostMatcher {
    pub fn matches(&self, host: &str) -> bool {
        match self {
            HostMatcher::Exact(expected) => expected.eq_ignore_ascii_case(host),
            HostMatcher::Any => true,
        }
    }

    fn render(&self) -> String {
        match self {
            HostMatcher::Exact(host) => format!("Host(`{host}`)"),
            HostMatcher::Any => "HostRegexp(`.+`)".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    host: HostMatcher,
    path_prefixes: Vec<String>,
}

impl Rule {
    /// Host-only rule: matches every path on `host`.
    pub fn host(host: impl Into<String>) -> Self {
        Self {
            host: HostMatcher::Exact(host.into()),
            path_prefixes: Vec::new(),
        }
    }

    /// Host rule restricted to the given path prefixes.
    pub fn host_with_prefixes(host: impl Into<String>, prefixes: &[String]) -> Self {
        Self {
            host: HostMatcher::Exact(host.into()),
            path_prefixes: prefixes.to_vec(),
        }
    }

    pub fn any_host() -> Self {
        Self {
            host: HostMatcher::Any,
            path_prefixes: Vec::new(),
        }
    }

    pub fn matches(&self, host: &str, path: &str) -> bool {
        if !self.host.matches(host) {
            return false;
        }
        if self.path_prefixes.is_empty() {
            return true;
        }
        self.path_prefixes
            .iter()
            .any(|prefix| prefix_matches(path, prefix))
    }

    /// Canonical text form, e.g.
    /// ``Host(`example.com`) && (PathPrefix(`/api`) || PathPrefix(`/docs`))``.
    pub fn render(&self) -> String {
        let host = self.host.render();
        if self.path_prefixes.is_empty() {
            return host;
        }
        let prefixes = self
            .path_prefixes
            .iter()
            .map(|p| format!("PathPrefix(`{p}`)"))
            .collect::<Vec<_>>()
            .join(" || ");
        if self.path_prefixes.len() == 1 {
            format!("{host} && {prefixes}")
        } else {
            format!("{host} && ({prefixes})")
        }
    }

    /// Default priority: length of the rendered rule. More specific rules
    /// render longer and therefore outrank broader ones.
    pub fn priority(&self) -> usize {
        self.render().chars().count()
    }
}

/// Prefix match at path segment boundaries: `/api` matches `/api` and
/// `/api/x` but not `/apix`.
fn prefix_matches(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Lowercase a raw `Host` header value and strip any port suffix.
pub fn normalize_host(raw: &str) -> String {
    let raw = raw.trim();
    let without_port = if let Some(rest) = raw.strip_prefix('[') {
        // Bracketed IPv6 literal, keep everything inside the brackets.
        rest.split(']').next().unwrap_or(rest)
    } else {
        raw.split(':').next().unwrap_or(raw)
    };
    without_port.to_ascii_lowercase()
}
