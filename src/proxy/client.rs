use axum::{
    body::Body,
    extract::Request,
    http::{HeaderMap, HeaderName, HeaderValue, Method, header},
    response::Response,
};
use std::net::SocketAddr;
use std::time::Duration;
use url::Url;

use crate::error::PorticoError;

/// Peer address of the accepted connection, threaded through as a request
/// extension by the entrypoint accept loops.
#[derive(Debug, Clone, Copy)]
pub struct ClientAddr(pub SocketAddr);

/// Connection-scoped headers that must not cross the proxy.
fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// Streaming forwarder to a proxied upstream.
#[derive(Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
}

impl UpstreamClient {
    pub fn new() -> Result<Self, PorticoError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            // No global timeout: responses may stream for a long time.
            .build()?;
        Ok(Self { client })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn http_client(&self) -> reqwest::Client {
        self.client.clone()
    }

    /// Forward `req` to `upstream`, streaming the body both ways. Hop-by-hop
    /// headers are stripped in both directions; `X-Forwarded-For/Proto/Host`
    /// are injected on the way up. Upstream HTTP error statuses pass through
    /// untouched.
    pub async fn forward(
        &self,
        upstream: &Url,
        proto: &str,
        peer: Option<SocketAddr>,
        req: Request,
    ) -> Result<Response, PorticoError> {
        let (parts, body) = req.into_parts();

        let mut target = upstream.clone();
        target.set_path(parts.uri.path());
        target.set_query(parts.uri.query());

        let mut headers = HeaderMap::with_capacity(parts.headers.len() + 3);
        let mut forwarded_host = None;
        for (name, value) in parts.headers.iter() {
            if name == header::HOST {
                forwarded_host = Some(value.clone());
                continue;
            }
            if is_hop_by_hop(name) {
                continue;
            }
            headers.append(name, value.clone());
        }

        if let Some(peer) = peer {
            let chain = match parts.headers.get("x-forwarded-for") {
                Some(existing) => match existing.to_str() {
                    Ok(prior) => format!("{prior}, {}", peer.ip()),
                    Err(_) => peer.ip().to_string(),
                },
                None => peer.ip().to_string(),
            };
            if let Ok(value) = HeaderValue::from_str(&chain) {
                headers.insert("x-forwarded-for", value);
            }
        }
        if let Ok(value) = HeaderValue::from_str(proto) {
            headers.insert("x-forwarded-proto", value);
        }
        if let Some(host) = forwarded_host {
            headers.insert("x-forwarded-host", host);
        }

        let mut builder = self
            .client
            .request(parts.method.clone(), target.clone())
            .headers(headers);

        if request_has_body(&parts.method, &parts.headers) {
            builder = builder.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        let upstream_resp = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                PorticoError::UpstreamTimeout(target.to_string())
            } else {
                PorticoError::from(e)
            }
        })?;

        let mut response = Response::builder().status(upstream_resp.status());
        if let Some(resp_headers) = response.headers_mut() {
            for (name, value) in upstream_resp.headers() {
                if !is_hop_by_hop(name) {
                    resp_headers.append(name, value.clone());
                }
            }
        }
        Ok(response.body(Body::from_stream(upstream_resp.bytes_stream()))?)
    }
}

/// GET/HEAD requests without framing headers get no body attached, so plain
/// fetches are not turned into chunked uploads.
fn request_has_body(method: &Method, headers: &HeaderMap) -> bool {
    if headers.contains_key(header::CONTENT_LENGTH)
        || headers.contains_key(header::TRANSFER_ENCODING)
    {
        return true;
    }
    !matches!(*method, Method::GET | Method::HEAD)
}
