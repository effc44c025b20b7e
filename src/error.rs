use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error as ThisError;

/// Errors that can be retried (network weather, issuance still in flight).
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

#[derive(Debug, ThisError)]
pub enum PorticoError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP message error: {0}")]
    Http(#[from] axum::http::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("invalid PEM material: {0}")]
    InvalidPem(String),

    #[error("actor error: {0}")]
    Actor(String),

    #[error("upstream timed out: {0}")]
    UpstreamTimeout(String),

    #[error("upstream not ready: {0}")]
    UpstreamUnavailable(String),

    #[error("certificate issuance failed for {host}: {reason}")]
    Issuance { host: String, reason: String },

    #[error("certificate order for {host} still pending")]
    IssuancePending { host: String },

    #[error("no certificate available for {0}")]
    NoCertificate(String),
}

impl IsRetryable for PorticoError {
    fn is_retryable(&self) -> bool {
        match self {
            PorticoError::Reqwest(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            PorticoError::UpstreamTimeout(_)
            | PorticoError::UpstreamUnavailable(_)
            | PorticoError::IssuancePending { .. } => true,
            _ => false,
        }
    }
}

impl IntoResponse for PorticoError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_body) = match self {
            PorticoError::Reqwest(_) | PorticoError::UrlParse(_) => (
                StatusCode::BAD_GATEWAY,
                ApiErrorBody {
                    code: "BAD_GATEWAY".to_string(),
                    message: "Upstream service is unavailable.".to_string(),
                },
            ),
            PorticoError::UpstreamTimeout(_) => (
                StatusCode::GATEWAY_TIMEOUT,
                ApiErrorBody {
                    code: "GATEWAY_TIMEOUT".to_string(),
                    message: "Upstream service timed out.".to_string(),
                },
            ),
            PorticoError::UpstreamUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ApiErrorBody {
                    code: "UPSTREAM_NOT_READY".to_string(),
                    message: "Upstream service is not ready.".to_string(),
                },
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorBody {
                    code: "INTERNAL_ERROR".to_string(),
                    message: "An internal server error occurred.".to_string(),
                },
            ),
        };
        (status, Json(ApiErrorResponse { error: error_body })).into_response()
    }
}

/// Standardized API error response body
#[derive(Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}
