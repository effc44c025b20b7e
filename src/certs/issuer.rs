use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::error::{IsRetryable, PorticoError};

/// PEM bundle handed back by a successful issuance.
#[derive(Debug, Clone)]
pub struct IssuedCert {
    pub cert_pem: String,
    pub key_pem: String,
    pub not_after: DateTime<Utc>,
}

/// Performs certificate issuance for one hostname. By the time `issue` is
/// called the challenge token is already being served on the plaintext
/// entrypoint, so the issuer can validate it at any point.
#[async_trait]
pub trait Issuer: Send + Sync {
    async fn issue(&self, host: &str, token: &str) -> Result<IssuedCert, PorticoError>;
}

/// Issuance over the issuer's HTTP API: create an order carrying the
/// HTTP-01 token, then poll it until the issuer has validated
/// `http://<host>/.well-known/acme-challenge/<token>` and signed a
/// certificate.
pub struct HttpIssuer {
    client: reqwest::Client,
    endpoint: Url,
    account_key: String,
    contact: Option<String>,
}

#[derive(Serialize)]
struct OrderRequest<'a> {
    identifier: &'a str,
    challenge: ChallengePart<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    contact: Option<&'a str>,
}

#[derive(Serialize)]
struct ChallengePart<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    token: &'a str,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    status: OrderStatus,
    #[serde(default)]
    certificate_pem: Option<String>,
    #[serde(default)]
    private_key_pem: Option<String>,
    #[serde(default)]
    not_after: Option<DateTime<Utc>>,
    #[serde(default)]
    detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum OrderStatus {
    Pending,
    Processing,
    Valid,
    Invalid,
}

impl HttpIssuer {
    pub fn new(
        client: reqwest::Client,
        endpoint: Url,
        account_key: String,
        contact: Option<String>,
    ) -> Self {
        Self {
            client,
            endpoint,
            account_key,
            contact,
        }
    }

    fn orders_url(&self) -> Result<Url, PorticoError> {
        Ok(self.endpoint.join("/v1/orders")?)
    }

    fn order_url(&self, id: &str) -> Result<Url, PorticoError> {
        Ok(self.endpoint.join(&format!("/v1/orders/{id}"))?)
    }

    async fn create_order(&self, host: &str, token: &str) -> Result<OrderResponse, PorticoError> {
        let body = OrderRequest {
            identifier: host,
            challenge: ChallengePart {
                kind: "http-01",
                token,
            },
            contact: self.contact.as_deref(),
        };
        let resp = self
            .client
            .post(self.orders_url()?)
            .bearer_auth(&self.account_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }

    async fn poll_order(&self, host: &str, id: &str) -> Result<OrderResponse, PorticoError> {
        let resp = self
            .client
            .get(self.order_url(id)?)
            .bearer_auth(&self.account_key)
            .send()
            .await?
            .error_for_status()?;
        let order: OrderResponse = resp.json().await?;
        match order.status {
            OrderStatus::Valid => Ok(order),
            OrderStatus::Pending | OrderStatus::Processing => Err(PorticoError::IssuancePending {
                host: host.to_string(),
            }),
            OrderStatus::Invalid => Err(PorticoError::Issuance {
                host: host.to_string(),
                reason: order
                    .detail
                    .unwrap_or_else(|| "order marked invalid".to_string()),
            }),
        }
    }
}

fn poll_policy() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(1))
        .with_max_delay(Duration::from_secs(15))
        .with_max_times(10)
        .with_jitter()
}

#[async_trait]
impl Issuer for HttpIssuer {
    async fn issue(&self, host: &str, token: &str) -> Result<IssuedCert, PorticoError> {
        let order = self.create_order(host, token).await?;
        debug!(host, order_id = %order.id, "certificate order created");

        let order = (|| async { self.poll_order(host, &order.id).await })
            .retry(poll_policy())
            .when(|e: &PorticoError| e.is_retryable())
            .notify(|err, dur: Duration| {
                warn!(host, "order not ready ({err}), polling again in {dur:?}");
            })
            .await?;

        let (Some(cert_pem), Some(key_pem), Some(not_after)) =
            (order.certificate_pem, order.private_key_pem, order.not_after)
        else {
            return Err(PorticoError::Issuance {
                host: host.to_string(),
                reason: "valid order missing certificate material".to_string(),
            });
        };
        Ok(IssuedCert {
            cert_pem,
            key_pem,
            not_after,
        })
    }
}
