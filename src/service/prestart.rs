//! Pre-start gate: everything in here must complete before any entrypoint
//! binds. The process either comes up with all proxied upstreams answering,
//! or exits non-zero.

use backon::{ExponentialBuilder, Retryable};
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

use crate::config::Config;
use crate::error::{IsRetryable, PorticoError};

pub async fn run(cfg: &Config, client: &reqwest::Client) -> Result<(), PorticoError> {
    cfg.validate()?;
    for (name, url) in cfg.proxied_upstreams() {
        wait_ready(&name, &url, client, cfg.prestart.timeout_secs).await?;
    }
    info!("pre-start gate passed; all upstreams answering");
    Ok(())
}

/// Poll an upstream until it answers any HTTP response. A response at all
/// (even a 5xx) means the process is up and accepting connections, which is
/// what the bind-ordering contract needs.
async fn wait_ready(
    name: &str,
    url: &Url,
    client: &reqwest::Client,
    timeout_secs: u64,
) -> Result<(), PorticoError> {
    let max_times = (timeout_secs / 5).max(1) as usize;
    let policy = ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(1))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(max_times)
        .with_jitter();

    (|| async {
        client
            .get(url.clone())
            .timeout(Duration::from_secs(5))
            .send()
            .await?;
        Ok::<(), PorticoError>(())
    })
    .retry(policy)
    .when(|e: &PorticoError| e.is_retryable())
    .notify(|err, dur: Duration| {
        warn!(service = name, "upstream not ready ({err}), retrying in {dur:?}");
    })
    .await
    .map_err(|e| PorticoError::UpstreamUnavailable(format!("{name} at {url}: {e}")))?;

    info!(service = name, url = %url, "upstream ready");
    Ok(())
}
