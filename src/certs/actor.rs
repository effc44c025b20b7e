use chrono::{DateTime, Duration as ChronoDuration, Utc};
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::certs::challenge;
use crate::certs::issuer::{IssuedCert, Issuer};
use crate::certs::store::{CertStore, StoredCert};
use crate::error::PorticoError;
use crate::tls::TlsKeyMap;

/// Public messages handled by the certificate actor.
#[derive(Debug)]
pub enum CertMessage {
    /// Re-check every configured host; issue/renew where needed.
    EnsureAll,
    /// Check one host; start issuance unless a valid cert is installed.
    EnsureHost(String),
    /// Key authorization for an in-flight challenge token, None otherwise.
    ChallengeResponse(String, RpcReplyPort<Option<String>>),
    /// Per-host certificate state for the dashboard.
    Snapshot(RpcReplyPort<Vec<CertStatus>>),

    // Internal messages (sent by the actor itself)
    /// An issuance task finished; persist and install on success.
    IssueComplete {
        host: String,
        result: Result<IssuedCert, PorticoError>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct CertStatus {
    pub host: String,
    pub state: String,
    pub not_after: Option<DateTime<Utc>>,
}

/// Handle for interacting with the certificate actor.
#[derive(Clone)]
pub struct CertHandle {
    actor: ActorRef<CertMessage>,
}

impl CertHandle {
    pub fn ensure_all(&self) {
        let _ = ractor::cast!(self.actor, CertMessage::EnsureAll);
    }

    pub fn ensure_host(&self, host: impl Into<String>) {
        let _ = ractor::cast!(self.actor, CertMessage::EnsureHost(host.into()));
    }

    /// Look up the response body for a served challenge token.
    pub async fn challenge_response(&self, token: &str) -> Result<Option<String>, PorticoError> {
        ractor::call!(self.actor, CertMessage::ChallengeResponse, token.to_string())
            .map_err(|e| PorticoError::Actor(format!("ChallengeResponse RPC failed: {e}")))
    }

    pub async fn snapshot(&self) -> Result<Vec<CertStatus>, PorticoError> {
        ractor::call!(self.actor, CertMessage::Snapshot)
            .map_err(|e| PorticoError::Actor(format!("Snapshot RPC failed: {e}")))
    }
}

pub struct CertActorArgs {
    pub store: CertStore,
    pub issuer: Arc<dyn Issuer>,
    pub keys: Arc<TlsKeyMap>,
    /// Hostnames this entrypoint must be able to terminate.
    pub hosts: Vec<String>,
    pub account_key: String,
    pub renew_before: ChronoDuration,
    pub retry_delay: Duration,
    pub renew_interval: Duration,
}

#[derive(Debug, Clone)]
struct PendingChallenge {
    token: String,
    key_auth: String,
}

/// Internal state held by the ractor-driven certificate actor.
struct CertActorState {
    store: CertStore,
    issuer: Arc<dyn Issuer>,
    keys: Arc<TlsKeyMap>,
    hosts: Vec<String>,
    account_key: String,
    renew_before: ChronoDuration,
    retry_delay: Duration,
    pending: HashMap<String, PendingChallenge>,
}

struct CertActor;

#[ractor::async_trait]
impl Actor for CertActor {
    type Msg = CertMessage;
    type State = CertActorState;
    type Arguments = CertActorArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        // Make persisted certs live before the first issuance pass.
        let mut installed = 0usize;
        for cert in args.store.records() {
            match args.keys.install(&cert.host, &cert.cert_pem, &cert.key_pem) {
                Ok(()) => installed += 1,
                Err(e) => warn!(host = %cert.host, error = %e, "stored certificate unusable"),
            }
        }
        info!(
            stored = args.store.len(),
            installed,
            hosts = args.hosts.len(),
            "CertActor started from store"
        );

        // Renewal ticker; the first tick fires immediately and covers the
        // initial issuance pass.
        let ticker = myself.clone();
        let renew_interval = args.renew_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(renew_interval);
            loop {
                interval.tick().await;
                if ticker.cast(CertMessage::EnsureAll).is_err() {
                    break;
                }
            }
        });

        Ok(CertActorState {
            store: args.store,
            issuer: args.issuer,
            keys: args.keys,
            hosts: args.hosts,
            account_key: args.account_key,
            renew_before: args.renew_before,
            retry_delay: args.retry_delay,
            pending: HashMap::new(),
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            CertMessage::EnsureAll => {
                for host in state.hosts.clone() {
                    let _ = myself.cast(CertMessage::EnsureHost(host));
                }
            }
            CertMessage::EnsureHost(host) => {
                self.handle_ensure_host(state, &myself, host);
            }
            CertMessage::ChallengeResponse(token, reply_port) => {
                let key_auth = state
                    .pending
                    .values()
                    .find(|p| p.token == token)
                    .map(|p| p.key_auth.clone());
                let _ = reply_port.send(key_auth);
            }
            CertMessage::IssueComplete { host, result } => {
                self.handle_issue_complete(state, &myself, host, result);
            }
            CertMessage::Snapshot(reply_port) => {
                let _ = reply_port.send(self.snapshot(state));
            }
        }
        Ok(())
    }
}

impl CertActor {
    fn handle_ensure_host(
        &self,
        state: &mut CertActorState,
        myself: &ActorRef<CertMessage>,
        host: String,
    ) {
        if state.pending.contains_key(&host) {
            debug!(host, "issuance already in flight; skip duplicate");
            return;
        }

        let mut drop_stored = false;
        if let Some(cert) = state.store.get(&host)
            && !cert.needs_renewal(state.renew_before)
        {
            // Cert is fine; just make sure it is live in the resolver.
            if state.keys.contains(&host) {
                return;
            }
            match state.keys.install(&host, &cert.cert_pem, &cert.key_pem) {
                Ok(()) => return,
                Err(e) => {
                    // A record that cannot produce a live key counts as
                    // missing, not healthy.
                    warn!(host, error = %e, "stored certificate unusable; reissuing");
                    drop_stored = true;
                }
            }
        }
        if drop_stored && let Err(e) = state.store.remove(&host) {
            warn!(host, error = %e, "failed to remove unusable certificate");
        }

        let token = challenge::new_token();
        let key_auth = challenge::key_authorization(&token, &state.account_key);
        state.pending.insert(
            host.clone(),
            PendingChallenge {
                token: token.clone(),
                key_auth,
            },
        );
        info!(host, "certificate issuance started");

        let issuer = state.issuer.clone();
        let me = myself.clone();
        tokio::spawn(async move {
            let result = issuer.issue(&host, &token).await;
            let _ = ractor::cast!(me, CertMessage::IssueComplete { host, result });
        });
    }

    fn handle_issue_complete(
        &self,
        state: &mut CertActorState,
        myself: &ActorRef<CertMessage>,
        host: String,
        result: Result<IssuedCert, PorticoError>,
    ) {
        state.pending.remove(&host);
        let issued = match result {
            Ok(issued) => issued,
            Err(e) => {
                // Fail closed: the host simply has no live key until a retry
                // succeeds.
                warn!(
                    host,
                    error = %e,
                    "issuance failed; retrying in {:?}",
                    state.retry_delay
                );
                self.schedule_retry(state, myself, host);
                return;
            }
        };

        // Install before persist; a bundle that does not yield a live key is
        // retried, never stored or reported ready.
        if let Err(e) = state.keys.install(&host, &issued.cert_pem, &issued.key_pem) {
            warn!(
                host,
                error = %e,
                "issued certificate failed to install; retrying in {:?}",
                state.retry_delay
            );
            self.schedule_retry(state, myself, host);
            return;
        }

        let stored = StoredCert {
            host: host.clone(),
            cert_pem: issued.cert_pem,
            key_pem: issued.key_pem,
            issued_at: Utc::now(),
            not_after: issued.not_after,
        };
        let not_after = stored.not_after;
        if let Err(e) = state.store.insert(stored) {
            warn!(host, error = %e, "failed to persist issued certificate");
        }
        info!(host, not_after = %not_after, "certificate issued");
    }

    fn schedule_retry(
        &self,
        state: &CertActorState,
        myself: &ActorRef<CertMessage>,
        host: String,
    ) {
        let me = myself.clone();
        let delay = state.retry_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = ractor::cast!(me, CertMessage::EnsureHost(host));
        });
    }

    fn snapshot(&self, state: &CertActorState) -> Vec<CertStatus> {
        state
            .hosts
            .iter()
            .map(|host| {
                let (status, not_after) = if state.pending.contains_key(host) {
                    ("pending".to_string(), None)
                } else {
                    match state.store.get(host) {
                        Some(cert) if cert.needs_renewal(state.renew_before) => {
                            ("expiring".to_string(), Some(cert.not_after))
                        }
                        Some(cert) => ("ready".to_string(), Some(cert.not_after)),
                        None => ("missing".to_string(), None),
                    }
                };
                CertStatus {
                    host: host.clone(),
                    state: status,
                    not_after,
                }
            })
            .collect()
    }
}

/// Async spawn of the certificate actor and return a handle.
pub async fn spawn(args: CertActorArgs) -> Result<CertHandle, PorticoError> {
    let (actor, _jh) = Actor::spawn(None, CertActor, args)
        .await
        .map_err(|e| PorticoError::Actor(format!("failed to spawn CertActor: {e}")))?;
    Ok(CertHandle { actor })
}
