//! HTTP-01 challenge material.
//!
//! A challenge token is served at
//! `http://<host>/.well-known/acme-challenge/<token>` on the plaintext
//! entrypoint; the body is the key authorization, which binds the token to
//! the configured account key so the issuer can verify the responder actually
//! holds that key.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Fresh random challenge token.
pub fn new_token() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Account key thumbprint: base64url(SHA-256(account_key)), no padding.
pub fn thumbprint(account_key: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(account_key.as_bytes()))
}

/// `<token>.<thumbprint>`, the challenge response body.
pub fn key_authorization(token: &str, account_key: &str) -> String {
    format!("{token}.{}", thumbprint(account_key))
}
