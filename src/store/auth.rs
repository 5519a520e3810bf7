//! Service-account OAuth2 — JWT-bearer grant with a cached access token.
//!
//! The flow is the standard two-legged exchange: sign an RS256 assertion
//! with the account's private key, swap it at `token_uri` for a short-lived
//! access token, and reuse that token until shortly before expiry.

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::store::{ServiceAccount, StoreError};

const SCOPE: &str = "https://www.googleapis.com/auth/datastore";
const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
/// Assertion lifetime; Google caps it at one hour.
const ASSERTION_TTL_SECS: i64 = 3600;
/// Refresh this many seconds before the cached token expires.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

struct CachedToken {
    token: String,
    expires_at: i64,
}

/// Caches and refreshes the store access token.
pub struct TokenProvider {
    http: reqwest::Client,
    account: ServiceAccount,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(http: reqwest::Client, account: ServiceAccount) -> Self {
        Self {
            http,
            account,
            cached: Mutex::new(None),
        }
    }

    /// Return a bearer token, exchanging a fresh assertion if the cached one
    /// is missing or about to expire.
    pub async fn bearer(&self) -> Result<String, StoreError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now().timestamp();

        if let Some(token) = cached.as_ref() {
            if token.expires_at - EXPIRY_MARGIN_SECS > now {
                return Ok(token.token.clone());
            }
        }

        let assertion = self.sign_assertion(now)?;
        let response = self
            .http
            .post(&self.account.token_uri)
            .form(&[("grant_type", GRANT_TYPE), ("assertion", &assertion)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Auth(format!("status {status}: {body}")));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Auth(format!("unparseable token response: {e}")))?;

        debug!(expires_in = parsed.expires_in, "access token refreshed");

        let token = parsed.access_token.clone();
        *cached = Some(CachedToken {
            token: parsed.access_token,
            expires_at: now + parsed.expires_in,
        });

        Ok(token)
    }

    fn sign_assertion(&self, now: i64) -> Result<String, StoreError> {
        let claims = Claims {
            iss: &self.account.client_email,
            scope: SCOPE,
            aud: &self.account.token_uri,
            iat: now,
            exp: now + ASSERTION_TTL_SECS,
        };

        let key = EncodingKey::from_rsa_pem(self.account.private_key.as_bytes())
            .map_err(|e| StoreError::Auth(format!("invalid private key: {e}")))?;

        encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| StoreError::Auth(format!("assertion signing failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_private_key_is_an_auth_error() {
        let provider = TokenProvider::new(
            reqwest::Client::new(),
            ServiceAccount {
                project_id: "p".into(),
                client_email: "svc@p.iam.gserviceaccount.com".into(),
                private_key: "not a pem".into(),
                token_uri: "https://oauth2.googleapis.com/token".into(),
            },
        );
        let err = provider.sign_assertion(0).unwrap_err();
        assert!(matches!(err, StoreError::Auth(_)));
        assert!(err.to_string().contains("private key"));
    }
}
