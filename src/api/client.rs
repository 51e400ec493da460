//! HTTP client for the shared identity provider.
//!
//! This module provides the `AuthClient` struct implementing the
//! `AuthProvider` trait against the provider's token endpoints. Raw token
//! bundles are validated and converted to [`CredentialPair`]s at this
//! boundary; malformed responses never propagate past it.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::auth::{Credential, CredentialPair};
use crate::config::AuthConfig;

use super::AuthError;

/// Raw token bundle as returned by the provider's token and refresh
/// endpoints. Expiry fields are relative lifetimes in seconds; absolute
/// expiry instants are computed client-side when the bundle is accepted.
#[derive(Debug, Deserialize)]
pub struct TokenBundle {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub refresh_expires_in: i64,
}

impl TokenBundle {
    /// Convert the bundle to an absolute-expiry credential pair.
    ///
    /// Rejects bundles that violate the pair invariant
    /// (`access.expires_at <= refresh.expires_at`) or carry empty tokens.
    pub fn into_pair(self, now: DateTime<Utc>) -> Result<CredentialPair, AuthError> {
        if self.access_token.is_empty() || self.refresh_token.is_empty() {
            return Err(AuthError::InvalidResponse(
                "token bundle contains an empty token".to_string(),
            ));
        }
        if self.expires_in < 0 || self.refresh_expires_in < self.expires_in {
            return Err(AuthError::InvalidResponse(format!(
                "inconsistent token lifetimes: expires_in={} refresh_expires_in={}",
                self.expires_in, self.refresh_expires_in
            )));
        }
        Ok(CredentialPair {
            access: Credential {
                value: self.access_token,
                expires_at: now + Duration::seconds(self.expires_in),
            },
            refresh: Credential {
                value: self.refresh_token,
                expires_at: now + Duration::seconds(self.refresh_expires_in),
            },
        })
    }
}

/// Result of a server-side token introspection.
#[derive(Debug, Clone, Deserialize)]
pub struct Introspection {
    pub active: bool,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
}

/// Network boundary to the identity provider.
///
/// `AuthClient` is the production implementation; tests substitute a
/// recording fake. All five operations map onto the provider endpoints
/// under `/auth/`.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Exchange username and password for a fresh credential pair.
    async fn obtain(&self, username: &str, password: &str) -> Result<CredentialPair, AuthError>;

    /// Create a new account. Fails with `Conflict` on a duplicate username.
    async fn register(&self, username: &str, password: &str) -> Result<(), AuthError>;

    /// Exchange a refresh token for a replacement credential pair.
    ///
    /// On `RefreshRejected` the caller must clear stored credentials; a
    /// rejected refresh token can never become valid again.
    async fn refresh(&self, refresh_value: &str) -> Result<CredentialPair, AuthError>;

    /// Check validity and claims of an access token.
    ///
    /// A well-formed `{active: false}` response is returned as `Ok`;
    /// transport failures surface as `Network` so callers can tell a
    /// definitive invalidation from a transient outage.
    async fn introspect(&self, access_value: &str) -> Result<Introspection, AuthError>;

    /// Invalidate a refresh token server-side. Best-effort; callers log
    /// and swallow failures.
    async fn revoke(&self, refresh_value: &str) -> Result<(), AuthError>;
}

/// Body for refresh and revoke calls
#[derive(serde::Serialize)]
struct TokenBody<'a> {
    token: &'a str,
}

/// HTTP implementation of `AuthProvider`.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct AuthClient {
    client: Client,
    base_url: String,
}

impl AuthClient {
    /// Create a new client with the configured base URL and timeout.
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Check if response is successful, returning a mapped error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, AuthError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(AuthError::from_status(status, &body))
        }
    }
}

#[async_trait]
impl AuthProvider for AuthClient {
    async fn obtain(&self, username: &str, password: &str) -> Result<CredentialPair, AuthError> {
        let response = self
            .client
            .post(self.url("/auth/token"))
            .form(&[("username", username), ("password", password)])
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        let bundle: TokenBundle = response.json().await?;
        debug!(username, "obtained token bundle");
        bundle.into_pair(Utc::now())
    }

    async fn register(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let response = self
            .client
            .post(self.url("/auth/register"))
            .form(&[("username", username), ("password", password)])
            .send()
            .await?;

        Self::check_response(response).await?;
        debug!(username, "registered user");
        Ok(())
    }

    async fn refresh(&self, refresh_value: &str) -> Result<CredentialPair, AuthError> {
        let response = self
            .client
            .post(self.url("/auth/refresh"))
            .json(&TokenBody { token: refresh_value })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // 400 and 401 both mean the provider invalidated the refresh
            // token (expired, revoked, or reused)
            return Err(match status.as_u16() {
                400 | 401 => AuthError::RefreshRejected,
                _ => AuthError::from_status(status, &body),
            });
        }

        let bundle: TokenBundle = response.json().await?;
        debug!("refreshed token bundle");
        bundle.into_pair(Utc::now())
    }

    async fn introspect(&self, access_value: &str) -> Result<Introspection, AuthError> {
        let response = self
            .client
            .post(self.url("/auth/introspect"))
            .bearer_auth(access_value)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // A rejected bearer token is a definitive answer, not an outage
            return Err(match status.as_u16() {
                400 | 401 => AuthError::IntrospectionInactive,
                _ => AuthError::from_status(status, &body),
            });
        }

        Ok(response.json().await?)
    }

    async fn revoke(&self, refresh_value: &str) -> Result<(), AuthError> {
        let response = self
            .client
            .post(self.url("/auth/logout"))
            .json(&TokenBody { token: refresh_value })
            .send()
            .await?;

        Self::check_response(response).await?;
        debug!("revoked refresh token");
        Ok(())
    }
}
