//! Outbound request authorization.
//!
//! `RequestAuthenticator` attaches the current access credential to
//! requests made by collaborator services. It reads the store
//! synchronously and never triggers a refresh or a retry: a request that
//! fails on an expired token is rejected downstream with an unauthorized
//! status and is not replayed.

use std::sync::Arc;

use anyhow::Result;
use reqwest::header;
use tracing::warn;

use super::store::TokenStore;

pub struct RequestAuthenticator {
    store: Arc<dyn TokenStore>,
}

impl RequestAuthenticator {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }

    /// Attach the current access credential as a bearer token.
    ///
    /// With no stored credential the request proceeds unauthenticated.
    pub fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.store.resolve() {
            Ok(Some((_, pair))) => request.bearer_auth(pair.access.value),
            Ok(None) => request,
            Err(err) => {
                warn!(error = %err, "token store unreadable, sending request unauthenticated");
                request
            }
        }
    }

    /// Header map form for collaborators building requests manually.
    pub fn bearer_headers(&self) -> Result<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();
        if let Ok(Some((_, pair))) = self.store.resolve() {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {}", pair.access.value))?,
            );
        }
        Ok(headers)
    }
}
