use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Username already exists")]
    Conflict,

    #[error("Identity provider unavailable: {0}")]
    ServerUnavailable(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Refresh token rejected by provider")]
    RefreshRejected,

    #[error("Introspection reported an inactive session")]
    IntrospectionInactive,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl AuthError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            format!(
                "{}... (truncated, {} total bytes)",
                &body[..MAX_ERROR_BODY_LENGTH],
                body.len()
            )
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => AuthError::InvalidCredentials,
            409 => AuthError::Conflict,
            429 => AuthError::RateLimited,
            500..=599 => AuthError::ServerUnavailable(truncated),
            _ => AuthError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// Whether the error is worth retrying on a later tick.
    ///
    /// `RefreshRejected` and `IntrospectionInactive` are definitive: the
    /// provider has invalidated the session and retrying cannot succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AuthError::Network(_)
                | AuthError::ServerUnavailable(_)
                | AuthError::RateLimited
                | AuthError::InvalidResponse(_)
        )
    }
}
