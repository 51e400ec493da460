use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// An opaque bearer string plus its absolute expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// Whether the credential expires within `margin` of `now`.
    pub fn expires_within(&self, margin: Duration, now: DateTime<Utc>) -> bool {
        now > self.expires_at - margin
    }
}

/// The access/refresh credential pair for one session.
///
/// Invariant: `access.expires_at <= refresh.expires_at`, enforced when a
/// provider bundle is converted at the client boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    pub access: Credential,
    pub refresh: Credential,
}

/// Persistence lifetime class for stored credentials.
///
/// `Durable` survives application restart ("remember me"); `Ephemeral`
/// lives only as long as the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageScope {
    Durable,
    Ephemeral,
}

/// Derived authorization snapshot for UI-level collaborators.
///
/// Never persisted - always recomputed from the most recent successful
/// introspection, and reset to all-false on any failure or logout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionView {
    pub authenticated: bool,
    pub subject_id: Option<String>,
    pub is_admin: bool,
}
