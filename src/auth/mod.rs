//! Session token lifecycle management.
//!
//! This module provides:
//! - `SessionManager`: the facade collaborating applications talk to
//! - `TokenStore` and its `MemoryStore` / `FileStore` / `KeyringStore`
//!   implementations
//! - `RefreshScheduler`: proactive margin-based token refresh
//! - `SessionGuard`: default-deny session view derivation
//! - `RequestAuthenticator`: bearer attachment for outbound requests
//!
//! Credentials are refreshed 180 seconds before expiry; a session whose
//! refresh token enters that margin is ended rather than refreshed.

pub mod authenticator;
pub mod guard;
pub mod manager;
pub mod scheduler;
pub mod store;
pub mod tokens;

#[cfg(test)]
pub(crate) mod testutil;

pub use authenticator::RequestAuthenticator;
pub use guard::SessionGuard;
pub use manager::SessionManager;
pub use scheduler::{RefreshScheduler, SchedulerHandle, SchedulerState};
pub use store::{FileStore, KeyringStore, MemoryStore, TokenStore};
pub use tokens::{Credential, CredentialPair, SessionView, StorageScope};
