//! authkeep - session token lifecycle management.
//!
//! One identity provider, many front-end applications: this crate owns
//! the part they all need and none should reimplement - obtaining,
//! persisting, proactively refreshing, introspecting, and invalidating
//! bearer credentials. Collaborating applications construct a
//! [`SessionManager`] with an injected [`TokenStore`] and drive
//! everything through its small operation set.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use authkeep::{AuthConfig, FileStore, SessionManager};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = AuthConfig::load()?;
//! let store = Arc::new(FileStore::new("/var/lib/myapp".into())?);
//! let manager = SessionManager::new(config, store)?;
//!
//! // Adopt a persisted session, or prompt for credentials
//! let view = manager.resume().await;
//! if !view.authenticated {
//!     manager.login("alice", "hunter2", true).await?;
//! }
//!
//! // Outbound calls carry the current access token
//! let client = reqwest::Client::new();
//! let request = manager.authorize(client.get("https://game.example.com/api/state"));
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;

pub use api::{AuthClient, AuthError, AuthProvider, Introspection};
pub use auth::{
    Credential, CredentialPair, FileStore, KeyringStore, MemoryStore, RefreshScheduler,
    RequestAuthenticator, SchedulerHandle, SchedulerState, SessionGuard, SessionManager,
    SessionView, StorageScope, TokenStore,
};
pub use config::AuthConfig;
