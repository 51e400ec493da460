//! Session lifecycle facade.
//!
//! `SessionManager` wires the store, provider client, scheduler, guard,
//! and request authenticator together and exposes the small operation
//! set collaborating applications depend on: `login`, `register`,
//! `logout`, `check_session`, `current_session_view`, and `authorize`.
//!
//! All components share one injected `TokenStore` and one `AuthProvider`;
//! neither is ever reached through ambient global state.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use reqwest::header;
use tracing::{info, warn};

use crate::api::{AuthClient, AuthProvider};
use crate::config::AuthConfig;

use super::authenticator::RequestAuthenticator;
use super::guard::SessionGuard;
use super::scheduler::RefreshScheduler;
use super::store::TokenStore;
use super::tokens::{SessionView, StorageScope};

/// Shared state behind the session components.
///
/// Owns the derived session view (written only through the guard and the
/// forced-logout path) and carries the injected store and provider.
pub(crate) struct SessionCore {
    store: Arc<dyn TokenStore>,
    provider: Arc<dyn AuthProvider>,
    view: Mutex<SessionView>,
    admin_group: String,
}

impl SessionCore {
    pub(crate) fn new(
        store: Arc<dyn TokenStore>,
        provider: Arc<dyn AuthProvider>,
        admin_group: String,
    ) -> Self {
        Self {
            store,
            provider,
            view: Mutex::new(SessionView::default()),
            admin_group,
        }
    }

    pub(crate) fn store(&self) -> &dyn TokenStore {
        self.store.as_ref()
    }

    pub(crate) fn provider(&self) -> &dyn AuthProvider {
        self.provider.as_ref()
    }

    pub(crate) fn admin_group(&self) -> &str {
        &self.admin_group
    }

    pub(crate) fn view(&self) -> SessionView {
        self.view.lock().unwrap().clone()
    }

    pub(crate) fn set_view(&self, view: SessionView) {
        *self.view.lock().unwrap() = view;
    }

    pub(crate) fn reset_view(&self) {
        *self.view.lock().unwrap() = SessionView::default();
    }

    /// Revoke the refresh token best-effort, then clear local state.
    ///
    /// Revocation failures are logged and swallowed: logout must be
    /// unconditionally effective locally regardless of server
    /// reachability.
    pub(crate) async fn force_logout(&self) {
        if let Ok(Some((_, pair))) = self.store.resolve() {
            if let Err(err) = self.provider.revoke(&pair.refresh.value).await {
                warn!(error = %err, "token revocation failed, clearing local session anyway");
            }
        }
        if let Err(err) = self.store.clear() {
            warn!(error = %err, "failed to clear token store");
        }
        self.reset_view();
    }
}

/// Session token lifecycle manager.
pub struct SessionManager {
    core: Arc<SessionCore>,
    scheduler: RefreshScheduler,
    guard: SessionGuard,
    authenticator: RequestAuthenticator,
}

impl SessionManager {
    /// Create a manager talking to the configured identity provider.
    pub fn new(config: AuthConfig, store: Arc<dyn TokenStore>) -> Result<Self> {
        let provider = Arc::new(AuthClient::new(&config)?);
        Ok(Self::with_provider(config, store, provider))
    }

    /// Create a manager with an injected provider implementation.
    pub fn with_provider(
        config: AuthConfig,
        store: Arc<dyn TokenStore>,
        provider: Arc<dyn AuthProvider>,
    ) -> Self {
        let core = Arc::new(SessionCore::new(
            store.clone(),
            provider,
            config.admin_group.clone(),
        ));
        let scheduler = RefreshScheduler::new(
            core.clone(),
            config.refresh_period(),
            config.refresh_margin(),
        );
        let guard = SessionGuard::new(core.clone(), scheduler.handle());
        let authenticator = RequestAuthenticator::new(store);

        Self {
            core,
            scheduler,
            guard,
            authenticator,
        }
    }

    /// Authenticate with the provider and begin the refresh cycle.
    ///
    /// `remember` selects the durable scope so the session survives
    /// application restart.
    pub async fn login(&self, username: &str, password: &str, remember: bool) -> Result<()> {
        let pair = self.core.provider().obtain(username, password).await?;
        let scope = if remember {
            StorageScope::Durable
        } else {
            StorageScope::Ephemeral
        };
        // Drop any previous session in either scope first: resolve()
        // gives durable precedence, so a leftover durable pair would
        // shadow a fresh ephemeral login
        self.core.store().clear()?;
        self.core.store().put(scope, pair)?;
        self.scheduler.start();
        info!(username, ?scope, "login successful");
        Ok(())
    }

    /// Create a new account. Does not sign the user in.
    pub async fn register(&self, username: &str, password: &str) -> Result<()> {
        self.core.provider().register(username, password).await?;
        info!(username, "registration successful");
        Ok(())
    }

    /// End the session: revoke best-effort, clear stored credentials,
    /// cancel the refresh cycle. Always effective locally.
    pub async fn logout(&self) {
        self.core.force_logout().await;
        self.scheduler.stop();
        info!("logged out");
    }

    /// Adopt persisted credentials at application start.
    ///
    /// Verifies the session via introspection and starts the refresh
    /// cycle whenever credentials remain stored. A transient provider
    /// outage denies the view but keeps the pair, so the scheduler must
    /// run to keep it fresh until introspection succeeds again.
    pub async fn resume(&self) -> SessionView {
        match self.core.store().resolve() {
            Ok(Some(_)) => {}
            Ok(None) => {
                self.core.reset_view();
                return SessionView::default();
            }
            Err(err) => {
                warn!(error = %err, "token store unreadable during resume");
                self.core.reset_view();
                return SessionView::default();
            }
        }

        let view = self.guard.check_session().await;
        let credentials_remain = matches!(self.core.store().resolve(), Ok(Some(_)));
        if view.authenticated || credentials_remain {
            self.scheduler.start();
        }
        view
    }

    /// Authoritative session confirmation via introspection.
    pub async fn check_session(&self) -> SessionView {
        self.guard.check_session().await
    }

    /// The most recently derived session view, without a network call.
    pub fn current_session_view(&self) -> SessionView {
        self.core.view()
    }

    /// Attach the current access credential to an outbound request.
    pub fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        self.authenticator.authorize(request)
    }

    /// Bearer header form of [`Self::authorize`].
    pub fn bearer_headers(&self) -> Result<header::HeaderMap> {
        self.authenticator.bearer_headers()
    }

    /// Scheduler state, mainly useful for lifecycle diagnostics.
    pub fn scheduler_state(&self) -> super::scheduler::SchedulerState {
        self.scheduler.state()
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.scheduler.stop();
    }
}
