//! Session validity checks.
//!
//! `SessionGuard` is the only writer of the derived [`SessionView`]: it
//! recomputes the view from a server-side introspection and applies a
//! default-deny policy. Anything other than an active token with a
//! subject claim yields an unauthenticated view; definitive invalidity
//! additionally forces a logout.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::api::AuthError;

use super::manager::SessionCore;
use super::scheduler::SchedulerHandle;
use super::tokens::SessionView;

pub struct SessionGuard {
    core: Arc<SessionCore>,
    scheduler: SchedulerHandle,
}

impl SessionGuard {
    pub(crate) fn new(core: Arc<SessionCore>, scheduler: SchedulerHandle) -> Self {
        Self { core, scheduler }
    }

    /// Introspect the authoritative access credential and recompute the
    /// session view.
    ///
    /// Called once at application start and whenever a collaborator needs
    /// authoritative confirmation; per-request authorization does not
    /// re-validate.
    pub async fn check_session(&self) -> SessionView {
        let resolved = match self.core.store().resolve() {
            Ok(resolved) => resolved,
            Err(err) => {
                warn!(error = %err, "token store unreadable");
                None
            }
        };

        let Some((_, pair)) = resolved else {
            self.core.reset_view();
            return SessionView::default();
        };

        match self.core.provider().introspect(&pair.access.value).await {
            Ok(intro) if intro.active && intro.sub.is_some() => {
                let view = SessionView {
                    authenticated: true,
                    is_admin: intro
                        .groups
                        .iter()
                        .any(|group| group == self.core.admin_group()),
                    subject_id: intro.sub,
                };
                self.core.set_view(view.clone());
                view
            }
            Ok(_) | Err(AuthError::IntrospectionInactive) => {
                // Definitive invalidity: the provider answered and said no
                debug!("introspection reported inactive session, forcing logout");
                self.core.force_logout().await;
                self.scheduler.stop();
                SessionView::default()
            }
            Err(err) => {
                // Transient outage: deny the view but keep stored
                // credentials so the scheduler can recover the session
                warn!(error = %err, "introspection unreachable, denying session view");
                self.core.reset_view();
                SessionView::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use crate::api::{AuthError, Introspection};
    use crate::auth::scheduler::{RefreshScheduler, SchedulerState};
    use crate::auth::testutil::{pair_expiring_in, FakeProvider};
    use crate::auth::{MemoryStore, StorageScope, TokenStore};

    fn setup(
        provider: FakeProvider,
    ) -> (SessionGuard, Arc<SessionCore>, Arc<FakeProvider>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(provider);
        let core = Arc::new(SessionCore::new(
            store.clone(),
            provider.clone(),
            "admin".to_string(),
        ));
        let scheduler = RefreshScheduler::new(
            core.clone(),
            std::time::Duration::from_secs(30),
            chrono::Duration::seconds(180),
        );
        let guard = SessionGuard::new(core.clone(), scheduler.handle());
        (guard, core, provider, store)
    }

    #[tokio::test]
    async fn no_stored_pair_denies_without_network_call() {
        let (guard, core, provider, _) = setup(FakeProvider::default());

        let view = guard.check_session().await;
        assert_eq!(view, SessionView::default());
        assert_eq!(core.view(), SessionView::default());
        assert_eq!(provider.introspect_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn active_subject_with_admin_group_elevates() {
        let provider = FakeProvider::default();
        provider.push_introspect(Ok(Introspection {
            active: true,
            sub: Some("u1".to_string()),
            groups: vec!["admin".to_string(), "player".to_string()],
        }));
        let (guard, core, _, store) = setup(provider);
        store
            .put(StorageScope::Durable, pair_expiring_in(300, 3600))
            .unwrap();

        let view = guard.check_session().await;
        assert!(view.authenticated);
        assert_eq!(view.subject_id.as_deref(), Some("u1"));
        assert!(view.is_admin);
        assert_eq!(core.view(), view);
    }

    #[tokio::test]
    async fn active_subject_without_admin_group_is_not_admin() {
        let provider = FakeProvider::default();
        provider.push_introspect(Ok(Introspection {
            active: true,
            sub: Some("u2".to_string()),
            groups: vec!["player".to_string()],
        }));
        let (guard, _, _, store) = setup(provider);
        store
            .put(StorageScope::Durable, pair_expiring_in(300, 3600))
            .unwrap();

        let view = guard.check_session().await;
        assert!(view.authenticated);
        assert!(!view.is_admin);
    }

    #[tokio::test]
    async fn inactive_token_forces_logout() {
        let provider = FakeProvider::default();
        provider.push_introspect(Ok(Introspection {
            active: false,
            sub: None,
            groups: vec![],
        }));
        let (guard, core, provider, store) = setup(provider);
        store
            .put(StorageScope::Durable, pair_expiring_in(300, 3600))
            .unwrap();

        let view = guard.check_session().await;
        assert_eq!(view, SessionView::default());
        assert!(store.resolve().unwrap().is_none());
        assert_eq!(provider.revoke_calls.load(Ordering::SeqCst), 1);
        assert_eq!(core.view(), SessionView::default());
    }

    #[tokio::test]
    async fn active_token_without_subject_is_denied() {
        let provider = FakeProvider::default();
        provider.push_introspect(Ok(Introspection {
            active: true,
            sub: None,
            groups: vec!["admin".to_string()],
        }));
        let (guard, _, _, store) = setup(provider);
        store
            .put(StorageScope::Durable, pair_expiring_in(300, 3600))
            .unwrap();

        let view = guard.check_session().await;
        assert_eq!(view, SessionView::default());
        assert!(store.resolve().unwrap().is_none());
    }

    #[tokio::test]
    async fn transient_outage_denies_but_keeps_credentials() {
        let provider = FakeProvider::default();
        provider.push_introspect(Err(AuthError::ServerUnavailable("503".to_string())));
        let (guard, core, _, store) = setup(provider);
        let pair = pair_expiring_in(300, 3600);
        store.put(StorageScope::Durable, pair.clone()).unwrap();

        let view = guard.check_session().await;
        assert_eq!(view, SessionView::default());
        assert_eq!(core.view(), SessionView::default());
        // Credentials survive so the scheduler can recover later
        let (_, stored) = store.resolve().unwrap().unwrap();
        assert_eq!(stored, pair);
    }

    #[tokio::test]
    async fn forced_logout_stops_the_scheduler() {
        let store = Arc::new(MemoryStore::new());
        let provider = FakeProvider::default();
        provider.push_introspect(Err(AuthError::IntrospectionInactive));
        let provider = Arc::new(provider);
        let core = Arc::new(SessionCore::new(
            store.clone(),
            provider.clone(),
            "admin".to_string(),
        ));
        let scheduler = RefreshScheduler::new(
            core.clone(),
            std::time::Duration::from_secs(30),
            chrono::Duration::seconds(180),
        );
        let guard = SessionGuard::new(core, scheduler.handle());
        store
            .put(StorageScope::Durable, pair_expiring_in(300, 3600))
            .unwrap();
        scheduler.start();

        guard.check_session().await;
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        assert!(store.resolve().unwrap().is_none());
    }
}
