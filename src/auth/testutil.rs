//! Recording fake for the provider seam, shared by the auth module tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::api::{AuthError, AuthProvider, Introspection};

use super::tokens::{Credential, CredentialPair};

/// Install a tracing subscriber once so `RUST_LOG=debug cargo test`
/// shows the lifecycle flow.
pub(crate) fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        tracing_subscriber::registry()
            .with(fmt::layer().with_test_writer())
            .with(filter)
            .init();
    });
}

/// A pair whose access/refresh credentials expire the given number of
/// seconds from now.
pub(crate) fn pair_expiring_in(access_secs: i64, refresh_secs: i64) -> CredentialPair {
    let now = Utc::now();
    CredentialPair {
        access: Credential {
            value: "fake-access".to_string(),
            expires_at: now + Duration::seconds(access_secs),
        },
        refresh: Credential {
            value: "fake-refresh".to_string(),
            expires_at: now + Duration::seconds(refresh_secs),
        },
    }
}

/// Scripted `AuthProvider` that counts calls and replays queued
/// responses. An empty queue yields a benign default: fresh credentials
/// for obtain/refresh, an active introspection, success elsewhere.
#[derive(Default)]
pub(crate) struct FakeProvider {
    pub obtain_calls: AtomicUsize,
    pub register_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub introspect_calls: AtomicUsize,
    pub revoke_calls: AtomicUsize,

    obtain_queue: Mutex<VecDeque<Result<CredentialPair, AuthError>>>,
    register_queue: Mutex<VecDeque<Result<(), AuthError>>>,
    refresh_queue: Mutex<VecDeque<Result<CredentialPair, AuthError>>>,
    introspect_queue: Mutex<VecDeque<Result<Introspection, AuthError>>>,
    revoke_queue: Mutex<VecDeque<Result<(), AuthError>>>,
}

impl FakeProvider {
    pub fn push_obtain(&self, result: Result<CredentialPair, AuthError>) {
        self.obtain_queue.lock().unwrap().push_back(result);
    }

    pub fn push_register(&self, result: Result<(), AuthError>) {
        self.register_queue.lock().unwrap().push_back(result);
    }

    pub fn push_refresh(&self, result: Result<CredentialPair, AuthError>) {
        self.refresh_queue.lock().unwrap().push_back(result);
    }

    pub fn push_introspect(&self, result: Result<Introspection, AuthError>) {
        self.introspect_queue.lock().unwrap().push_back(result);
    }

    pub fn push_revoke(&self, result: Result<(), AuthError>) {
        self.revoke_queue.lock().unwrap().push_back(result);
    }
}

#[async_trait]
impl AuthProvider for FakeProvider {
    async fn obtain(&self, _username: &str, _password: &str) -> Result<CredentialPair, AuthError> {
        self.obtain_calls.fetch_add(1, Ordering::SeqCst);
        self.obtain_queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(pair_expiring_in(300, 1800)))
    }

    async fn register(&self, _username: &str, _password: &str) -> Result<(), AuthError> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        self.register_queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn refresh(&self, _refresh_value: &str) -> Result<CredentialPair, AuthError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refresh_queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(pair_expiring_in(300, 1800)))
    }

    async fn introspect(&self, _access_value: &str) -> Result<Introspection, AuthError> {
        self.introspect_calls.fetch_add(1, Ordering::SeqCst);
        self.introspect_queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(Introspection {
                    active: true,
                    sub: Some("u1".to_string()),
                    groups: vec![],
                })
            })
    }

    async fn revoke(&self, _refresh_value: &str) -> Result<(), AuthError> {
        self.revoke_calls.fetch_add(1, Ordering::SeqCst);
        self.revoke_queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }
}
