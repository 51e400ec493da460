//! Proactive background token refresh.
//!
//! A single recurring tick inspects the stored credential pair and
//! refreshes the access token strictly before it expires, so an
//! authenticated request never fails on an about-to-expire token. The
//! refresh token's own expiry is checked first: once it is inside the
//! margin the session is unrecoverable and the scheduler forces a logout
//! instead of attempting a refresh the provider is guaranteed to reject.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use super::manager::SessionCore;

/// Scheduler lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Idle,
    RefreshInFlight,
}

/// Outcome of a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickOutcome {
    /// Tick ignored: scheduler not idle (another refresh in flight)
    Skipped,
    /// Nothing to do: no stored pair, or access token still comfortable
    Noop,
    /// Refresh attempted but deferred: lease held elsewhere or a
    /// transient error, retry on the next tick
    Deferred,
    /// New pair obtained and stored
    Refreshed,
    /// Session unrecoverable, logout forced, scheduler stops
    Halted,
}

pub(crate) struct SchedulerShared {
    state: Mutex<SchedulerState>,
    shutdown: Mutex<Option<watch::Sender<()>>>,
    // Bumped on every start so a stale task's cleanup cannot clobber a
    // newer run
    epoch: AtomicU64,
}

impl SchedulerShared {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(SchedulerState::Stopped),
            shutdown: Mutex::new(None),
            epoch: AtomicU64::new(0),
        }
    }

    pub(crate) fn state(&self) -> SchedulerState {
        *self.state.lock().unwrap()
    }

    pub(crate) fn set_state(&self, state: SchedulerState) {
        *self.state.lock().unwrap() = state;
    }

    /// Transition `Idle -> RefreshInFlight` atomically. Returns false when
    /// the scheduler is stopped or a refresh is already in flight.
    fn begin_refresh(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if *state == SchedulerState::Idle {
            *state = SchedulerState::RefreshInFlight;
            true
        } else {
            false
        }
    }

    /// Cancel the pending tick and mark the scheduler stopped.
    pub(crate) fn stop(&self) {
        // Dropping the sender wakes the task, which exits immediately
        self.shutdown.lock().unwrap().take();
        self.set_state(SchedulerState::Stopped);
    }
}

/// Cheap clonable handle for stopping the scheduler from collaborating
/// components (the session guard drives forced logout through this).
#[derive(Clone)]
pub struct SchedulerHandle {
    shared: Arc<SchedulerShared>,
}

impl SchedulerHandle {
    pub fn stop(&self) {
        self.shared.stop();
    }

    pub fn state(&self) -> SchedulerState {
        self.shared.state()
    }
}

/// Background recurring task that proactively refreshes credentials.
pub struct RefreshScheduler {
    core: Arc<SessionCore>,
    period: Duration,
    margin: chrono::Duration,
    shared: Arc<SchedulerShared>,
}

impl RefreshScheduler {
    pub(crate) fn new(core: Arc<SessionCore>, period: Duration, margin: chrono::Duration) -> Self {
        Self {
            core,
            period,
            margin,
            shared: Arc::new(SchedulerShared::new()),
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.shared.state()
    }

    /// Begin ticking. The first tick fires one full period after start,
    /// so a started-then-immediately-stopped scheduler makes no network
    /// calls. No-op when already running.
    pub fn start(&self) {
        let mut shutdown = self.shared.shutdown.lock().unwrap();
        if shutdown.is_some() {
            return;
        }
        let (tx, mut rx) = watch::channel(());
        *shutdown = Some(tx);
        let my_epoch = self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.set_state(SchedulerState::Idle);
        drop(shutdown);

        let core = self.core.clone();
        let shared = self.shared.clone();
        let period = self.period;
        let margin = self.margin;

        info!(period_secs = period.as_secs(), "refresh scheduler started");
        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    biased;
                    _ = rx.changed() => break,
                    _ = ticker.tick() => {
                        if run_tick(&core, &shared, margin, period).await == TickOutcome::Halted {
                            break;
                        }
                    }
                }
            }
            let mut shutdown = shared.shutdown.lock().unwrap();
            if shared.epoch.load(Ordering::SeqCst) == my_epoch {
                shutdown.take();
                shared.set_state(SchedulerState::Stopped);
            }
            debug!("refresh scheduler stopped");
        });
    }

    /// Cancel the pending tick deterministically. Idempotent.
    pub fn stop(&self) {
        self.shared.stop();
    }
}

/// One pass of the refresh state machine.
pub(crate) async fn run_tick(
    core: &SessionCore,
    shared: &SchedulerShared,
    margin: chrono::Duration,
    lease_ttl: Duration,
) -> TickOutcome {
    if shared.state() != SchedulerState::Idle {
        return TickOutcome::Skipped;
    }

    let (scope, pair) = match core.store().resolve() {
        Ok(Some(resolved)) => resolved,
        Ok(None) => return TickOutcome::Noop,
        Err(err) => {
            warn!(error = %err, "token store unreadable, skipping refresh check");
            return TickOutcome::Noop;
        }
    };

    let now = Utc::now();

    // Check the refresh token first: once it is inside the margin the
    // provider would reject the refresh call anyway
    if pair.refresh.expires_within(margin, now) {
        info!("refresh token inside expiry margin, ending session");
        core.force_logout().await;
        shared.set_state(SchedulerState::Stopped);
        return TickOutcome::Halted;
    }

    if !pair.access.expires_within(margin, now) {
        return TickOutcome::Noop;
    }

    if !shared.begin_refresh() {
        return TickOutcome::Skipped;
    }

    if !core.store().try_refresh_lease(lease_ttl) {
        debug!("refresh lease held by another instance, deferring");
        shared.set_state(SchedulerState::Idle);
        return TickOutcome::Deferred;
    }

    let result = core.provider().refresh(&pair.refresh.value).await;
    core.store().release_refresh_lease();

    match result {
        Ok(new_pair) => {
            if let Err(err) = core.store().put(scope, new_pair) {
                warn!(error = %err, "failed to persist refreshed credentials");
                shared.set_state(SchedulerState::Idle);
                return TickOutcome::Deferred;
            }
            debug!(?scope, "credentials refreshed");
            shared.set_state(SchedulerState::Idle);
            TickOutcome::Refreshed
        }
        Err(err) if err.is_transient() => {
            warn!(error = %err, "transient refresh failure, retrying on next tick");
            shared.set_state(SchedulerState::Idle);
            TickOutcome::Deferred
        }
        Err(err) => {
            info!(error = %err, "refresh rejected, ending session");
            core.force_logout().await;
            shared.set_state(SchedulerState::Stopped);
            TickOutcome::Halted
        }
    }
}
