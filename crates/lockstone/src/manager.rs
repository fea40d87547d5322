//! Lock manager: lease acquisition, release and teardown
//!
//! Acquisition is optimistic and lock-free across processes: contenders race
//! a create-if-absent write against the store, the store's atomicity admits
//! exactly one winner per attempt, and losers retry on the next poll tick.
//! No FIFO ordering is promised. Transient store failures are absorbed inside
//! the retry loop; the caller only ever sees an `AcquireOutcome`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use metrics::counter;
use rand::Rng;
use tokio::sync::watch;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::config::LockConfig;
use crate::error::{LockError, StoreError};
use crate::heartbeat::HeartbeatScheduler;
use crate::model::{LeaseVersion, LockHandle, LockPath, LockRecord};
use crate::store::{StoreAdapter, WriteOutcome};

/// Outcome of an acquisition call; carries no further diagnostic. A bounded
/// window exhausted by contention and one exhausted by store unavailability
/// both read as `TimedOut`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The lease was obtained and is being renewed
    Acquired,
    /// The bounded window lapsed without obtaining the lease
    TimedOut,
    /// The manager shut down while the caller was waiting
    Cancelled,
}

impl AcquireOutcome {
    pub fn is_acquired(self) -> bool {
        self == AcquireOutcome::Acquired
    }
}

/// Orchestrates lease-based exclusive locks over a shared store
///
/// Multiple instances (typically in different processes) share no memory;
/// all coordination goes through the store's atomic conditional writes.
pub struct LockManager {
    store: Arc<dyn StoreAdapter>,
    config: LockConfig,
    heartbeat: HeartbeatScheduler,
    lease_counter: AtomicU64,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl LockManager {
    /// Create a manager and start its heartbeat scheduler
    pub fn new(store: Arc<dyn StoreAdapter>, config: LockConfig) -> Result<Self, LockError> {
        config.validate()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let heartbeat = HeartbeatScheduler::start(store.clone(), &config, shutdown_rx.clone());
        Ok(Self {
            store,
            config,
            heartbeat,
            lease_counter: AtomicU64::new(1),
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Establish the lock namespace in the store. Fatal to this instance on
    /// failure.
    pub async fn init(&self) -> Result<(), LockError> {
        self.store
            .ensure_namespace(self.config.replication_factor)
            .await
            .map_err(|e| LockError::Initialization(e.to_string()))?;
        info!(
            replication_factor = self.config.replication_factor,
            ttl_ms = self.config.ttl_ms,
            "lock namespace ready"
        );
        Ok(())
    }

    /// Build a handle for `path`. Purely local, no store access.
    pub fn create_lock(&self, path: impl Into<LockPath>) -> LockHandle {
        LockHandle::new(path.into())
    }

    /// Block until the lease is obtained, with no upper bound. Returns
    /// `Cancelled` if the manager shuts down mid-wait; dropping the future
    /// aborts the wait and leaves no partial store state.
    pub async fn acquire(&self, handle: &LockHandle) -> AcquireOutcome {
        self.acquire_loop(handle, None).await
    }

    /// Same retry loop bounded by `timeout`. A zero timeout makes a single
    /// non-blocking attempt. Exhausting the window yields `TimedOut` and
    /// guarantees no residual record was left behind.
    pub async fn acquire_timeout(&self, handle: &LockHandle, timeout: Duration) -> AcquireOutcome {
        if timeout.is_zero() {
            // A shut-down manager could not renew anything it handed out
            if *self.shutdown_rx.borrow() {
                return AcquireOutcome::Cancelled;
            }
            return match self.try_acquire_once(handle).await {
                Ok(true) => AcquireOutcome::Acquired,
                Ok(false) | Err(_) => {
                    counter!("lockstone_acquire_timeouts_total").increment(1);
                    AcquireOutcome::TimedOut
                }
            };
        }
        self.acquire_loop(handle, Some(Instant::now() + timeout)).await
    }

    async fn acquire_loop(&self, handle: &LockHandle, deadline: Option<Instant>) -> AcquireOutcome {
        let mut shutdown_rx = self.shutdown_rx.clone();
        if *shutdown_rx.borrow() {
            return AcquireOutcome::Cancelled;
        }

        loop {
            match self.try_acquire_once(handle).await {
                Ok(true) => return AcquireOutcome::Acquired,
                Ok(false) => {}
                Err(e) => {
                    // Absorbed; surfaces only as a lapsed window
                    warn!(path = %handle.path(), error = %e, "store unavailable during acquire, retrying");
                }
            }

            let pause = self.poll_pause();
            let wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        counter!("lockstone_acquire_timeouts_total").increment(1);
                        debug!(path = %handle.path(), "acquire window exhausted");
                        return AcquireOutcome::TimedOut;
                    }
                    pause.min(deadline - now)
                }
                None => pause,
            };

            tokio::select! {
                _ = sleep(wait) => {}
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        debug!(path = %handle.path(), "acquire cancelled by manager shutdown");
                        return AcquireOutcome::Cancelled;
                    }
                }
            }
        }
    }

    /// One atomic attempt: a single create-if-absent write. On success the
    /// handle is flipped to acquired and registered for renewal.
    async fn try_acquire_once(&self, handle: &LockHandle) -> Result<bool, StoreError> {
        let version = LeaseVersion::new(self.lease_counter.fetch_add(1, Ordering::Relaxed));
        let record = LockRecord::new(
            handle.path().clone(),
            handle.owner_id().clone(),
            version,
            self.config.ttl(),
        );

        match self.store.create_if_absent(&record, self.config.ttl()).await? {
            WriteOutcome::Applied => {
                handle.mark_acquired(version);
                self.heartbeat.register(handle);
                counter!("lockstone_acquires_total").increment(1);
                debug!(
                    path = %handle.path(),
                    owner = %handle.owner_id(),
                    version = %version,
                    "lock acquired"
                );
                Ok(true)
            }
            WriteOutcome::Conflict => Ok(false),
        }
    }

    /// Release the lease held by `handle`. Idempotent: releasing a handle
    /// that was never acquired, was already released, or whose lease has
    /// silently expired is a no-op.
    pub async fn release(&self, handle: &LockHandle) {
        let Some(version) = handle.take_acquired() else {
            debug!(path = %handle.path(), "release on a handle not currently held, ignoring");
            return;
        };

        self.heartbeat.deregister(handle.owner_id());

        match self
            .store
            .delete_if_match(handle.path(), handle.owner_id(), version)
            .await
        {
            Ok(WriteOutcome::Applied) => {
                counter!("lockstone_releases_total").increment(1);
                debug!(path = %handle.path(), owner = %handle.owner_id(), "lock released");
            }
            Ok(WriteOutcome::Conflict) => {
                // Lease already expired and possibly reclaimed by another
                // owner; nothing of ours is left to delete
                debug!(path = %handle.path(), "lease already reclaimed at release");
            }
            Err(e) => {
                warn!(
                    path = %handle.path(),
                    error = %e,
                    "store unavailable during release, lease will expire on its own"
                );
            }
        }
    }

    /// Local read of the handle's cached state; reflects last known truth,
    /// not the current store contents
    pub fn is_acquired(&self, handle: &LockHandle) -> bool {
        handle.is_acquired()
    }

    /// Stop heartbeat renewals and cancel pending unbounded acquires. Held
    /// leases are not deleted; they expire naturally at their next TTL
    /// boundary, which is how a crashed holder is modeled.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        self.heartbeat.shutdown();
        info!("lock manager shut down, held leases left to expire");
    }

    fn poll_pause(&self) -> Duration {
        let base = self.config.acquire_poll_interval_ms;
        // Small jitter keeps contenders from polling in lockstep
        let jitter = rand::rng().random_range(0..=base / 5);
        Duration::from_millis(base + jitter)
    }
}
