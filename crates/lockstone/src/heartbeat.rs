//! Heartbeat scheduler: periodic lease renewal
//!
//! One scheduler per `LockManager` instance. A single background task ticks
//! at the configured interval and issues a conditional renewal for every
//! registered handle: extend the TTL only if `(path, owner, version)` still
//! matches. A conflict means ownership was lost and flips the handle's
//! acquired flag off; a transient store error is retried on the next tick.
//! Stopping the scheduler models a process crash: every lease it was
//! renewing then expires at its next TTL boundary.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use metrics::{counter, gauge};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, trace, warn};

use crate::config::LockConfig;
use crate::model::{LockHandle, LockRecord, OwnerId};
use crate::store::{StoreAdapter, WriteOutcome};

pub(crate) struct HeartbeatScheduler {
    leases: Arc<DashMap<OwnerId, LockHandle>>,
    task: JoinHandle<()>,
}

impl HeartbeatScheduler {
    /// Spawn the renewal task. It runs until `shutdown_rx` observes true or
    /// the task is aborted.
    pub(crate) fn start(
        store: Arc<dyn StoreAdapter>,
        config: &LockConfig,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let leases: Arc<DashMap<OwnerId, LockHandle>> = Arc::new(DashMap::new());
        let registry = leases.clone();
        let ttl = config.ttl();
        let tick = config.heartbeat_interval();

        let task = tokio::spawn(async move {
            let mut ticker = interval(tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        Self::renew_all(&store, &registry, ttl).await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("heartbeat scheduler stopped");
        });

        Self { leases, task }
    }

    async fn renew_all(
        store: &Arc<dyn StoreAdapter>,
        registry: &DashMap<OwnerId, LockHandle>,
        ttl: Duration,
    ) {
        // Snapshot first; the handle mutex is never held across a store call
        let held: Vec<LockHandle> = registry.iter().map(|entry| entry.value().clone()).collect();

        for handle in held {
            let Some(version) = handle.lease_version() else {
                // Released (or already flipped off) since the snapshot; the
                // guard spares a lease re-acquired in the meantime
                registry.remove_if(handle.owner_id(), |_, h| h.lease_version().is_none());
                continue;
            };

            let refreshed =
                LockRecord::new(handle.path().clone(), handle.owner_id().clone(), version, ttl);
            match store.compare_and_swap(&refreshed, version, ttl).await {
                Ok(WriteOutcome::Applied) => {
                    counter!("lockstone_renewals_total").increment(1);
                    trace!(path = %handle.path(), owner = %handle.owner_id(), "lease renewed");
                }
                Ok(WriteOutcome::Conflict) => {
                    // The owner may have released and re-acquired while this
                    // CAS was in flight; only a handle still on the attempted
                    // incarnation has truly lost ownership
                    if handle.clear_if_version(version) {
                        warn!(
                            path = %handle.path(),
                            owner = %handle.owner_id(),
                            "lease ownership lost, skipping renewal"
                        );
                        registry.remove_if(handle.owner_id(), |_, h| {
                            h.lease_version().is_none()
                        });
                        counter!("lockstone_leases_lost_total").increment(1);
                    } else {
                        debug!(
                            path = %handle.path(),
                            owner = %handle.owner_id(),
                            stale_version = %version,
                            "renewal conflict for a superseded lease, ignoring"
                        );
                    }
                }
                Err(e) => {
                    warn!(
                        path = %handle.path(),
                        error = %e,
                        "lease renewal failed, retrying on next tick"
                    );
                }
            }
        }

        gauge!("lockstone_held_leases").set(registry.len() as f64);
    }

    /// Start renewing the lease held by `handle`
    pub(crate) fn register(&self, handle: &LockHandle) {
        self.leases.insert(handle.owner_id().clone(), handle.clone());
    }

    /// Stop renewing the lease registered under `owner`
    pub(crate) fn deregister(&self, owner: &OwnerId) {
        self.leases.remove(owner);
    }

    /// Stop all future renewals for this instance
    pub(crate) fn shutdown(&self) {
        self.task.abort();
    }
}
