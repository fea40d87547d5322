//! Failure-mode behavior: store outages, stale releases after expiry,
//! cancellation, and release idempotence across manager instances.

use std::sync::Arc;
use std::time::Duration;

use lockstone::{AcquireOutcome, MemoryStore, StoreAdapter};
use lockstone_integration_tests::{fast_config, new_manager};

#[tokio::test(start_paused = true)]
async fn outage_during_bounded_acquire_reads_as_timeout() {
    let store = Arc::new(MemoryStore::new());
    let manager = new_manager(store.clone());

    store.set_unavailable(true);

    let handle = manager.create_lock("/fm/outage");
    assert_eq!(
        manager
            .acquire_timeout(&handle, Duration::from_millis(800))
            .await,
        AcquireOutcome::TimedOut
    );

    store.set_unavailable(false);
    assert_eq!(
        manager.acquire_timeout(&handle, Duration::ZERO).await,
        AcquireOutcome::Acquired
    );

    manager.release(&handle).await;
    manager.shutdown();
}

#[tokio::test(start_paused = true)]
async fn outage_during_heartbeat_does_not_drop_the_lease() {
    let store = Arc::new(MemoryStore::new());
    let manager = new_manager(store.clone());
    let config = fast_config();

    let holder = manager.create_lock("/fm/hb-outage");
    assert_eq!(manager.acquire(&holder).await, AcquireOutcome::Acquired);

    // Outage spanning two heartbeat ticks, restored before the TTL boundary
    store.set_unavailable(true);
    tokio::time::sleep(config.heartbeat_interval() * 2 + Duration::from_millis(100)).await;
    store.set_unavailable(false);

    tokio::time::sleep(config.ttl() * 2).await;

    assert!(manager.is_acquired(&holder));
    let contender = manager.create_lock("/fm/hb-outage");
    assert_eq!(
        manager.acquire_timeout(&contender, Duration::ZERO).await,
        AcquireOutcome::TimedOut
    );

    manager.release(&holder).await;
    manager.shutdown();
}

#[tokio::test(start_paused = true)]
async fn stale_release_cannot_delete_a_reclaimed_lease() {
    let store = Arc::new(MemoryStore::new());
    let crashed = new_manager(store.clone());
    let survivor = new_manager(store.clone());
    let ttl = fast_config().ttl();

    let stale = crashed.create_lock("/fm/stale");
    assert_eq!(crashed.acquire(&stale).await, AcquireOutcome::Acquired);

    // Renewals stop but the handle still believes it is held
    crashed.shutdown();
    tokio::time::sleep(ttl + Duration::from_millis(500)).await;

    let takeover = survivor.create_lock("/fm/stale");
    assert_eq!(
        survivor.acquire_timeout(&takeover, Duration::ZERO).await,
        AcquireOutcome::Acquired
    );

    // The stale handle's conditional delete must miss the new lease
    crashed.release(&stale).await;

    let record = store.get(takeover.path()).await.unwrap().unwrap();
    assert_eq!(record.owner_id, *takeover.owner_id());

    survivor.release(&takeover).await;
    survivor.shutdown();
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_waiting_acquires_without_store_residue() {
    let store = Arc::new(MemoryStore::new());
    let holder_mgr = new_manager(store.clone());
    let waiter_mgr = Arc::new(new_manager(store.clone()));

    let held = holder_mgr.create_lock("/fm/cancel");
    assert_eq!(holder_mgr.acquire(&held).await, AcquireOutcome::Acquired);

    let blocked = waiter_mgr.create_lock("/fm/cancel");
    let waiting = {
        let waiter_mgr = waiter_mgr.clone();
        let blocked = blocked.clone();
        tokio::spawn(async move { waiter_mgr.acquire(&blocked).await })
    };

    tokio::time::sleep(Duration::from_millis(400)).await;
    waiter_mgr.shutdown();

    assert_eq!(waiting.await.unwrap(), AcquireOutcome::Cancelled);
    assert!(!blocked.is_acquired());

    // The holder's lease is untouched by the cancelled wait
    let record = store.get(held.path()).await.unwrap().unwrap();
    assert_eq!(record.owner_id, *held.owner_id());

    holder_mgr.release(&held).await;
    holder_mgr.shutdown();
}

#[tokio::test(start_paused = true)]
async fn release_of_expired_handle_is_a_noop() {
    let store = Arc::new(MemoryStore::new());
    let crashed = new_manager(store.clone());
    let ttl = fast_config().ttl();

    let handle = crashed.create_lock("/fm/expired-release");
    assert_eq!(crashed.acquire(&handle).await, AcquireOutcome::Acquired);

    crashed.shutdown();
    tokio::time::sleep(ttl + Duration::from_millis(500)).await;

    // Lease is gone from the store; release just clears local state
    crashed.release(&handle).await;
    assert!(!handle.is_acquired());
    assert!(store.get(handle.path()).await.unwrap().is_none());
}
