//! Shared helpers for the lockstone property tests

use std::sync::Arc;

use lockstone::{LockConfig, LockManager, MemoryStore};

/// Config with short windows so TTL and heartbeat behavior is observable
/// inside a paused-clock test: TTL 2000ms, heartbeat 600ms, poll 100ms
pub fn fast_config() -> LockConfig {
    LockConfig::new(1, 2000, 600, 100)
}

/// Manager wired to the given store with the fast test config
pub fn new_manager(store: Arc<MemoryStore>) -> LockManager {
    LockManager::new(store, fast_config()).expect("valid test config")
}
