//! Lockstone - lease-based distributed lock manager
//!
//! This crate provides:
//! - `LockManager`: acquisition and release of mutually exclusive,
//!   lease-based locks over named logical paths
//! - A heartbeat scheduler that renews every held lease on a fixed cadence
//! - `StoreAdapter`: the atomic conditional-write contract the manager
//!   depends on, with `MemoryStore` as the in-process implementation
//!
//! Processes coordinate solely through the shared store; mutual exclusion
//! rests on the store's atomic create-if-absent and compare-and-swap, never
//! on client-side state. A holder that dies silently simply stops renewing
//! and its lease expires, which is the sole recovery mechanism.

pub mod config;
pub mod error;
mod heartbeat;
pub mod manager;
pub mod model;
pub mod store;

// Re-export commonly used types
pub use config::LockConfig;
pub use error::{LockError, StoreError};
pub use manager::{AcquireOutcome, LockManager};
pub use model::{LeaseVersion, LockHandle, LockPath, LockRecord, OwnerId};
pub use store::{MemoryStore, StoreAdapter, WriteOutcome};
