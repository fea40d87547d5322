//! Error types for the lock manager
//!
//! Timeout and cancellation are deliberately not errors; they are
//! `AcquireOutcome` variants. Transient store failures are absorbed inside
//! the acquire loop and only surface as a timed-out outcome when a bounded
//! window lapses.

/// Transient failure of the underlying store
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Caller-facing lock manager errors
#[derive(thiserror::Error, Debug)]
pub enum LockError {
    /// The lock namespace could not be established or the configuration is
    /// invalid; fatal to this manager instance
    #[error("lock manager initialization failed: {0}")]
    Initialization(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
