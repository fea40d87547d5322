//! Lock data model
//!
//! This module defines:
//! - `LockPath` / `OwnerId` / `LeaseVersion`: identifiers for a lease
//! - `LockRecord`: the store-resident lease record
//! - `LockHandle`: the client-resident handle mutated by acquire/release
//!   and by the heartbeat scheduler

use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque name of a contended resource, e.g. `/jobs/nightly-sweep`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockPath(String);

impl LockPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for LockPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for LockPath {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for LockPath {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identifier of a lease holder, unique per handle
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Generate a fresh owner id for a new handle
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for OwnerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Token distinguishing one lease incarnation from any other on the same path.
///
/// Allocated from a per-manager monotonic counter on each successful acquire;
/// conditional store writes match on `(owner_id, lease_version)` so a renewal
/// or release can never affect a lease acquired by someone else after expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeaseVersion(u64);

impl LeaseVersion {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl Display for LeaseVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Store-resident lease record
///
/// At most one non-expired record exists per path at any instant; the store's
/// atomic create-if-absent and compare-and-swap enforce this, never the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Locked path
    pub path: LockPath,
    /// Current holder
    pub owner_id: OwnerId,
    /// Lease incarnation token
    pub lease_version: LeaseVersion,
    /// Expiration timestamp (Unix millis); informational only, the store
    /// enforces expiry itself
    pub expires_at: i64,
}

impl LockRecord {
    /// Build a record expiring `ttl` from now
    pub fn new(path: LockPath, owner_id: OwnerId, lease_version: LeaseVersion, ttl: Duration) -> Self {
        Self {
            path,
            owner_id,
            lease_version,
            expires_at: current_timestamp() + ttl.as_millis() as i64,
        }
    }

    /// Same lease, extended expiration; used by heartbeat renewal
    pub fn refreshed(&self, ttl: Duration) -> Self {
        Self {
            expires_at: current_timestamp() + ttl.as_millis() as i64,
            ..self.clone()
        }
    }
}

#[derive(Debug, Default)]
struct HandleState {
    acquired: bool,
    lease_version: Option<LeaseVersion>,
}

/// Client-resident handle to a lock on one path
///
/// Created by `LockManager::create_lock` without any store access. The
/// acquired flag and lease version live behind a shared cell so the heartbeat
/// task can flip them off when ownership is lost; the mutex is scoped to
/// state flips and never held across a store call. A handle has one logical
/// owner task at a time.
#[derive(Debug, Clone)]
pub struct LockHandle {
    path: LockPath,
    owner_id: OwnerId,
    state: Arc<Mutex<HandleState>>,
}

impl LockHandle {
    pub(crate) fn new(path: LockPath) -> Self {
        Self {
            path,
            owner_id: OwnerId::generate(),
            state: Arc::new(Mutex::new(HandleState::default())),
        }
    }

    pub fn path(&self) -> &LockPath {
        &self.path
    }

    pub fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }

    /// Last known acquisition state; authoritative only while the heartbeat
    /// is live, not a store read
    pub fn is_acquired(&self) -> bool {
        self.state.lock().acquired
    }

    /// Version of the currently held lease, if any
    pub(crate) fn lease_version(&self) -> Option<LeaseVersion> {
        let state = self.state.lock();
        if state.acquired { state.lease_version } else { None }
    }

    pub(crate) fn mark_acquired(&self, version: LeaseVersion) {
        let mut state = self.state.lock();
        state.acquired = true;
        state.lease_version = Some(version);
    }

    /// Flip acquired off only if the handle still holds the given lease
    /// incarnation. Returns false when the lease has moved on (released and
    /// re-acquired) since the caller sampled `version`, in which case the
    /// live lease is left untouched.
    pub(crate) fn clear_if_version(&self, version: LeaseVersion) -> bool {
        let mut state = self.state.lock();
        if state.acquired && state.lease_version == Some(version) {
            state.acquired = false;
            true
        } else {
            false
        }
    }

    /// Flip the handle to released and hand back the held version, if the
    /// handle was actually held. Single atomic step so a concurrent
    /// heartbeat-side flip cannot race a double release.
    pub(crate) fn take_acquired(&self) -> Option<LeaseVersion> {
        let mut state = self.state.lock();
        if state.acquired {
            state.acquired = false;
            state.lease_version.take()
        } else {
            None
        }
    }
}

pub(crate) fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
