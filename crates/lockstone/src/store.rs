//! Store adapter contract and in-memory implementation
//!
//! The lock manager depends on four atomic primitives with per-key TTL:
//! create-if-absent, compare-and-swap, delete-if-match and a point read.
//! TTL expiry is enforced by the store itself; once elapsed, a key reads as
//! absent whether or not a delete was ever issued. The manager never tracks
//! wall-clock expiry for correctness.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::{DashMap, Entry};
use tokio::time::Instant;

use crate::error::StoreError;
use crate::model::{LeaseVersion, LockPath, LockRecord, OwnerId};

/// Result of a conditional write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write landed
    Applied,
    /// The key's current state did not match the condition
    Conflict,
}

/// Atomic conditional-write contract of the replicated store
///
/// Every mutating call is conditional on the expected owner/version; the
/// mutual-exclusion invariant rests entirely on the store honoring these
/// conditions atomically.
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    /// Establish the lock namespace (schema, table, keyspace) with the given
    /// write durability. Called once at manager startup.
    async fn ensure_namespace(&self, replication_factor: u32) -> Result<(), StoreError>;

    /// Write `record` under its path only if no live record exists there
    async fn create_if_absent(
        &self,
        record: &LockRecord,
        ttl: Duration,
    ) -> Result<WriteOutcome, StoreError>;

    /// Replace the live record under `record.path` only if it is still held
    /// by `record.owner_id` at `expected` version, resetting its TTL
    async fn compare_and_swap(
        &self,
        record: &LockRecord,
        expected: LeaseVersion,
        ttl: Duration,
    ) -> Result<WriteOutcome, StoreError>;

    /// Delete the record under `path` only if it is still held by
    /// `(owner, version)`
    async fn delete_if_match(
        &self,
        path: &LockPath,
        owner: &OwnerId,
        version: LeaseVersion,
    ) -> Result<WriteOutcome, StoreError>;

    /// Point read; expired records read as absent
    async fn get(&self, path: &LockPath) -> Result<Option<LockRecord>, StoreError>;
}

struct StoredEntry {
    record: LockRecord,
    expires_at: Instant,
}

impl StoredEntry {
    fn new(record: &LockRecord, ttl: Duration) -> Self {
        Self {
            record: record.clone(),
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    fn matches(&self, owner: &OwnerId, version: LeaseVersion) -> bool {
        !self.is_expired() && self.record.owner_id == *owner && self.record.lease_version == version
    }
}

/// In-process `StoreAdapter` over a `DashMap`
///
/// Reference implementation of the contract and the test double for the
/// manager. Expiry runs on the tokio clock so paused-clock tests stay
/// deterministic; expired entries are purged lazily on access. The
/// `set_unavailable` switch injects transient store failures.
pub struct MemoryStore {
    entries: DashMap<LockPath, StoredEntry>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Make every subsequent operation fail with `StoreError::Unavailable`
    /// until switched back
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected store outage".to_string()));
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreAdapter for MemoryStore {
    async fn ensure_namespace(&self, replication_factor: u32) -> Result<(), StoreError> {
        self.check_available()?;
        if replication_factor == 0 {
            return Err(StoreError::Unavailable(
                "replication factor must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    async fn create_if_absent(
        &self,
        record: &LockRecord,
        ttl: Duration,
    ) -> Result<WriteOutcome, StoreError> {
        self.check_available()?;
        match self.entries.entry(record.path.clone()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(StoredEntry::new(record, ttl));
                    Ok(WriteOutcome::Applied)
                } else {
                    Ok(WriteOutcome::Conflict)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredEntry::new(record, ttl));
                Ok(WriteOutcome::Applied)
            }
        }
    }

    async fn compare_and_swap(
        &self,
        record: &LockRecord,
        expected: LeaseVersion,
        ttl: Duration,
    ) -> Result<WriteOutcome, StoreError> {
        self.check_available()?;
        match self.entries.entry(record.path.clone()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().matches(&record.owner_id, expected) {
                    occupied.insert(StoredEntry::new(record, ttl));
                    Ok(WriteOutcome::Applied)
                } else {
                    Ok(WriteOutcome::Conflict)
                }
            }
            Entry::Vacant(_) => Ok(WriteOutcome::Conflict),
        }
    }

    async fn delete_if_match(
        &self,
        path: &LockPath,
        owner: &OwnerId,
        version: LeaseVersion,
    ) -> Result<WriteOutcome, StoreError> {
        self.check_available()?;
        let removed = self
            .entries
            .remove_if(path, |_, entry| entry.matches(owner, version));
        Ok(if removed.is_some() {
            WriteOutcome::Applied
        } else {
            WriteOutcome::Conflict
        })
    }

    async fn get(&self, path: &LockPath) -> Result<Option<LockRecord>, StoreError> {
        self.check_available()?;
        if let Some(entry) = self.entries.get(path) {
            if !entry.is_expired() {
                return Ok(Some(entry.record.clone()));
            }
        }
        // Lazy purge of the expired entry
        self.entries.remove_if(path, |_, entry| entry.is_expired());
        Ok(None)
    }
}
