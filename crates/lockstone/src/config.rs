// Lock manager configuration
// Provides tunables for lease duration, renewal cadence and acquisition polling

use std::time::Duration;

use crate::error::LockError;

/// Configuration for a `LockManager` instance
#[derive(Clone, Debug)]
pub struct LockConfig {
    /// Write durability requested when establishing the lock namespace
    /// (default: 3)
    pub replication_factor: u32,

    /// Lease duration in milliseconds (default: 5000ms)
    /// A lease not renewed within this window expires in the store
    pub ttl_ms: u64,

    /// Heartbeat interval in milliseconds (default: 1600ms, roughly TTL/3)
    /// Kept well below the TTL so a lease survives several missed ticks
    pub heartbeat_interval_ms: u64,

    /// Retry spacing of the acquire loop in milliseconds (default: 500ms)
    pub acquire_poll_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            replication_factor: 3,
            ttl_ms: 5000,
            heartbeat_interval_ms: 1600,
            acquire_poll_interval_ms: 500,
        }
    }
}

impl LockConfig {
    /// Create a config with custom settings
    pub fn new(
        replication_factor: u32,
        ttl_ms: u64,
        heartbeat_interval_ms: u64,
        acquire_poll_interval_ms: u64,
    ) -> Self {
        Self {
            replication_factor,
            ttl_ms,
            heartbeat_interval_ms,
            acquire_poll_interval_ms,
        }
    }

    /// Get lease TTL as Duration
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// Get heartbeat interval as Duration
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Get acquire poll interval as Duration
    pub fn acquire_poll_interval(&self) -> Duration {
        Duration::from_millis(self.acquire_poll_interval_ms)
    }

    /// Check the settings are internally consistent
    pub fn validate(&self) -> Result<(), LockError> {
        if self.replication_factor == 0 {
            return Err(LockError::Initialization(
                "replication_factor must be at least 1".to_string(),
            ));
        }
        if self.ttl_ms == 0 {
            return Err(LockError::Initialization(
                "ttl_ms must be greater than zero".to_string(),
            ));
        }
        if self.heartbeat_interval_ms == 0 || self.heartbeat_interval_ms >= self.ttl_ms {
            return Err(LockError::Initialization(format!(
                "heartbeat_interval_ms ({}) must be non-zero and below ttl_ms ({})",
                self.heartbeat_interval_ms, self.ttl_ms
            )));
        }
        if self.acquire_poll_interval_ms == 0 {
            return Err(LockError::Initialization(
                "acquire_poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LockConfig::default();
        assert_eq!(config.replication_factor, 3);
        assert_eq!(config.ttl_ms, 5000);
        assert_eq!(config.heartbeat_interval_ms, 1600);
        assert_eq!(config.acquire_poll_interval_ms, 500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duration_helpers() {
        let config = LockConfig::new(1, 2000, 600, 100);
        assert_eq!(config.ttl(), Duration::from_millis(2000));
        assert_eq!(config.heartbeat_interval(), Duration::from_millis(600));
        assert_eq!(config.acquire_poll_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        assert!(LockConfig::new(0, 5000, 1600, 500).validate().is_err());
        assert!(LockConfig::new(3, 0, 1600, 500).validate().is_err());
        assert!(LockConfig::new(3, 5000, 0, 500).validate().is_err());
        assert!(LockConfig::new(3, 5000, 5000, 500).validate().is_err());
        assert!(LockConfig::new(3, 5000, 1600, 0).validate().is_err());
    }
}
