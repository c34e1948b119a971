//! Reservation IP pool and advisory lock collaborators

use anyhow::Result;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Mutex;
use tracing::{debug, info};

/// Service that hands out static private IPs per reservation
pub trait IpPoolManager: Send + Sync {
    /// Return `ips` to the reservation's pool
    fn release_ips(
        &self,
        reservation_id: &str,
        ips: &[String],
    ) -> impl Future<Output = Result<()>> + Send;
}

/// IP pool used when no pool service is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledIpPool;

impl IpPoolManager for DisabledIpPool {
    async fn release_ips(&self, reservation_id: &str, ips: &[String]) -> Result<()> {
        info!(
            reservation_id = %reservation_id,
            ips = ?ips,
            "No IP pool configured, skipping release"
        );
        Ok(())
    }
}

/// Advisory locks keyed by name
#[cfg_attr(test, mockall::automock)]
pub trait LockManager: Send + Sync {
    fn release_lock(&self, name: &str) -> Result<()>;
}

/// In-process keyed locks
#[derive(Debug, Default)]
pub struct InMemoryLockManager {
    held: Mutex<HashSet<String>>,
}

impl InMemoryLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock; `false` if it is already held
    pub fn acquire(&self, name: &str) -> bool {
        let acquired = self
            .held
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string());
        debug!(lock = %name, acquired, "Acquire lock");
        acquired
    }

    /// Drop the lock; releasing a free lock is a no-op
    pub fn release(&self, name: &str) -> bool {
        let released = self
            .held
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name);
        debug!(lock = %name, released, "Release lock");
        released
    }

    pub fn is_locked(&self, name: &str) -> bool {
        self.held
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(name)
    }
}

impl LockManager for InMemoryLockManager {
    fn release_lock(&self, name: &str) -> Result<()> {
        self.release(name);
        Ok(())
    }
}
