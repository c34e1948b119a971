//! Recording collaborators

use anyhow::{Result, bail};
use azsandbox_provider::collaborators::{IpPoolManager, LockManager};
use std::sync::Mutex;

/// IP pool that records every release and can be told to fail
#[derive(Debug, Default)]
pub struct RecordingIpPool {
    released: Mutex<Vec<(String, Vec<String>)>>,
    failure: Option<String>,
}

impl RecordingIpPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every release fails with `message` (after being recorded)
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// `(reservation_id, ips)` per release call
    pub fn released(&self) -> Vec<(String, Vec<String>)> {
        self.released
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl IpPoolManager for RecordingIpPool {
    async fn release_ips(&self, reservation_id: &str, ips: &[String]) -> Result<()> {
        self.released
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((reservation_id.to_string(), ips.to_vec()));
        if let Some(message) = &self.failure {
            bail!("{message}");
        }
        Ok(())
    }
}

/// Lock manager that records released names and can be told to fail
#[derive(Debug, Default)]
pub struct RecordingLockManager {
    released: Mutex<Vec<String>>,
    failure: Option<String>,
}

impl RecordingLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn released(&self) -> Vec<String> {
        self.released
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl LockManager for RecordingLockManager {
    fn release_lock(&self, name: &str) -> Result<()> {
        self.released
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(name.to_string());
        if let Some(message) = &self.failure {
            bail!("{message}");
        }
        Ok(())
    }
}
