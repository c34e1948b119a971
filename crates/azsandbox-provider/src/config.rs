//! Configuration types for the provider

use crate::azure::retry::{RetryPolicies, RetryPolicy};
use crate::wait::PollConfig;
use std::fmt;
use std::time::Duration;

pub use azsandbox_common::defaults::{
    DEFAULT_RETRY_MAX_ATTEMPTS, DEFAULT_RETRY_WAIT_MS, DISK_DETACH_MAX_ATTEMPTS,
};

/// Default Azure region for new security groups
pub const DEFAULT_REGION: &str = "westeurope";

/// Azure service principal and subscription
#[derive(Clone)]
pub struct AzureConfig {
    pub subscription_id: String,
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    /// Region used when creating security groups
    pub region: String,
}

impl fmt::Debug for AzureConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureConfig")
            .field("subscription_id", &self.subscription_id)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("region", &self.region)
            .finish()
    }
}

/// Retry budgets
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts for connection and provider-retryable faults
    pub transient_attempts: usize,
    /// Attempts for deleting a disk still attached to a VM
    pub disk_detach_attempts: usize,
    /// Wait between attempts, in milliseconds
    pub wait_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            transient_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            disk_detach_attempts: DISK_DETACH_MAX_ATTEMPTS,
            wait_ms: DEFAULT_RETRY_WAIT_MS,
        }
    }
}

impl RetryConfig {
    pub fn policies(&self) -> RetryPolicies {
        let wait = Duration::from_millis(self.wait_ms);
        RetryPolicies {
            transient: RetryPolicy {
                max_attempts: self.transient_attempts.max(1),
                wait,
            },
            disk_detach: RetryPolicy {
                max_attempts: self.disk_detach_attempts.max(1),
                wait,
            },
        }
    }
}

/// Sandbox reservation parameters
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub reservation_id: String,
    /// Defaults to the reservation id
    pub resource_group: Option<String>,
}

/// Full provider configuration
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub azure: AzureConfig,
    pub retry: RetryConfig,
    /// Long-running operation polling
    pub poll: PollConfig,
}

impl ProviderConfig {
    pub fn region(&self) -> &str {
        &self.azure.region
    }
}
