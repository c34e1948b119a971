//! Retry policies for control-plane calls
//!
//! Three predicates decide whether a failure is worth another attempt:
//! connection faults, faults the control plane marks "retryable", and
//! deletes of a disk that is still attached to a VM. Each category has a
//! fixed wait between attempts and a bounded attempt count.

use super::error::classify_anyhow_error;
use anyhow::Result;
use azsandbox_common::defaults::{
    DEFAULT_RETRY_MAX_ATTEMPTS, DEFAULT_RETRY_WAIT_MS, DISK_DETACH_MAX_ATTEMPTS,
};
use backon::{ConstantBuilder, Retryable};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Fixed-delay retry budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: usize,
    /// Wait between attempts
    pub wait: Duration,
}

impl RetryPolicy {
    /// Budget for connection and provider-retryable faults
    pub const fn transient() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            wait: Duration::from_millis(DEFAULT_RETRY_WAIT_MS),
        }
    }

    /// Budget for deleting a disk whose VM is still releasing it
    pub const fn disk_detach() -> Self {
        Self {
            max_attempts: DISK_DETACH_MAX_ATTEMPTS,
            wait: Duration::from_millis(DEFAULT_RETRY_WAIT_MS),
        }
    }

    fn backoff(&self) -> ConstantBuilder {
        ConstantBuilder::default()
            .with_delay(self.wait)
            .with_max_times(self.max_attempts.saturating_sub(1))
    }
}

/// The pair of policies a client applies to every call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicies {
    pub transient: RetryPolicy,
    pub disk_detach: RetryPolicy,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            transient: RetryPolicy::transient(),
            disk_detach: RetryPolicy::disk_detach(),
        }
    }
}

/// Low-level request/connection fault, including a closed connection pool
pub fn retry_on_connection_error(error: &anyhow::Error) -> bool {
    classify_anyhow_error(error).is_connection()
}

/// Control-plane error whose message contains "retryable"
pub fn retry_on_retryable_error(error: &anyhow::Error) -> bool {
    classify_anyhow_error(error).is_retryable()
}

/// Control-plane error saying the disk "is being attached to vm"
pub fn retry_on_vm_disk_detach_error(error: &anyhow::Error) -> bool {
    classify_anyhow_error(error).is_disk_attached()
}

/// Connection or provider-retryable fault
pub fn retry_on_transient_error(error: &anyhow::Error) -> bool {
    let class = classify_anyhow_error(error);
    class.is_connection() || class.is_retryable()
}

/// Run `operation` until it succeeds, fails with an error `should_retry`
/// rejects, or the policy's attempts run out.
pub async fn retry_when<T, F, Fut, P>(
    policy: RetryPolicy,
    operation: &str,
    f: F,
    should_retry: P,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: FnMut(&anyhow::Error) -> bool,
{
    f.retry(policy.backoff())
        .when(should_retry)
        .notify(|e, delay| {
            warn!(
                operation,
                delay_ms = delay.as_millis() as u64,
                error = %e,
                "Azure call failed, retrying"
            );
        })
        .await
}

/// Retry on connection and provider-retryable faults
pub async fn retry_transient<T, F, Fut>(policy: RetryPolicy, operation: &str, f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_when(policy, operation, f, retry_on_transient_error).await
}

/// Retry a disk delete under both policies.
///
/// The outer loop only retries a disk still attached to a VM. Each outer
/// attempt runs a full transient retry loop, so connection and
/// provider-retryable faults never spend the disk-detach budget.
pub async fn retry_disk_delete<F, Fut>(policies: RetryPolicies, operation: &str, f: F) -> Result<()>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    retry_when(
        policies.disk_detach,
        operation,
        || retry_transient(policies.transient, operation, &f),
        retry_on_vm_disk_detach_error,
    )
    .await
}
