//! Default configuration values shared between the provider and its tools
//!
//! These constants keep retry budgets and rule priorities consistent across
//! all azsandbox components.

/// Marker the control plane puts in messages for faults that are safe to retry
pub const RETRYABLE_ERROR_MARKER: &str = "retryable";

/// Marker for a disk delete that raced the VM releasing the disk
pub const DISK_ATTACHED_ERROR_MARKER: &str = "is being attached to vm";

/// Marker for the transport's "pool is closed" race
pub const POOL_CLOSED_ERROR_MARKER: &str = "pool is closed";

/// Wait between retry attempts in milliseconds
pub const DEFAULT_RETRY_WAIT_MS: u64 = 2000;

/// Attempts for connection faults and provider-retryable faults
pub const DEFAULT_RETRY_MAX_ATTEMPTS: usize = 20;

/// Attempts for disk deletes while the disk is still attached.
///
/// Detach is eventually consistent and can take far longer than a generic
/// retryable fault.
pub const DISK_DETACH_MAX_ATTEMPTS: usize = 300;

/// First priority handed out for inbound port rules on a VM security group
pub const INBOUND_RULE_START_PRIORITY: u32 = 1000;

/// Highest priority Azure accepts on a security rule
pub const MAX_RULE_PRIORITY: u32 = 4096;

