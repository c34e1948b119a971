//! Shared test utilities for azsandbox
//!
//! This crate provides test doubles that integration tests can share
//! without a circular dependency on the provider's own test modules.
//!
//! ## Modules
//!
//! - [`fake_azure`]: in-memory control plane with call log and fault injection
//! - [`fixtures`]: builders for VMs, NICs, disks and rules
//! - [`collaborators`]: recording IP pool and lock manager
//! - [`ids`]: unique resource names and test logging

pub mod collaborators;
pub mod fake_azure;
pub mod fixtures;
pub mod ids;

// Re-export commonly used items
pub use collaborators::{RecordingIpPool, RecordingLockManager};
pub use fake_azure::FakeAzure;
pub use ids::{init_test_tracing, unique_vm_name};
