//! Azure client modules
//!
//! - `operations`: the cloud client contract flows are generic over
//! - `client`: ARM REST implementation of that contract
//! - `error`/`retry`: error classification and retry policies

pub mod client;
pub mod context;
pub mod error;
pub mod operations;
pub mod retry;
pub mod types;

pub use client::AzureClient;
pub use context::AzureContext;
pub use error::{AzureError, classify_anyhow_error, classify_cloud_error, ignore_not_found};
pub use operations::AzureOperations;
pub use retry::{RetryPolicies, RetryPolicy};
