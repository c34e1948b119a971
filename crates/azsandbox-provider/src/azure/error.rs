//! Azure error classification and handling
//!
//! Control-plane failures are mapped onto a small set of categories that
//! drive cleanup (not-found is success during teardown) and retry decisions.
//! Classification is pure: no I/O, no sleeping.

use azsandbox_common::defaults::{
    DISK_ATTACHED_ERROR_MARKER, POOL_CLOSED_ERROR_MARKER, RETRYABLE_ERROR_MARKER,
};
use thiserror::Error;

/// Azure error categories for retry and cleanup logic
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AzureError {
    /// Resource was not found (safe to skip in cleanup)
    #[error("Resource not found: {resource_type} '{resource_name}'")]
    NotFound {
        resource_type: &'static str,
        resource_name: String,
    },

    /// Client request or connection fault (retryable)
    #[error("Azure API connection failed: {message}")]
    Connection { message: String },

    /// Control plane marked the fault as retryable
    #[error("Azure reported a retryable error: {message}")]
    Retryable {
        code: Option<String>,
        message: String,
    },

    /// Disk is still attached to a VM (retryable with a much larger budget)
    #[error("Disk is still attached to a VM: {message}")]
    DiskAttached { message: String },

    /// Any other control-plane error
    #[error("Azure error ({}): {message}", code.as_deref().unwrap_or("unknown"))]
    Cloud {
        status: Option<u16>,
        code: Option<String>,
        message: String,
    },
}

impl AzureError {
    pub fn not_found(resource_type: &'static str, resource_name: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type,
            resource_name: resource_name.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Build an error from a control-plane message, classifying it by content
    pub fn cloud(message: impl Into<String>) -> Self {
        classify_cloud_error("resource", "", None, None, &message.into())
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, AzureError::NotFound { .. })
    }

    /// Check if this is a connection fault
    pub fn is_connection(&self) -> bool {
        matches!(self, AzureError::Connection { .. })
    }

    /// Check if the control plane marked this error as retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, AzureError::Retryable { .. })
    }

    /// Check if this is a disk-still-attached error
    pub fn is_disk_attached(&self) -> bool {
        matches!(self, AzureError::DiskAttached { .. })
    }
}

/// Known ARM error codes for "not found" conditions
const NOT_FOUND_CODES: &[&str] = &[
    "ResourceNotFound",
    "NotFound",
    "ParentResourceNotFound",
    "ResourceGroupNotFound",
    "BlobNotFound",
    "ContainerNotFound",
];

/// Classify a control-plane error from its HTTP status, error code and message.
///
/// The disk-attached marker is checked before the generic retryable marker:
/// a disk-detach fault belongs to the disk-detach policy only.
pub fn classify_cloud_error(
    resource_type: &'static str,
    resource_name: &str,
    status: Option<u16>,
    code: Option<&str>,
    message: &str,
) -> AzureError {
    let lowered = message.to_lowercase();

    if status == Some(404) || code.is_some_and(|c| NOT_FOUND_CODES.contains(&c)) {
        return AzureError::not_found(resource_type, resource_name);
    }

    if lowered.contains(DISK_ATTACHED_ERROR_MARKER) {
        return AzureError::DiskAttached {
            message: message.to_string(),
        };
    }

    if lowered.contains(RETRYABLE_ERROR_MARKER) {
        return AzureError::Retryable {
            code: code.map(str::to_string),
            message: message.to_string(),
        };
    }

    AzureError::Cloud {
        status,
        code: code.map(str::to_string),
        message: message.to_string(),
    }
}

/// Classify an error from an anyhow::Error.
///
/// Walks the error chain looking for a typed [`AzureError`] or a transport
/// error from `reqwest`. The only text match is the transport's "pool is
/// closed" race. Anything else is a local failure: it becomes a plain
/// [`AzureError::Cloud`] without marker matching, so it is never retried.
pub fn classify_anyhow_error(error: &anyhow::Error) -> AzureError {
    for cause in error.chain() {
        if let Some(e) = cause.downcast_ref::<AzureError>() {
            return e.clone();
        }
        if let Some(e) = cause.downcast_ref::<reqwest::Error>() {
            if e.is_connect() || e.is_timeout() || e.is_request() {
                return AzureError::connection(e.to_string());
            }
        }
    }

    let debug_str = format!("{error:?}");
    if debug_str.to_lowercase().contains(POOL_CLOSED_ERROR_MARKER) {
        return AzureError::connection(error.to_string());
    }

    AzureError::Cloud {
        status: None,
        code: None,
        message: format!("{error:#}"),
    }
}

/// Turn a not-found failure into `Ok(None)` for idempotent deletes.
pub fn ignore_not_found<T>(result: anyhow::Result<T>) -> anyhow::Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if classify_anyhow_error(&e).is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
