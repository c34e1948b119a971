//! Compensating-action framework for multi-step provisioning
//!
//! A [`RollbackCommand`] pairs a forward action with the action that undoes
//! it. The [`RollbackManager`] runs commands in order, keeps the ones that
//! succeeded, and on failure undoes them newest first.

mod cancellation;
mod manager;

pub use cancellation::CancellationManager;
pub use manager::{RollbackManager, RollbackReport};

use anyhow::Result;
use futures::future::BoxFuture;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RollbackError {
    /// Cancellation was requested before the command ran
    #[error("Operation cancelled before '{command}'")]
    Cancelled { command: String },
}

/// A unit of provisioning work with its compensation.
///
/// `rollback` must undo exactly what `execute` did using state captured at
/// construction; it is only called after `execute` succeeded.
pub trait RollbackCommand: Send + Sync {
    /// Short description for logs
    fn describe(&self) -> String;

    fn execute(&self) -> BoxFuture<'_, Result<()>>;

    fn rollback(&self) -> BoxFuture<'_, Result<()>>;
}
