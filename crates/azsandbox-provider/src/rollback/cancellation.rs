//! Cooperative cancellation for provisioning commands

use super::RollbackError;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Cancellation signal checked before every command execution.
///
/// Cloning shares the underlying token, so a cancel from any clone is seen
/// by all of them.
#[derive(Debug, Clone, Default)]
pub struct CancellationManager {
    token: CancellationToken,
}

impl CancellationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing token (e.g. a child of a process-wide token)
    pub fn from_token(token: CancellationToken) -> Self {
        Self { token }
    }

    pub fn cancel(&self) {
        info!("Cancellation requested");
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The shared token, for waits that must stop on cancellation
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Fail with [`RollbackError::Cancelled`] if cancellation was requested
    pub fn check(&self, command: &str) -> Result<(), RollbackError> {
        if self.is_cancelled() {
            return Err(RollbackError::Cancelled {
                command: command.to_string(),
            });
        }
        Ok(())
    }
}
