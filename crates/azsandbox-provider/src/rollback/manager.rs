//! Ledger of executed commands and reverse-order compensation

use super::RollbackCommand;
use super::cancellation::CancellationManager;
use anyhow::Result;
use tracing::{debug, info, warn};

/// Outcome of unwinding a ledger
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RollbackReport {
    /// Commands whose rollback succeeded, in the order they were undone
    pub rolled_back: Vec<String>,
    /// Commands whose rollback failed, with the error text
    pub failed: Vec<(String, String)>,
}

impl RollbackReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Records successfully executed commands so they can be undone.
///
/// Entries are appended only after `execute` succeeds and unwound in strict
/// reverse order. A manager dropped with entries still in the ledger logs a
/// warning: those resources were neither committed nor rolled back.
pub struct RollbackManager<'a> {
    ledger: Vec<Box<dyn RollbackCommand + 'a>>,
    cancellation: CancellationManager,
}

impl<'a> RollbackManager<'a> {
    pub fn new(cancellation: CancellationManager) -> Self {
        Self {
            ledger: Vec::new(),
            cancellation,
        }
    }

    pub fn cancellation(&self) -> &CancellationManager {
        &self.cancellation
    }

    /// Number of executed, uncommitted commands
    pub fn len(&self) -> usize {
        self.ledger.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ledger.is_empty()
    }

    /// Descriptions of the ledger entries in execution order
    pub fn executed(&self) -> Vec<String> {
        self.ledger.iter().map(|c| c.describe()).collect()
    }

    /// Execute one command and record it.
    ///
    /// Cancellation is checked first; a cancelled manager never runs the
    /// forward action.
    pub async fn execute(&mut self, command: Box<dyn RollbackCommand + 'a>) -> Result<()> {
        let description = command.describe();
        self.cancellation.check(&description)?;

        debug!(command = %description, "Executing command");
        command.execute().await?;

        self.ledger.push(command);
        Ok(())
    }

    /// Undo every recorded command in reverse order.
    ///
    /// Failures are logged and collected; the unwind always continues.
    pub async fn rollback(&mut self) -> RollbackReport {
        let mut report = RollbackReport::default();

        while let Some(command) = self.ledger.pop() {
            let description = command.describe();
            match command.rollback().await {
                Ok(()) => {
                    info!(command = %description, "Rolled back");
                    report.rolled_back.push(description);
                }
                Err(e) => {
                    warn!(command = %description, error = ?e, "Rollback failed, continuing");
                    report.failed.push((description, format!("{e:#}")));
                }
            }
        }

        report
    }

    /// Forget the ledger: executed work is kept. Returns how many commands
    /// were committed.
    pub fn commit(&mut self) -> usize {
        let committed = self.ledger.len();
        self.ledger.clear();
        committed
    }

    /// Execute `commands` in order, unwinding everything on the first failure.
    ///
    /// The returned error is the one that stopped execution, never a
    /// rollback error.
    pub async fn execute_all(
        &mut self,
        commands: Vec<Box<dyn RollbackCommand + 'a>>,
    ) -> Result<()> {
        for command in commands {
            if let Err(e) = self.execute(command).await {
                warn!(error = %e, executed = self.ledger.len(), "Command failed, rolling back");
                let report = self.rollback().await;
                if !report.is_clean() {
                    warn!(failed = report.failed.len(), "Rollback finished with failures");
                }
                return Err(e);
            }
        }
        Ok(())
    }
}

impl Drop for RollbackManager<'_> {
    fn drop(&mut self) {
        if !self.ledger.is_empty() {
            warn!(
                pending = ?self.executed(),
                "Rollback manager dropped with uncommitted commands"
            );
        }
    }
}
