//! Polling long-running operations to completion.
//!
//! ARM answers many mutating calls with `201`/`202` and a status URL. The
//! caller polls that URL until it reports a terminal state. The control
//! plane may dictate the next delay through `Retry-After`; otherwise an
//! exponential backoff is used.

use anyhow::Result;
use backon::{BackoffBuilder, ExponentialBuilder};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Configuration for operation polling
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Initial delay between polls when no `Retry-After` is given
    pub initial_delay: Duration,
    /// Cap for the exponential delay and for `Retry-After`
    pub max_delay: Duration,
    /// Maximum total time to wait before timing out
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            timeout: Duration::from_secs(30 * 60),
        }
    }
}

/// Result of a single status poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    /// Operation reached a successful terminal state
    Done,
    /// Still running; optionally with a server-provided delay
    Pending { retry_after: Option<Duration> },
}

/// Poll an operation until it completes.
///
/// `poll` returns [`PollStatus::Done`] on success, [`PollStatus::Pending`]
/// while running, and an error if the operation failed.
///
/// # Returns
/// * `Ok(())` - Operation completed
/// * `Err` - Timeout, cancelled, or the operation failed
pub async fn poll_until_done<F, Fut>(
    config: &PollConfig,
    cancel: Option<&CancellationToken>,
    operation: &str,
    mut poll: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollStatus>>,
{
    let start = Instant::now();
    let mut attempts = 0u32;

    let mut delays = ExponentialBuilder::default()
        .with_min_delay(config.initial_delay)
        .with_max_delay(config.max_delay)
        .with_factor(2.0)
        .without_max_times()
        .build();

    loop {
        attempts += 1;

        if cancel.is_some_and(CancellationToken::is_cancelled) {
            anyhow::bail!("Waiting for {} cancelled", operation);
        }

        if start.elapsed() >= config.timeout {
            anyhow::bail!(
                "Timeout waiting for {} after {:?} ({} polls)",
                operation,
                config.timeout,
                attempts
            );
        }

        let retry_after = match poll().await? {
            PollStatus::Done => {
                debug!(operation, attempts, "Operation completed");
                return Ok(());
            }
            PollStatus::Pending { retry_after } => retry_after,
        };

        let delay = retry_after
            .map(|d| d.min(config.max_delay))
            .or_else(|| delays.next())
            .unwrap_or(config.max_delay);
        debug!(
            operation,
            attempt = attempts,
            delay_ms = delay.as_millis() as u64,
            "Operation still running"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = async {
                match cancel {
                    Some(token) => token.cancelled().await,
                    None => std::future::pending::<()>().await,
                }
            } => {
                anyhow::bail!("Waiting for {} cancelled", operation);
            }
        }
    }
}

/// Parse a `Retry-After` header value given in seconds
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
