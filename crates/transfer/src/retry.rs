use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::TransferError;
use crate::types::TransferResult;

/// Whole-transfer retry with a fixed delay between tries.
///
/// Each try re-runs the operation from scratch (re-opening the source); a
/// chunked session is never resumed across tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries, including the first. Zero behaves like one.
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// A single try, no retries.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Runs `op` until it succeeds, fails with a non-retryable reason, or the
    /// tries are exhausted. `op` receives the one-based try number.
    ///
    /// The returned result carries the number of tries made.
    pub async fn run<F, Fut>(&self, cancel: &CancellationToken, mut op: F) -> TransferResult
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = TransferResult>,
    {
        let max = self.attempts.max(1);
        let mut attempt = 1;

        loop {
            let mut result = op(attempt).await;
            result.attempts = attempt;

            if !result.is_retryable() || attempt >= max {
                if attempt > 1 {
                    debug!(attempt, succeeded = result.succeeded, "retry loop finished");
                }
                return result;
            }

            warn!(
                attempt,
                max,
                reason = ?result.failure_reason,
                error = result.error.as_deref().unwrap_or_default(),
                delay_secs = self.delay.as_secs(),
                "transfer failed, retrying"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let mut cancelled = TransferResult::failure(
                        result.strategy_used,
                        result.bytes_transferred,
                        &TransferError::Cancelled,
                    );
                    cancelled.attempts = attempt;
                    return cancelled;
                }
                _ = tokio::time::sleep(self.delay) => {}
            }

            attempt += 1;
        }
    }
}
