//! Bounded retry with a fixed pause between attempts.

use std::fmt::Display;
use std::time::Duration;

use tokio_retry::{strategy::FixedInterval, Action, RetryIf};
use tracing::warn;

/// Retry policy shared by the poll and bulk index call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included. Never zero.
    pub max_attempts: usize,
    /// Pause between two attempts.
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
        }
    }

    /// Run `action` until it succeeds or `max_attempts` attempts have failed.
    ///
    /// Returns the error of the last attempt when every attempt failed.
    pub async fn run<A>(&self, operation: &str, action: A) -> Result<A::Item, A::Error>
    where
        A: Action,
        A::Error: Display,
    {
        let max_attempts = self.max_attempts;
        let mut attempt = 0usize;
        let strategy = FixedInterval::new(self.interval).take(max_attempts - 1);

        RetryIf::spawn(strategy, action, |e: &A::Error| {
            attempt += 1;
            warn!(
                operation = %operation,
                attempt = attempt,
                max_attempts = max_attempts,
                error = %e,
                "Attempt failed"
            );
            true
        })
        .await
    }
}
