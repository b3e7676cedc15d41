//! Bounded retry for vendor job lookups
//!
//! Lookups that fail with a transient error are retried with a fixed delay up
//! to `max_attempts` consecutive times. Non-transient errors are returned
//! immediately; exhausting the attempts yields
//! [`BigShiftError::TransferRpc`] carrying the operation label, the attempt
//! count and the last underlying message.

use bigshift_common::{BigShiftError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::clock::Clock;

/// Default number of consecutive attempts before a lookup is abandoned
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Policy with the default attempt budget and the given fixed delay
    pub fn with_delay(delay: Duration) -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, delay)
    }

    /// Run `operation` until it succeeds, fails permanently, or the attempt
    /// budget is spent. `what` names the call in logs and in the final error.
    pub async fn run<T, F, Fut>(&self, clock: &dyn Clock, what: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() => return Err(err),
                Err(err) if attempt >= self.max_attempts => {
                    return Err(BigShiftError::TransferRpc {
                        operation: what.to_string(),
                        attempts: attempt,
                        message: err.to_string(),
                    });
                },
                Err(err) => {
                    debug!(
                        attempt,
                        max_attempts = self.max_attempts,
                        "Error while {}, will retry: {}",
                        what,
                        err
                    );
                    clock.sleep(self.delay).await;
                },
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::with_delay(Duration::from_secs(30))
    }
}
