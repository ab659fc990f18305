// SPDX-License-Identifier: MPL-2.0

//! Exponential-backoff retry for remote calls.
//!
//! Delays suspend only the calling task. There is no cancellation: once
//! a sequence starts it runs to success or exhaustion.

use crate::remote::RemoteError;
use std::time::Duration;
use tracing::warn;

/// Retry behavior for a remote operation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub backoff_multiplier: f64,
    /// Errors this returns false for fail on the first attempt, which
    /// is what sends transport failures straight to the mirror.
    pub should_retry: fn(&RemoteError) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(1000),
            backoff_multiplier: 1.5,
            should_retry: RemoteError::is_retryable,
        }
    }
}

/// Run `operation`, retrying per the policy, returning the success
/// value or the last error once attempts run out.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, RemoteError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let mut delay = policy.delay;
    let mut attempt = 1u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if (policy.should_retry)(&e) && attempt < policy.max_attempts => {
                warn!(
                    "remote attempt {}/{} failed, retrying in {:?}: {}",
                    attempt, policy.max_attempts, delay, e
                );
                tokio::time::sleep(delay).await;
                delay = delay.mul_f64(policy.backoff_multiplier);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
