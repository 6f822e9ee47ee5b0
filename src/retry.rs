//! Bounded retry policy for calls across an external boundary.
//!
//! Each attempt runs under its own timeout. Transient failures
//! ([`RagError::is_transient`]) and timeouts are retried until the attempt
//! budget is spent; anything else is returned immediately.
//!
//! Backoff schedules:
//! - **exponential** — `base`, `2 × base`, `4 × base`, … capped at `max`
//!   (embedding boundary)
//! - **fixed** — the same delay before every retry (generation boundary)

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Boundary, RagError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backoff {
    Fixed,
    Exponential,
}

/// Attempt budget plus backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff: Backoff,
}

impl RetryPolicy {
    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            backoff: Backoff::Exponential,
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            backoff: Backoff::Fixed,
        }
    }

    /// A single attempt, no retries.
    pub fn once() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Exponential => {
                let factor = 1u32 << retry.saturating_sub(1).min(16);
                self.base_delay.saturating_mul(factor).min(self.max_delay)
            }
        }
    }
}

/// Run `op` under `policy`, giving every attempt `timeout` to finish.
///
/// `op` is called once per attempt with identical input, so it must be
/// idempotent from the caller's point of view.
pub async fn call_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    boundary: Boundary,
    timeout: Duration,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err = None;

    for attempt in 1..=policy.max_attempts {
        if attempt > 1 {
            let delay = policy.delay_for(attempt - 1);
            debug!(%boundary, attempt, delay_ms = delay.as_millis() as u64, "retrying");
            tokio::time::sleep(delay).await;
        }

        let err = match tokio::time::timeout(timeout, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) if e.is_transient() => e,
            Ok(Err(e)) => return Err(e),
            Err(_) => RagError::timed_out(boundary, timeout),
        };

        warn!(
            %boundary,
            attempt,
            max_attempts = policy.max_attempts,
            error = %err,
            "boundary call failed"
        );
        last_err = Some(err);
    }

    Err(last_err.unwrap_or_else(|| match boundary {
        Boundary::Embedding => RagError::embedding("retry budget is zero", false),
        Boundary::Generation => RagError::generation("retry budget is zero", false),
    }))
}
