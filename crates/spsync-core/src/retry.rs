//! Reusable retry policy
//!
//! A [`RetryPolicy`] is a maximum attempt count plus a delay function of the
//! attempt number. The same policy type drives the Graph transport, the
//! resumable-upload chunk loop and the per-file upload wrapper.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use spsync_core::retry::RetryPolicy;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let policy = RetryPolicy::fixed(3, Duration::from_secs(2));
//! let value = policy
//!     .run("fetch thing", |attempt| async move {
//!         if attempt < 1 {
//!             anyhow::bail!("transient");
//!         }
//!         Ok(42)
//!     })
//!     .await?;
//! assert_eq!(value, 42);
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// How the wait between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay after every failed attempt.
    Fixed(Duration),
    /// `unit * 2^attempt + offset` after failed attempt number `attempt` (zero-based).
    Exponential { unit: Duration, offset: Duration },
}

/// Maximum attempt count and the delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
}

impl RetryPolicy {
    /// Policy with a fixed delay. `max_attempts` is clamped to at least 1.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::Fixed(delay),
        }
    }

    /// Policy with an exponential delay of `unit * 2^attempt + offset`.
    pub fn exponential(max_attempts: u32, unit: Duration, offset: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::Exponential { unit, offset },
        }
    }

    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Delay to wait after the zero-based attempt `attempt` failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { unit, offset } => {
                let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
                unit.saturating_mul(factor).saturating_add(offset)
            }
        }
    }

    /// Whether the zero-based attempt `attempt` is the final one.
    pub fn is_last(&self, attempt: u32) -> bool {
        attempt + 1 >= self.max_attempts
    }

    /// Runs `op` until it succeeds or the attempts are exhausted.
    ///
    /// `op` receives the zero-based attempt number. The error of the final
    /// attempt is returned unchanged.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> anyhow::Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(operation, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if self.is_last(attempt) => {
                    warn!(
                        operation,
                        attempts = attempt + 1,
                        error = %e,
                        "Retry limit exhausted"
                    );
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
