//! Retry execution with exponential backoff and jitter.
//!
//! [`run_with_retry`] drives an async operation under a [`RetryPolicy`]:
//! classified errors stop the loop when the policy's predicate says they are
//! permanent, retryable errors sleep a jittered exponential delay, and the
//! sleep itself is cancellable so shutdown drains in bounded time.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ProviderError;

/// Predicate deciding whether a classified error is worth retrying.
pub type RetryPredicate = Arc<dyn Fn(&ProviderError) -> bool + Send + Sync>;

/// Retry behavior for one logical provider call.
///
/// Delay for 0-indexed attempt `i` is
/// `min(max_delay, base_delay * multiplier^i)` plus a uniform jitter in
/// `[0, jitter_ratio * that]`, sampled independently per attempt.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first (`>= 1`).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Cap on the exponential growth.
    pub max_delay: Duration,
    /// Backoff multiplier (typically 2.0).
    pub multiplier: f64,
    /// Jitter as a fraction of the capped delay (0.0 to 1.0).
    pub jitter_ratio: f64,
    /// Decides retry vs stop for a classified error.
    pub retryable_predicate: RetryPredicate,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("multiplier", &self.multiplier)
            .field("jitter_ratio", &self.jitter_ratio)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::api()
    }
}

impl RetryPolicy {
    /// Policy for external API calls: 3 attempts, 1 s base, 30 s cap.
    #[must_use]
    pub fn api() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_ratio: 0.2,
            retryable_predicate: Arc::new(|e| e.retryable),
        }
    }

    /// Policy for the search provider.
    ///
    /// Retries on `{429, 500, 502, 503, 504}`; statusless failures fall
    /// back to the classifier's retryability.
    #[must_use]
    pub fn search() -> Self {
        Self {
            retryable_predicate: Arc::new(|e| match e.status {
                Some(s) => matches!(s, 429 | 500 | 502 | 503 | 504),
                None => e.retryable,
            }),
            ..Self::api()
        }
    }

    /// Policy for the scraping provider.
    ///
    /// Retries on `{429, 502, 503, 504, 510}`; `{400, 401, 403}` are
    /// permanent regardless of the classifier's view.
    #[must_use]
    pub fn scraper() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(20),
            multiplier: 2.0,
            jitter_ratio: 0.2,
            retryable_predicate: Arc::new(|e| match e.status {
                Some(s) => matches!(s, 429 | 502 | 503 | 504 | 510),
                None => e.retryable,
            }),
        }
    }

    /// Single attempt, no backoff.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter_ratio: 0.0,
            retryable_predicate: Arc::new(|e| e.retryable),
        }
    }

    /// Replace the number of attempts.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Replace the retryability predicate.
    #[must_use]
    pub fn with_predicate(mut self, predicate: RetryPredicate) -> Self {
        self.retryable_predicate = predicate;
        self
    }

    /// Base (jitter-free) delay after 0-indexed attempt `attempt`.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn base_delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let raw_ms = self.base_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped_ms = raw_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms.max(0.0) as u64)
    }

    /// Jittered delay after 0-indexed attempt `attempt`.
    ///
    /// `random` must be in `[0, 1]`; it scales the jitter window so the
    /// result lies in `[base, base * (1 + jitter_ratio)]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn delay_for_attempt(&self, attempt: u32, random: f64) -> Duration {
        let base = self.base_delay_for_attempt(attempt);
        if self.jitter_ratio <= 0.0 {
            return base;
        }
        let random = random.clamp(0.0, 1.0);
        let jitter_ms = base.as_millis() as f64 * self.jitter_ratio * random;
        base + Duration::from_millis(jitter_ms.max(0.0) as u64)
    }
}

/// Outcome of a retried operation, carrying the attempt count.
#[derive(Debug)]
pub enum RetryOutcome<T> {
    /// Operation succeeded on some attempt.
    Success {
        /// The operation's value, unchanged.
        value: T,
        /// Attempts consumed, including the successful one.
        attempts: u32,
    },
    /// Operation failed permanently or ran out of attempts.
    Exhausted {
        /// The last classified error.
        error: ProviderError,
        /// Attempts consumed.
        attempts: u32,
    },
    /// A cancellation signal interrupted the backoff sleep.
    Cancelled {
        /// The last classified error, retryability preserved.
        error: ProviderError,
        /// Attempts consumed before cancellation.
        attempts: u32,
    },
}

impl<T> RetryOutcome<T> {
    /// Attempts consumed by the operation.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Success { attempts, .. }
            | Self::Exhausted { attempts, .. }
            | Self::Cancelled { attempts, .. } => *attempts,
        }
    }

    /// Retries performed beyond the first attempt.
    #[must_use]
    pub const fn retries(&self) -> u32 {
        self.attempts().saturating_sub(1)
    }

    /// Collapse into a `Result`, discarding the attempt count.
    #[allow(clippy::missing_errors_doc)]
    pub fn into_result(self) -> Result<T, ProviderError> {
        match self {
            Self::Success { value, .. } => Ok(value),
            Self::Exhausted { error, .. } | Self::Cancelled { error, .. } => Err(error),
        }
    }
}

/// Execute `operation` under `policy`, classifying failures between attempts.
///
/// The operation receives the 0-indexed attempt number. A non-retryable
/// error (per the policy's predicate) returns immediately; a retryable one
/// sleeps the jittered exponential delay and tries again, unless it was the
/// final attempt. The backoff sleep races `cancel`: cancellation returns the
/// last classified error with its retryability untouched.
///
/// The policy is never mutated; jitter is sampled fresh for every sleep.
pub async fn run_with_retry<T, F, Fut>(
    mut operation: F,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, ProviderError>>,
{
    let max_attempts = policy.max_attempts.max(1);

    let mut attempt = 0;
    loop {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(attempt, "operation recovered after retry");
                }
                return RetryOutcome::Success {
                    value,
                    attempts: attempt + 1,
                };
            },
            Err(error) => {
                let attempts = attempt + 1;
                if !(policy.retryable_predicate)(&error) || attempts >= max_attempts {
                    return RetryOutcome::Exhausted { error, attempts };
                }

                let jitter = rand::thread_rng().gen::<f64>();
                let delay = policy.delay_for_attempt(attempt, jitter);
                debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    kind = %error.kind,
                    "retrying after backoff"
                );

                tokio::select! {
                    () = cancel.cancelled() => {
                        return RetryOutcome::Cancelled { error, attempts };
                    },
                    () = tokio::time::sleep(delay) => {},
                }

                attempt += 1;
            },
        }
    }
}
