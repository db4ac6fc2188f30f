//! Retry strategies keyed by failure kind.

use std::time::Duration;

use crate::recovery::classifier::ErrorKind;

/// Backoff policy applied between attempts of one operation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryStrategy {
    /// Fail immediately; the error is not worth repeating
    NoRetry,
    /// Delay grows linearly with the attempt number
    Linear {
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
    },
    /// Delay doubles per attempt, with up to 50% random jitter on top
    Exponential {
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
    },
    /// Steeper 3^n growth with a larger budget, for rate limits
    RateLimit {
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
    },
}

impl RetryStrategy {
    /// Strategy used for a given failure kind
    pub fn for_kind(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Network => RetryStrategy::Exponential {
                max_attempts: 3,
                base_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(10),
            },
            ErrorKind::Timeout => RetryStrategy::Exponential {
                max_attempts: 3,
                base_delay: Duration::from_secs(2),
                max_delay: Duration::from_secs(15),
            },
            ErrorKind::RateLimit => RetryStrategy::RateLimit {
                max_attempts: 5,
                base_delay: Duration::from_secs(5),
                max_delay: Duration::from_secs(120),
            },
            ErrorKind::FileNotFound
            | ErrorKind::Permission
            | ErrorKind::Syntax
            | ErrorKind::Validation => RetryStrategy::NoRetry,
            ErrorKind::Unknown => RetryStrategy::Linear {
                max_attempts: 2,
                base_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(10),
            },
        }
    }

    pub fn max_attempts(&self) -> u32 {
        match self {
            RetryStrategy::NoRetry => 1,
            RetryStrategy::Linear { max_attempts, .. }
            | RetryStrategy::Exponential { max_attempts, .. }
            | RetryStrategy::RateLimit { max_attempts, .. } => *max_attempts,
        }
    }

    /// Whether another attempt is allowed after `attempt` (1-indexed) failed
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts()
    }

    /// Delay before the attempt following `attempt`
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            RetryStrategy::NoRetry => Duration::ZERO,
            RetryStrategy::Linear {
                base_delay,
                max_delay,
                ..
            } => {
                let delay = base_delay.as_secs_f64() * f64::from(attempt);
                Duration::from_secs_f64(delay.min(max_delay.as_secs_f64()))
            }
            RetryStrategy::Exponential {
                base_delay,
                max_delay,
                ..
            } => {
                let grown = base_delay.as_secs_f64() * 2f64.powi(attempt as i32 - 1);
                let capped = grown.min(max_delay.as_secs_f64());
                let jitter = capped * 0.5 * rand::random::<f64>();
                Duration::from_secs_f64(capped + jitter)
            }
            RetryStrategy::RateLimit {
                base_delay,
                max_delay,
                ..
            } => {
                let grown = base_delay.as_secs_f64() * 3f64.powi(attempt as i32 - 1);
                Duration::from_secs_f64(grown.min(max_delay.as_secs_f64()))
            }
        }
    }

    /// Sleep for the backoff delay after a failed `attempt`
    pub async fn wait(&self, attempt: u32) {
        let delay = self.delay(attempt);
        if !delay.is_zero() {
            tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "Backing off before retry");
            tokio::time::sleep(delay).await;
        }
    }
}
