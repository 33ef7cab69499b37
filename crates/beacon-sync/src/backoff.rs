//! Retry cadence for failed push channel start attempts.

use std::time::Duration;

use beacon_core::defaults;

/// Delay policy between manager-level start retries.
///
/// Neither variant has an attempt limit; retries continue for the whole
/// session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Same delay before every retry.
    Fixed { delay_ms: u64 },
    /// `initial_ms * factor^attempt`, capped at `max_ms`.
    Exponential {
        initial_ms: u64,
        max_ms: u64,
        factor: u32,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::Fixed {
            delay_ms: defaults::START_RETRY_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    /// Fixed delay between attempts.
    pub fn fixed(delay: Duration) -> Self {
        Self::Fixed {
            delay_ms: delay.as_millis() as u64,
        }
    }

    /// Doubling delay from `initial` up to `max`.
    pub fn exponential(initial: Duration, max: Duration) -> Self {
        Self::Exponential {
            initial_ms: initial.as_millis() as u64,
            max_ms: max.as_millis() as u64,
            factor: 2,
        }
    }

    /// Delay before retry number `attempt` (0 = first retry after the failed start).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match *self {
            Self::Fixed { delay_ms } => Duration::from_millis(delay_ms),
            Self::Exponential {
                initial_ms,
                max_ms,
                factor,
            } => {
                let scaled = (factor as u64)
                    .checked_pow(attempt)
                    .and_then(|m| initial_ms.checked_mul(m))
                    .unwrap_or(max_ms);
                Duration::from_millis(scaled.min(max_ms))
            }
        }
    }
}
