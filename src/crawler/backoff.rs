//! Inter-retry delay policies

use crate::config::{BackoffKind, CrawlerConfig};
use std::time::Duration;

/// Upper bound of the random stretch applied to exponential delays
const JITTER_FACTOR: f64 = 0.1;

/// How long the fetcher waits between attempts on the same item
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffPolicy {
    /// Retry immediately
    None,

    /// Wait the same delay before every retry
    Fixed(Duration),

    /// Double the delay after each failure, capped at `max`
    Exponential {
        base: Duration,
        max: Duration,
        jitter: bool,
    },
}

impl BackoffPolicy {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        let base = Duration::from_millis(config.retry_delay_ms);
        if base.is_zero() {
            return Self::None;
        }

        match config.backoff {
            BackoffKind::Fixed => Self::Fixed(base),
            BackoffKind::Exponential => Self::Exponential {
                base,
                max: Duration::from_millis(config.max_retry_delay_ms),
                jitter: true,
            },
        }
    }

    /// Delay before the retry that follows failed attempt number `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Fixed(delay) => *delay,
            Self::Exponential { base, max, jitter } => {
                let exponent = attempt.saturating_sub(1).min(31);
                let delay = base
                    .checked_mul(2u32.saturating_pow(exponent))
                    .map_or(*max, |delay| delay.min(*max));
                // `max` comes from a millisecond count, far below the overflow point of the stretch
                let delay = if *jitter {
                    delay.mul_f64(1.0 + fastrand::f64() * JITTER_FACTOR)
                } else {
                    delay
                };
                delay.min(*max)
            }
        }
    }
}
