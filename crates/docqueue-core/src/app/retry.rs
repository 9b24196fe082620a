//! Retry policy: decides backoff delays between index creation attempts.

use std::time::Duration;

/// Exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay after the first failed attempt.
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,
}

impl RetryPolicy {
    /// Calculate delay after `attempts` failed attempts (1-indexed).
    ///
    /// delay = base_delay * multiplier^(attempts - 1)
    ///
    /// Example with base_delay=10ms, multiplier=2.0:
    /// - attempt 1: 10ms
    /// - attempt 2: 20ms
    /// - attempt 3: 40ms
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let base_secs = self.base_delay.as_secs_f64();
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_secs = base_secs * self.multiplier.powi(exponent);
        // 負・NaN は待たない。大きすぎる値だけ飽和させる
        if delay_secs.is_nan() || delay_secs <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(delay_secs).unwrap_or(Duration::MAX)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(10),
            multiplier: 2.0,
        }
    }
}
