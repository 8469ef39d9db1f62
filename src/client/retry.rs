//! Backoff policy for transient failures

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry schedule for transient failures.
///
/// The delay before retry `n` (0-indexed) is
/// `initial_delay + growth * (2^n - 1)`, which with the defaults gives
/// 10s, 12s, 16s and 24s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    #[serde(rename = "initial_delay_ms", with = "millis")]
    pub initial_delay: Duration,
    /// Unit the delay grows by, doubling each retry
    #[serde(rename = "growth_ms", with = "millis")]
    pub growth: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            initial_delay: Duration::from_secs(10),
            growth: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Never retry
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::ZERO,
            growth: Duration::ZERO,
        }
    }

    /// Delay to wait before retry number `attempt` (0-indexed)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt).saturating_sub(1);
        self.initial_delay
            .saturating_add(self.growth.saturating_mul(factor))
    }

    /// The full schedule of delays
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_retries).map(|attempt| self.delay_for(attempt))
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
