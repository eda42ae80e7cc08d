//! Reconnect delay policy.

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_DELAY_MS: u64 = 3_000;
pub const DEFAULT_CAP_DELAY_MS: u64 = 48_000;

/// Capped exponential backoff: `min(base * 2^(n-1), cap)` for the nth retry.
///
/// With the defaults the sequence is 3s, 6s, 12s, 24s, 48s, 48s, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    pub base_delay_ms: u64,
    pub cap_delay_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            cap_delay_ms: DEFAULT_CAP_DELAY_MS,
        }
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base_delay_ms: saturating_ms(base),
            cap_delay_ms: saturating_ms(cap),
        }
    }

    /// Delay before retry number `attempt` (1-indexed; 0 is treated as 1).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        let ms = self.base_delay_ms.saturating_mul(factor).min(self.cap_delay_ms);
        Duration::from_millis(ms)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn cap_delay(&self) -> Duration {
        Duration::from_millis(self.cap_delay_ms)
    }
}

fn saturating_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
