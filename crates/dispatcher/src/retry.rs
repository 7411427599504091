//! 源失败重试策略

use std::time::Duration;

use contracts::{BackoffKind, RetrySettings};

/// Backoff between consecutive source failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Retry immediately
    None,
    /// Same delay after every failure
    Fixed(Duration),
    /// `initial * 2^(attempt-1)`, capped at `max`
    Exponential { initial: Duration, max: Duration },
}

/// 重试策略
///
/// 连续失败次数超过 `max_consecutive_failures` 时，生产循环结束。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_consecutive_failures: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl RetryPolicy {
    /// 第 `attempt` 次连续失败 (从 1 开始) 后的等待时间
    pub fn delay(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { initial, max } => {
                let shift = attempt.saturating_sub(1).min(31);
                initial
                    .checked_mul(1u32 << shift)
                    .map_or(max, |d| d.min(max))
            }
        }
    }

    /// 连续失败次数是否已超出预算
    pub fn exhausted(&self, consecutive_failures: u32) -> bool {
        consecutive_failures > self.max_consecutive_failures
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        let initial = Duration::from_millis(settings.backoff_ms);
        let backoff = match settings.backoff {
            BackoffKind::None => Backoff::None,
            BackoffKind::Fixed => Backoff::Fixed(initial),
            BackoffKind::Exponential => Backoff::Exponential {
                initial,
                max: Duration::from_millis(settings.max_backoff_ms.max(settings.backoff_ms)),
            },
        };
        Self {
            max_consecutive_failures: settings.max_consecutive_failures,
            backoff,
        }
    }
}
