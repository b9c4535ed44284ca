//! 재연결 지연 정책.
//!
//! 선형 증가(`base × attempt`) 후 상한에서 고정. 시도 횟수는 첫 실패 이후로 센다.

use loadpulse_core::config::TransportConfig;
use std::time::Duration;

/// 재연결 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_delay,
            max_attempts,
        }
    }

    pub fn from_config(config: &TransportConfig) -> Self {
        Self::new(
            config.reconnect_base_delay(),
            config.reconnect_max_delay(),
            config.max_reconnect_attempts,
        )
    }

    /// `attempt`번째 재시도 전 대기 시간 (1부터). 한도를 넘으면 `None`.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let delay = self.base_delay.saturating_mul(attempt);
        Some(delay.min(self.max_delay))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&TransportConfig::default())
    }
}
