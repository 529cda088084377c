//! 持久化重试策略
//!
//! live 版本指针落盘失败时的有界重试：指数退避加随机抖动。

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 持久化重试策略配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistRetryPolicy {
    /// 最大重试次数
    pub max_retries: u32,
    /// 基础延迟时间（毫秒）
    pub base_delay_ms: u64,
    /// 最大延迟时间（毫秒）
    pub max_delay_ms: u64,
    /// 指数退避因子
    pub backoff_factor: f64,
    /// 随机抖动因子 (0.0-1.0)
    pub jitter_factor: f64,
}

impl Default for PersistRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 5_000,
            backoff_factor: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl PersistRetryPolicy {
    /// 检查是否还应重试（attempt 从 0 开始计数）
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// 计算第 attempt 次失败后的等待时长
    pub fn delay_for(&self, attempt: u32) -> Duration {
        // 基础延迟 = base_delay * (backoff_factor ^ attempt)
        let base_delay = self.base_delay_ms as f64 * self.backoff_factor.powf(attempt as f64);

        // 限制最大延迟
        let capped_delay = base_delay.min(self.max_delay_ms as f64);

        // 添加随机抖动
        let jitter = capped_delay * self.jitter_factor * (rand::random::<f64>() - 0.5);
        let final_delay = (capped_delay + jitter).max(0.0);

        Duration::from_millis(final_delay as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_retry_bounds() {
        let policy = PersistRetryPolicy::default();
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!policy.should_retry(10));
    }

    #[test]
    fn test_delay_grows_with_attempts() {
        let policy = PersistRetryPolicy { jitter_factor: 0.0, ..Default::default() };
        let first = policy.delay_for(0);
        let second = policy.delay_for(1);
        let third = policy.delay_for(2);
        assert_eq!(first, Duration::from_millis(100));
        assert_eq!(second, Duration::from_millis(200));
        assert_eq!(third, Duration::from_millis(400));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = PersistRetryPolicy { jitter_factor: 0.0, ..Default::default() };
        // 远超上限的 attempt 也不会超过 max_delay_ms
        assert_eq!(policy.delay_for(20), Duration::from_millis(5_000));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = PersistRetryPolicy::default();
        for _ in 0..50 {
            let delay = policy.delay_for(1).as_millis() as f64;
            // 200ms ± 10%/2
            assert!((180.0..=220.0).contains(&delay), "delay {} out of range", delay);
        }
    }
}
