use std::time::Duration;
use crate::core::error::DownloadError;

/// 重试策略
#[derive(Debug, Clone)]
pub struct RetryStrategy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64, // 抖动因子，避免重试风暴
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryStrategy {
    /// 不重试，传输错误直接失败
    pub fn disabled() -> Self {
        Self { max_retries: 0, ..Self::default() }
    }

    pub fn should_retry(&self, error: &DownloadError, retry_count: usize) -> bool {
        retry_count < self.max_retries && error.is_retryable()
    }

    pub fn get_delay(&self, retry_count: usize) -> Duration {
        let delay_secs = self.base_delay.as_secs_f64() *
            self.backoff_multiplier.powi(retry_count as i32);

        let jitter = delay_secs * self.jitter_factor * (rand::random::<f64>() - 0.5);
        let final_delay = (delay_secs + jitter).max(0.0);

        Duration::from_secs_f64(final_delay).min(self.max_delay)
    }
}

/// 重试上下文
#[derive(Debug)]
pub struct RetryContext {
    pub strategy: RetryStrategy,
    pub retry_count: usize,
    pub last_error: Option<DownloadError>,
}

impl RetryContext {
    pub fn new(strategy: RetryStrategy) -> Self {
        Self {
            strategy,
            retry_count: 0,
            last_error: None,
        }
    }

    pub fn should_retry(&self, error: &DownloadError) -> bool {
        self.strategy.should_retry(error, self.retry_count)
    }

    pub fn increment_retry(&mut self, error: DownloadError) {
        self.retry_count += 1;
        self.last_error = Some(error);
    }

    pub fn get_delay(&self) -> Duration {
        self.strategy.get_delay(self.retry_count.saturating_sub(1))
    }

    /// 有新数据到达后重置计数
    pub fn reset(&mut self) {
        self.retry_count = 0;
        self.last_error = None;
    }
}
