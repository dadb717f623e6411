use log::{error, warn};
use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// 每次失败后等待相同时间
    Fixed(Duration),
    /// base * 2^(n-1)，不超过 max
    Exponential { base: Duration, max: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
    /// 在退避时间上叠加 0~50% 的随机抖动
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed(delay),
            jitter: false,
        }
    }

    pub fn exponential(max_attempts: u32, base: Duration, max: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential { base, max },
            jitter: false,
        }
    }

    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    /// 第 `attempt` 次（从 1 开始）失败后的等待时间，不含抖动
    pub fn base_delay(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base, max } => {
                let exp = attempt.saturating_sub(1).min(16);
                base.saturating_mul(1u32 << exp).min(max)
            }
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.base_delay(attempt);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let spread = (delay.as_millis() as u64) / 2;
        let extra = rand::thread_rng().gen_range(0..=spread);
        delay + Duration::from_millis(extra)
    }
}

/// 按策略重试 `op`，`should_retry` 返回 false 时立即放弃。
///
/// 每次失败记 warn，只有次数耗尽才记 error；返回最后一次的错误。
pub async fn retry<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= max_attempts => {
                error!("[Retry] {} failed after {} attempts: {}", label, attempt, e);
                return Err(e);
            }
            Err(e) if !should_retry(&e) => {
                warn!("[Retry] {} attempt {} not retryable: {}", label, attempt, e);
                return Err(e);
            }
            Err(e) => {
                warn!(
                    "[Retry] {} attempt {}/{} failed: {}",
                    label, attempt, max_attempts, e
                );
                tokio::time::sleep(policy.delay_for(attempt)).await;
                attempt += 1;
            }
        }
    }
}
