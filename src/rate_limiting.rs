//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块实现了上游请求节流，避免对目录 API 造成过大压力。
//!
//! 两种模式：每个实体之间固定休眠，或基于令牌桶的平滑限速。

use crate::config::ThrottleConfig;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// 令牌桶速率限制器
///
/// 使用令牌桶算法实现精确的速率限制，支持突发流量
#[derive(Debug)]
pub struct TokenBucket {
    tokens: AtomicU64,
    last_update: AtomicU64,
    capacity: u64,
    refill_rate: u64, // 每秒补充的令牌数
}

impl TokenBucket {
    /// 创建新的令牌桶
    pub fn new(capacity: u64, refill_rate: u64) -> Self {
        let now = Self::now_millis();
        Self {
            tokens: AtomicU64::new(capacity),
            last_update: AtomicU64::new(now),
            capacity,
            refill_rate,
        }
    }

    #[inline]
    fn now_millis() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    /// 尝试获取一个令牌
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_n(1)
    }

    /// 尝试获取多个令牌
    pub fn try_acquire_n(&self, n: u64) -> bool {
        let now = Self::now_millis();
        let last_update = self.last_update.load(Ordering::Relaxed);

        let elapsed = now.saturating_sub(last_update);
        let refill = (elapsed * self.refill_rate) / 1000;

        let current_tokens = self.tokens.load(Ordering::Relaxed);
        let new_tokens = (current_tokens + refill).min(self.capacity);

        if new_tokens >= n {
            self.tokens.store(new_tokens - n, Ordering::Relaxed);
            self.last_update.store(now, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// 获取当前可用令牌数
    pub fn available_tokens(&self) -> u64 {
        let now = Self::now_millis();
        let current_tokens = self.tokens.load(Ordering::Relaxed);
        let last_update = self.last_update.load(Ordering::Relaxed);
        let elapsed = now.saturating_sub(last_update);
        let refill = (elapsed * self.refill_rate) / 1000;

        (current_tokens + refill).min(self.capacity)
    }

    /// 下一个令牌可用前的建议等待时间
    pub fn wait_hint(&self) -> Duration {
        if self.available_tokens() > 0 || self.refill_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis((1000 / self.refill_rate).max(1))
    }
}

/// 上游请求节流器
#[derive(Debug)]
pub enum Throttle {
    /// 固定休眠
    FixedDelay(Duration),
    /// 令牌桶
    TokenBucket(TokenBucket),
    /// 不节流
    Disabled,
}

impl Throttle {
    pub fn from_config(config: &ThrottleConfig) -> Self {
        match config {
            ThrottleConfig::FixedDelay { delay_ms: 0 } => Throttle::Disabled,
            ThrottleConfig::FixedDelay { delay_ms } => {
                Throttle::FixedDelay(Duration::from_millis(*delay_ms))
            }
            ThrottleConfig::TokenBucket {
                requests_per_second,
                burst_capacity,
            } => Throttle::TokenBucket(TokenBucket::new(*burst_capacity, *requests_per_second)),
        }
    }

    /// 在两个上游请求之间暂停
    ///
    /// 取消时立即返回 `false`。
    pub async fn pause(&self, cancel: &CancellationToken) -> bool {
        match self {
            Throttle::Disabled => !cancel.is_cancelled(),
            Throttle::FixedDelay(delay) => sleep_or_cancel(*delay, cancel).await,
            Throttle::TokenBucket(bucket) => {
                while !bucket.try_acquire() {
                    if !sleep_or_cancel(bucket.wait_hint(), cancel).await {
                        return false;
                    }
                }
                !cancel.is_cancelled()
            }
        }
    }
}

async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
