//! 全局速率限制
//!
//! 保证两次被处理的事件之间至少间隔 `min_interval`（默认 500ms）。
//! 全局而非按 key：突发到达的多条不同消息，超出间隔的会被本轮丢弃。
//! 事件源会重投递状态变化，被丢弃的事件不是数据丢失，只是延迟。
//! 不排队，也不向事件源回传背压信号。

use std::time::{Duration, Instant};

/// 默认最小间隔
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(500);

/// 速率限制器
pub struct RateLimiter {
    min_interval: Duration,
    last_allowed: Option<Instant>,
}

impl RateLimiter {
    /// 创建默认间隔（500ms）的限制器
    pub fn new() -> Self {
        Self::with_interval(DEFAULT_MIN_INTERVAL)
    }

    /// 创建指定间隔的限制器
    pub fn with_interval(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_allowed: None,
        }
    }

    /// 当前时刻是否放行
    pub fn allow(&mut self) -> bool {
        self.allow_at(Instant::now())
    }

    /// 指定时刻是否放行（测试用）
    pub fn allow_at(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_allowed {
            if now.duration_since(last) < self.min_interval {
                return false;
            }
        }
        self.last_allowed = Some(now);
        true
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
