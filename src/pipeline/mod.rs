//! 摄取流水线
//!
//! 每条事件的处理路径：解析 → 去重 → 限流 → 分类 → 持久化 →（重要则）通知。
//! `submit` 可从任意线程调用，立即返回；剩余工作作为独立的 tokio 任务
//! 执行，慢的远程分类调用不会阻塞新事件的投递。
//!
//! 去重缓存和速率限制器是多个并发任务共享的可变状态，收在同一把
//! 互斥锁之下；锁内没有 await 点。单条事件的失败只影响它自己。

pub mod fingerprint;
pub mod parser;
pub mod rate_limit;

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

use crate::ai::AiClient;
use crate::classify;
use crate::config::{ClassifyMode, ConfigStore};
use crate::message::{Message, RawEvent};
use crate::notify::NotificationSink;
use crate::store::MessageStore;

pub use fingerprint::{fingerprint, DedupCache};
pub use rate_limit::RateLimiter;

/// 单条事件的处理结局
#[derive(Debug)]
pub enum IngestOutcome {
    /// 走完全程（消息已持久化，重要消息已通知）
    Done(Message),
    /// 解析失败
    DroppedParse(String),
    /// 重复事件
    DroppedDuplicate,
    /// 被限流
    DroppedRateLimited,
}

/// 去重 + 限流的共享状态，单锁保护
struct IngestState {
    dedup: DedupCache,
    rate: RateLimiter,
}

/// 摄取流水线
pub struct IngestionPipeline {
    state: Mutex<IngestState>,
    config: Arc<ConfigStore>,
    store: Arc<dyn MessageStore>,
    sink: Arc<dyn NotificationSink>,
}

impl IngestionPipeline {
    pub fn new(
        config: Arc<ConfigStore>,
        store: Arc<dyn MessageStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            state: Mutex::new(IngestState {
                dedup: DedupCache::new(),
                rate: RateLimiter::new(),
            }),
            config,
            store,
            sink,
        }
    }

    /// 自定义去重容量与限流间隔（测试用）
    pub fn with_limits(mut self, dedup_capacity: usize, min_interval: Duration) -> Self {
        self.state = Mutex::new(IngestState {
            dedup: DedupCache::with_capacity(dedup_capacity),
            rate: RateLimiter::with_interval(min_interval),
        });
        self
    }

    /// 提交一条原始事件，立即返回
    ///
    /// 可从任意线程调用（需处于 tokio 运行时内）。事件的剩余处理
    /// 在独立任务中完成，失败只记日志。
    pub fn submit(self: &Arc<Self>, raw_text: &str, group_hint: &str, received_at: DateTime<Utc>) {
        let pipeline = Arc::clone(self);
        let event = RawEvent::new(raw_text, group_hint, received_at);
        tokio::spawn(async move {
            let outcome = pipeline.process(event).await;
            debug!(outcome = ?outcome_label(&outcome), "Ingest unit finished");
        });
    }

    /// 处理一条事件直到终态
    pub async fn process(&self, event: RawEvent) -> IngestOutcome {
        // Received → Parsed
        let message = match parser::parse(&event.text, &event.group_hint, event.received_at) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(error = %e, "Dropping unparseable event");
                return IngestOutcome::DroppedParse(e.to_string());
            }
        };

        // Parsed → DedupChecked → RateChecked，共享状态在一把锁内
        let key = fingerprint(&message.group, &message.sender, &message.content, message.received_at);
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if state.dedup.seen(&key) {
                debug!(key = %key, "Dropping duplicate event");
                return IngestOutcome::DroppedDuplicate;
            }
            state.dedup.remember(key);
            if !state.rate.allow() {
                debug!("Dropping rate-limited event");
                return IngestOutcome::DroppedRateLimited;
            }
        }

        // 分类：配置每条消息读一次快照
        let config = self.config.get();
        let ai = if config.mode == ClassifyMode::KeywordOnly {
            None
        } else {
            AiClient::from_classification(&config)
        };
        let mut message = classify::classify(message, &config, ai.as_ref()).await;

        // 无条件持久化；写失败记日志丢弃，绝不中断流水线
        if let Err(e) = self.store.append(&message) {
            warn!(id = %message.id, error = %e, "Failed to persist message");
        }

        // 重要且未通知 → 先通知，再标记
        if message.is_important && !message.notified {
            match self.sink.notify_important(&message) {
                Ok(()) => {
                    message.notified = true;
                    if let Err(e) = self.store.mark_notified(&message.id) {
                        warn!(id = %message.id, error = %e, "Failed to mark message notified");
                    }
                }
                Err(e) => {
                    warn!(id = %message.id, error = %e, "Notification failed");
                }
            }
        }

        IngestOutcome::Done(message)
    }
}

fn outcome_label(outcome: &IngestOutcome) -> &'static str {
    match outcome {
        IngestOutcome::Done(_) => "done",
        IngestOutcome::DroppedParse(_) => "dropped_parse",
        IngestOutcome::DroppedDuplicate => "dropped_duplicate",
        IngestOutcome::DroppedRateLimited => "dropped_rate_limited",
    }
}
