//! 通知分发器 - 管理多个渠道并保证幂等
//!
//! 幂等约定：同一消息 ID 或同一日期的摘要，不论上游调用多少次，
//! 每个进程生命周期内只真正分发一次。流水线里"发通知"和"标记已通知"
//! 无法做成一个事务，重复调用由这里吸收。
//!
//! 实际发送在独立线程上进行，单个渠道失败只记日志，不影响其他渠道。

use anyhow::Result;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use super::channel::{NotificationChannel, NotificationMessage, SendResult};
use crate::message::{DailySummary, Message};

/// 通知接口
///
/// `notify_important` 与 `notify_daily_summary` 对同一消息 ID / 日期
/// 的重复调用必须是无副作用的。
pub trait NotificationSink: Send + Sync {
    /// 通知一条重要消息
    fn notify_important(&self, message: &Message) -> Result<()>;

    /// 通知每日摘要
    fn notify_daily_summary(&self, summary: &DailySummary) -> Result<()>;
}

/// 通知分发器
pub struct NotificationDispatcher {
    channels: Vec<Arc<dyn NotificationChannel>>,
    delivered: Mutex<HashSet<String>>,
    /// 测试用：true 时在调用线程上同步发送
    synchronous: bool,
}

impl NotificationDispatcher {
    /// 创建空分发器
    pub fn new() -> Self {
        Self {
            channels: Vec::new(),
            delivered: Mutex::new(HashSet::new()),
            synchronous: false,
        }
    }

    /// 同步模式（测试用，发送不另起线程）
    pub fn with_synchronous(mut self, synchronous: bool) -> Self {
        self.synchronous = synchronous;
        self
    }

    /// 注册渠道
    pub fn register_channel(&mut self, channel: Arc<dyn NotificationChannel>) {
        info!(channel = channel.name(), "Registering notification channel");
        self.channels.push(channel);
    }

    /// 已注册的渠道数量
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// 分发通知；同一幂等键只分发一次
    pub fn dispatch(&self, message: NotificationMessage) -> SendResult {
        {
            let mut delivered = self.delivered.lock().unwrap_or_else(|e| e.into_inner());
            if !delivered.insert(message.key.clone()) {
                return SendResult::Skipped(format!("already delivered: {}", message.key));
            }
        }

        let channels = self.channels.clone();
        let send_all = move || {
            for channel in &channels {
                match channel.send(&message) {
                    Ok(SendResult::Sent) => {}
                    Ok(SendResult::Skipped(reason)) => {
                        info!(channel = channel.name(), reason = %reason, "Channel skipped notification");
                    }
                    Ok(SendResult::Failed(reason)) => {
                        warn!(channel = channel.name(), reason = %reason, "Channel send failed");
                    }
                    Err(e) => {
                        warn!(channel = channel.name(), error = %e, "Channel send error");
                    }
                }
            }
        };

        if self.synchronous {
            send_all();
        } else {
            std::thread::spawn(send_all);
        }
        SendResult::Sent
    }
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationSink for NotificationDispatcher {
    fn notify_important(&self, message: &Message) -> Result<()> {
        let notification = NotificationMessage::new(
            format!("msg:{}", message.id),
            format!("📢 [{}] 重要消息", message.group),
            format!(
                "{}: {}\n评分 {:.2} · {}",
                message.sender, message.content, message.importance_score, message.reason
            ),
        );
        self.dispatch(notification);
        Ok(())
    }

    fn notify_daily_summary(&self, summary: &DailySummary) -> Result<()> {
        let mut body = format!("共 {} 条重要消息\n", summary.total_important);
        for entry in &summary.per_group {
            body.push_str(&format!("• {}（{} 条）：{}\n", entry.group, entry.count, entry.summary));
        }
        let notification = NotificationMessage::new(
            format!("digest:{}", summary.date),
            format!("📋 {} 每日摘要", summary.date),
            body,
        );
        self.dispatch(notification);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::GroupDigest;
    use chrono::{NaiveDate, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 测试用的 mock 渠道
    struct MockChannel {
        send_count: AtomicUsize,
    }

    impl MockChannel {
        fn new() -> Self {
            Self {
                send_count: AtomicUsize::new(0),
            }
        }
    }

    impl NotificationChannel for MockChannel {
        fn name(&self) -> &str {
            "mock"
        }

        fn send(&self, _message: &NotificationMessage) -> Result<SendResult> {
            self.send_count.fetch_add(1, Ordering::SeqCst);
            Ok(SendResult::Sent)
        }
    }

    fn dispatcher_with_mock() -> (NotificationDispatcher, Arc<MockChannel>) {
        let channel = Arc::new(MockChannel::new());
        let mut dispatcher = NotificationDispatcher::new().with_synchronous(true);
        dispatcher.register_channel(channel.clone());
        (dispatcher, channel)
    }

    #[test]
    fn test_same_message_notified_once() {
        let (dispatcher, channel) = dispatcher_with_mock();
        let mut msg = Message::unclassified("工作群", "张三", "今晚会议延后", Utc::now());
        msg.is_important = true;
        msg.importance_score = 0.6;

        dispatcher.notify_important(&msg).unwrap();
        dispatcher.notify_important(&msg).unwrap();
        dispatcher.notify_important(&msg).unwrap();

        assert_eq!(channel.send_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_distinct_messages_each_notified() {
        let (dispatcher, channel) = dispatcher_with_mock();
        let t = Utc::now();
        let a = Message::unclassified("g", "s", "内容甲", t);
        let b = Message::unclassified("g", "s", "内容乙", t);

        dispatcher.notify_important(&a).unwrap();
        dispatcher.notify_important(&b).unwrap();

        assert_eq!(channel.send_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_same_date_digest_once() {
        let (dispatcher, channel) = dispatcher_with_mock();
        let summary = DailySummary {
            date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            total_important: 2,
            per_group: vec![GroupDigest {
                group: "工作群".to_string(),
                count: 2,
                summary: "讨论了发布".to_string(),
            }],
        };

        dispatcher.notify_daily_summary(&summary).unwrap();
        dispatcher.notify_daily_summary(&summary).unwrap();

        assert_eq!(channel.send_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failing_channel_does_not_block_others() {
        struct FailingChannel;
        impl NotificationChannel for FailingChannel {
            fn name(&self) -> &str {
                "failing"
            }
            fn send(&self, _message: &NotificationMessage) -> Result<SendResult> {
                anyhow::bail!("boom")
            }
        }

        let good = Arc::new(MockChannel::new());
        let mut dispatcher = NotificationDispatcher::new().with_synchronous(true);
        dispatcher.register_channel(Arc::new(FailingChannel));
        dispatcher.register_channel(good.clone());

        let msg = Message::unclassified("g", "s", "c", Utc::now());
        dispatcher.notify_important(&msg).unwrap();

        assert_eq!(good.send_count.load(Ordering::SeqCst), 1);
    }
}
