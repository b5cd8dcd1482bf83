//! 通知渠道 trait 定义

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// 待发送的通知
///
/// `key` 是幂等键：重要消息用消息 ID，每日摘要用日期，
/// 分发器据此保证同一 key 只真正发送一次。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationMessage {
    /// 幂等键
    pub key: String,
    /// 标题行
    pub title: String,
    /// 正文
    pub body: String,
}

impl NotificationMessage {
    pub fn new(key: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
            body: body.into(),
        }
    }
}

/// 发送结果
#[derive(Debug, Clone, PartialEq)]
pub enum SendResult {
    /// 发送成功
    Sent,
    /// 跳过（幂等去重或渠道未配置）
    Skipped(String),
    /// 发送失败
    Failed(String),
}

/// 通知渠道 trait
///
/// `send` 允许阻塞，分发器在独立线程上调用它。
pub trait NotificationChannel: Send + Sync {
    /// 渠道名称（用于日志）
    fn name(&self) -> &str;

    /// 发送通知
    fn send(&self, message: &NotificationMessage) -> Result<SendResult>;
}
