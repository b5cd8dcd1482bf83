//! 内置通知渠道
//!
//! - `LogChannel`：把通知写进结构化日志，永远可用，用作兜底；
//! - `WebhookChannel`：POST 到配置的网关地址。发送跑在分发器的
//!   独立线程上，这里用 blocking 客户端并按次创建，避免跨运行时问题。

use anyhow::{anyhow, Result};
use std::time::Duration;
use tracing::info;

use super::channel::{NotificationChannel, NotificationMessage, SendResult};

/// Webhook 请求超时
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// 日志渠道
pub struct LogChannel;

impl NotificationChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    fn send(&self, message: &NotificationMessage) -> Result<SendResult> {
        info!(key = %message.key, title = %message.title, body = %message.body, "Notification");
        Ok(SendResult::Sent)
    }
}

/// Webhook 渠道
pub struct WebhookChannel {
    url: String,
}

impl WebhookChannel {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    fn send(&self, message: &NotificationMessage) -> Result<SendResult> {
        if self.url.is_empty() {
            return Ok(SendResult::Skipped("webhook not configured".to_string()));
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .map_err(|e| anyhow!("Cannot create webhook client: {}", e))?;

        let payload = serde_json::json!({
            "key": message.key,
            "title": message.title,
            "text": message.body,
        });

        let response = client
            .post(&self.url)
            .json(&payload)
            .send()
            .map_err(|e| anyhow!("Webhook request failed: {}", e))?;

        if response.status().is_success() {
            Ok(SendResult::Sent)
        } else {
            Ok(SendResult::Failed(format!("HTTP {}", response.status())))
        }
    }
}
