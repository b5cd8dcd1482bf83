//! 消息数据模型
//!
//! 定义流水线产出的核心记录类型：原始事件、结构化消息和每日摘要。
//! `Message` 在分类完成后除 `notified` 外所有字段不可变；
//! `notified` 只允许 false → true 一次，由存储层的 `mark_notified` 完成。

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// 原始事件（短暂存在，不持久化）
#[derive(Debug, Clone)]
pub struct RawEvent {
    /// 原始文本，形如 "<sender>: <content>"
    pub text: String,
    /// 事件源解析好的群组名
    pub group_hint: String,
    /// 接收时间
    pub received_at: DateTime<Utc>,
}

impl RawEvent {
    pub fn new(text: impl Into<String>, group_hint: impl Into<String>, received_at: DateTime<Utc>) -> Self {
        Self {
            text: text.into(),
            group_hint: group_hint.into(),
            received_at,
        }
    }
}

/// 分类方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifyMethod {
    /// 尚未分类
    None,
    /// 关键词规则
    Keyword,
    /// AI 分类
    Ai,
    /// 关键词 + AI 组合
    Both,
}

impl Default for ClassifyMethod {
    fn default() -> Self {
        Self::None
    }
}

/// 结构化消息记录（JSONL 持久化格式）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// 消息 ID（由指纹派生，同一事件重投递 ID 相同）
    pub id: String,
    /// 群组名
    pub group: String,
    /// 发送者
    pub sender: String,
    /// 消息内容
    pub content: String,
    /// 接收时间
    pub received_at: DateTime<Utc>,
    /// 是否重要
    pub is_important: bool,
    /// 重要度评分 [0,1]
    pub importance_score: f64,
    /// 分类方式
    #[serde(default)]
    pub method: ClassifyMethod,
    /// 命中的关键词
    #[serde(default)]
    pub matched_keywords: Vec<String>,
    /// 分类理由
    #[serde(default)]
    pub reason: String,
    /// 是否已通知（false → true，不可逆）
    #[serde(default)]
    pub notified: bool,
}

impl Message {
    /// 创建未分类的消息，ID 由群组/发送者/内容/秒级时间戳派生
    pub fn unclassified(
        group: impl Into<String>,
        sender: impl Into<String>,
        content: impl Into<String>,
        received_at: DateTime<Utc>,
    ) -> Self {
        let group = group.into();
        let sender = sender.into();
        let content = content.into();
        let id = derive_id(&group, &sender, &content, received_at);
        Self {
            id,
            group,
            sender,
            content,
            received_at,
            is_important: false,
            importance_score: 0.0,
            method: ClassifyMethod::None,
            matched_keywords: Vec::new(),
            reason: String::new(),
            notified: false,
        }
    }
}

/// 从消息身份字段派生稳定 ID
///
/// 时间戳截断到整秒，亚秒抖动的重投递会得到相同 ID。
pub fn derive_id(group: &str, sender: &str, content: &str, received_at: DateTime<Utc>) -> String {
    let mut hasher = DefaultHasher::new();
    group.hash(&mut hasher);
    sender.hash(&mut hasher);
    content.hash(&mut hasher);
    received_at.timestamp().hash(&mut hasher);
    format!("msg-{:016x}", hasher.finish())
}

/// 单个群组的摘要条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupDigest {
    /// 群组名
    pub group: String,
    /// 该群组的重要消息数
    pub count: usize,
    /// 摘要文本（AI 或启发式）
    pub summary: String,
}

/// 每日摘要
///
/// 不变量：`total_important == per_group 各 count 之和`。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailySummary {
    /// 摘要对应的日期
    pub date: NaiveDate,
    /// 当日重要消息总数
    pub total_important: usize,
    /// 按群组的摘要条目
    pub per_group: Vec<GroupDigest>,
}

impl DailySummary {
    /// 创建空摘要（当日无重要消息）
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            total_important: 0,
            per_group: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_derive_id_ignores_subsecond_jitter() {
        let t1 = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 5).unwrap();
        let t2 = t1 + chrono::Duration::milliseconds(700);

        let a = derive_id("工作群", "张三", "今晚会议延后", t1);
        let b = derive_id("工作群", "张三", "今晚会议延后", t2);
        assert_eq!(a, b);

        // 跨整秒边界应该得到不同 ID
        let t3 = t1 + chrono::Duration::seconds(1);
        let c = derive_id("工作群", "张三", "今晚会议延后", t3);
        assert_ne!(a, c);
    }

    #[test]
    fn test_derive_id_distinguishes_fields() {
        let t = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 5).unwrap();
        let base = derive_id("g", "s", "c", t);
        assert_ne!(base, derive_id("g2", "s", "c", t));
        assert_ne!(base, derive_id("g", "s2", "c", t));
        assert_ne!(base, derive_id("g", "s", "c2", t));
    }

    #[test]
    fn test_message_serialization_roundtrip() {
        let msg = Message::unclassified("工作群", "张三", "今晚会议延后", Utc::now());
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: Message = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.id, msg.id);
        assert_eq!(parsed.group, "工作群");
        assert!(!parsed.is_important);
        assert_eq!(parsed.method, ClassifyMethod::None);
        assert!(!parsed.notified);
    }

    #[test]
    fn test_message_backward_compat() {
        // 旧格式（无 method/matched_keywords/reason/notified）应能正常反序列化
        let old_json = r#"{"id":"msg-1","group":"g","sender":"s","content":"c","received_at":"2026-03-01T08:00:05Z","is_important":true,"importance_score":0.6}"#;
        let msg: Message = serde_json::from_str(old_json).unwrap();
        assert_eq!(msg.method, ClassifyMethod::None);
        assert!(msg.matched_keywords.is_empty());
        assert!(!msg.notified);
    }
}
