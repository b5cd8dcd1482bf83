//! 原始事件解析
//!
//! 事件源交来的原始文本形如 `"<sender>: <content>"`。
//! 按第一个冒号拆分（兼容全角冒号 `：`，监控对象是中文聊天软件），
//! 两侧去空白；冒号缺失、冒号在行首或内容为空都视为解析失败。
//! 原始文本不含时间戳，`received_at` 取事件的接收时间。

use crate::message::Message;
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};

/// 解析原始文本为未分类消息
pub fn parse(raw_text: &str, group_hint: &str, received_at: DateTime<Utc>) -> Result<Message> {
    // 取 ASCII 冒号和全角冒号中先出现的那个
    let ascii = raw_text.find(':');
    let full = raw_text.find('：');
    let (pos, len) = match (ascii, full) {
        (Some(a), Some(f)) if a < f => (a, 1),
        (Some(a), None) => (a, 1),
        (Some(_), Some(f)) | (None, Some(f)) => (f, '：'.len_utf8()),
        (None, None) => bail!("No colon in raw event: {:?}", raw_text),
    };

    let sender = raw_text[..pos].trim();
    let content = raw_text[pos + len..].trim();

    if sender.is_empty() {
        bail!("Empty sender in raw event: {:?}", raw_text);
    }
    if content.is_empty() {
        bail!("Empty content in raw event: {:?}", raw_text);
    }

    Ok(Message::unclassified(group_hint, sender, content, received_at))
}
