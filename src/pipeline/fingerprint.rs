//! 事件指纹与去重缓存
//!
//! 指纹由群组、发送者、内容和截断到整秒的接收时间拼接而成，
//! 事件源亚秒级抖动的重投递会得到相同指纹。
//! 缓存不持久化，进程重启后清空——重启后偶发重复通知是接受的代价。

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::debug;

/// 去重缓存默认容量
pub const DEFAULT_DEDUP_CAPACITY: usize = 1000;

/// 计算事件指纹
pub fn fingerprint(group: &str, sender: &str, content: &str, received_at: DateTime<Utc>) -> String {
    format!("{}|{}|{}|{}", group, sender, content, received_at.timestamp())
}

/// 有界去重缓存
///
/// 超出容量时整体清空后再记录新指纹——O(1) 的粗糙淘汰，
/// 偏向保留近期而牺牲精度，是接受的近似而非待修的缺陷。
pub struct DedupCache {
    seen: HashSet<String>,
    capacity: usize,
}

impl DedupCache {
    /// 创建默认容量（1000）的缓存
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_DEDUP_CAPACITY)
    }

    /// 创建指定容量的缓存
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            seen: HashSet::new(),
            capacity: capacity.max(1),
        }
    }

    /// 指纹是否已见过
    pub fn seen(&self, key: &str) -> bool {
        self.seen.contains(key)
    }

    /// 记录指纹，必要时先整体清空
    pub fn remember(&mut self, key: impl Into<String>) {
        if self.seen.len() >= self.capacity {
            debug!(capacity = self.capacity, "Dedup cache full, clearing");
            self.seen.clear();
        }
        self.seen.insert(key.into());
    }

    /// 当前记录数
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new()
    }
}
