//! 消息持久化 - 本地 JSONL 文件读写
//!
//! `MessageStore` 是流水线对持久层的全部假设；生产实现是按行追加的
//! JSONL 文件，写入时加 fs2 独占锁，更新（标记已通知、按时间清理）
//! 通过临时文件重写后原子替换。坏行在读取时被容忍跳过。

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use tracing::warn;

use crate::message::Message;

/// 持久化存储接口
pub trait MessageStore: Send + Sync {
    /// 追加一条消息
    fn append(&self, message: &Message) -> Result<()>;

    /// 将指定消息标记为已通知（false → true，重复调用无副作用）
    fn mark_notified(&self, id: &str) -> Result<()>;

    /// 查询时间窗口内的重要消息，`[from, to)`
    fn query_important(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Message>>;

    /// 删除早于指定时间的消息
    fn delete_older_than(&self, ts: DateTime<Utc>) -> Result<()>;

    /// 清空全部消息
    fn delete_all(&self) -> Result<()>;

    /// 消息总数
    fn count(&self) -> Result<usize>;

    /// 重要消息数
    fn count_important(&self) -> Result<usize>;
}

/// JSONL 文件存储
///
/// 单写进程假设：fs2 锁加在数据文件的当前 inode 上，而重写通过临时文件
/// 原子替换路径。另一个进程若在替换瞬间对旧 inode 加锁追加，这一行会
/// 随旧 inode 丢失。所有写入必须来自同一进程（本进程内各操作互斥正确）。
pub struct JsonlMessageStore {
    path: PathBuf,
}

impl JsonlMessageStore {
    /// 默认存储文件路径
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("group-chat-monitor")
            .join("messages.jsonl")
    }

    /// 使用默认路径创建
    pub fn open_default() -> Self {
        Self::open(Self::default_path())
    }

    /// 使用指定路径创建
    pub fn open(path: PathBuf) -> Self {
        Self { path }
    }

    /// 读取全部记录，坏行跳过
    fn read_all(&self) -> Vec<Message> {
        if !self.path.exists() {
            return Vec::new();
        }
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Cannot open message store");
                return Vec::new();
            }
        };
        BufReader::new(file)
            .lines()
            .filter_map(|line| line.ok())
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(&line) {
                Ok(msg) => Some(msg),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed store line");
                    None
                }
            })
            .collect()
    }

    /// 用给定记录集重写整个文件（临时文件 + 原子替换）
    fn rewrite(&self, messages: &[Message]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp_path = self.path.with_extension("tmp");
        {
            let mut temp = File::create(&temp_path)
                .with_context(|| format!("Cannot create {}", temp_path.display()))?;
            for msg in messages {
                writeln!(temp, "{}", serde_json::to_string(msg)?)?;
            }
        }
        fs::rename(&temp_path, &self.path)
            .with_context(|| format!("Cannot replace {}", self.path.display()))?;
        Ok(())
    }

    /// 打开并独占锁定存储文件（用于重写类操作的互斥）
    fn lock_file(&self) -> Result<Option<File>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let file = File::open(&self.path)?;
        file.lock_exclusive()?;
        Ok(Some(file))
    }
}

impl MessageStore for JsonlMessageStore {
    fn append(&self, message: &Message) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Cannot open {}", self.path.display()))?;
        file.lock_exclusive()?;
        let mut file = file;
        let result = writeln!(file, "{}", serde_json::to_string(message)?);
        file.unlock()?;
        result.map_err(Into::into)
    }

    fn mark_notified(&self, id: &str) -> Result<()> {
        let lock = self.lock_file()?;
        let mut messages = self.read_all();
        let mut changed = false;
        for msg in &mut messages {
            if msg.id == id && !msg.notified {
                msg.notified = true;
                changed = true;
            }
        }
        let result = if changed { self.rewrite(&messages) } else { Ok(()) };
        if let Some(file) = lock {
            file.unlock()?;
        }
        result
    }

    fn query_important(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Message>> {
        let mut messages: Vec<Message> = self
            .read_all()
            .into_iter()
            .filter(|m| m.is_important && m.received_at >= from && m.received_at < to)
            .collect();
        messages.sort_by_key(|m| m.received_at);
        Ok(messages)
    }

    fn delete_older_than(&self, ts: DateTime<Utc>) -> Result<()> {
        let lock = self.lock_file()?;
        let kept: Vec<Message> = self
            .read_all()
            .into_iter()
            .filter(|m| m.received_at >= ts)
            .collect();
        let result = self.rewrite(&kept);
        if let Some(file) = lock {
            file.unlock()?;
        }
        result
    }

    fn delete_all(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("Cannot remove {}", self.path.display()))?;
        }
        Ok(())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.read_all().len())
    }

    fn count_important(&self) -> Result<usize> {
        Ok(self.read_all().iter().filter(|m| m.is_important).count())
    }
}
