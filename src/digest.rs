//! 每日摘要聚合
//!
//! 查询指定日期（本地时区的自然日）的全部重要消息，按群组聚合后
//! 生成摘要：优先调用 AI 生成一句话总结，AI 不可用或失败时退回
//! 启发式摘要（发言人数 + 前几条消息片段）。摘要通过通知接口下发，
//! 当日没有重要消息则不发送。
//!
//! 聚合不并发：同一时刻只允许一次聚合在跑，后来者直接放弃。

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::ai::AiClient;
use crate::config::ConfigStore;
use crate::message::{DailySummary, GroupDigest, Message};
use crate::notify::NotificationSink;
use crate::store::MessageStore;

/// 启发式摘要最多引用的消息条数
const HEURISTIC_SAMPLE: usize = 3;

/// 启发式摘要中每条消息的片段长度（字符数）
const HEURISTIC_SNIPPET_CHARS: usize = 20;

/// 每日摘要聚合器
pub struct DailyAggregator {
    config: Arc<ConfigStore>,
    store: Arc<dyn MessageStore>,
    sink: Arc<dyn NotificationSink>,
    /// 单飞锁：同一时刻只允许一次聚合
    running: tokio::sync::Mutex<()>,
}

impl DailyAggregator {
    pub fn new(
        config: Arc<ConfigStore>,
        store: Arc<dyn MessageStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            config,
            store,
            sink,
            running: tokio::sync::Mutex::new(()),
        }
    }

    /// 为指定日期跑一次聚合并下发摘要
    ///
    /// 已有聚合在跑时返回 `None`；聚合失败降级为当日的空摘要。
    /// 空摘要（当日无重要消息）会返回但不下发通知。
    pub async fn run_for(&self, date: NaiveDate) -> Option<DailySummary> {
        let _guard = match self.running.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                warn!(date = %date, "Digest already running, skipping");
                return None;
            }
        };

        let summary = match self.build(date).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(date = %date, error = %e, "Digest aggregation failed, emitting empty summary");
                DailySummary::empty(date)
            }
        };

        if summary.total_important == 0 {
            info!(date = %date, "No important messages today, skipping digest notification");
            return Some(summary);
        }

        if let Err(e) = self.sink.notify_daily_summary(&summary) {
            warn!(date = %date, error = %e, "Failed to deliver digest");
        }
        Some(summary)
    }

    /// 构建摘要（不下发）
    async fn build(&self, date: NaiveDate) -> Result<DailySummary> {
        let (from, to) = local_day_window(date)?;
        let messages = self.store.query_important(from, to)?;
        debug!(date = %date, count = messages.len(), "Aggregating important messages");

        if messages.is_empty() {
            return Ok(DailySummary::empty(date));
        }

        // 按群组聚合，BTreeMap 保证摘要条目顺序稳定
        let mut by_group: BTreeMap<String, Vec<&Message>> = BTreeMap::new();
        for msg in &messages {
            by_group.entry(msg.group.clone()).or_default().push(msg);
        }

        let ai_summaries = self.try_ai_summaries(&messages, date).await;

        let per_group = by_group
            .iter()
            .map(|(group, group_messages)| {
                let summary = ai_summaries
                    .as_ref()
                    .and_then(|m| m.get(group.as_str()).cloned())
                    .unwrap_or_else(|| heuristic_summary(group_messages));
                GroupDigest {
                    group: group.clone(),
                    count: group_messages.len(),
                    summary,
                }
            })
            .collect();

        Ok(DailySummary {
            date,
            total_important: messages.len(),
            per_group,
        })
    }

    /// 调用 AI 生成各群组摘要，失败时返回 `None`（退回启发式）
    async fn try_ai_summaries(
        &self,
        messages: &[Message],
        date: NaiveDate,
    ) -> Option<HashMap<String, String>> {
        let config = self.config.get();
        let client = AiClient::from_classification(&config)?;
        match client.summarize(messages, date).await {
            Ok(summaries) => Some(
                summaries
                    .into_iter()
                    .map(|s| (s.group, s.summary))
                    .collect(),
            ),
            Err(e) => {
                warn!(error = %e, "AI summary failed, falling back to heuristic");
                None
            }
        }
    }
}

/// 本地时区自然日对应的 UTC 时间窗口 `[from, to)`
fn local_day_window(date: NaiveDate) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let start = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow!("Invalid date: {}", date))?;
    let next = date
        .succ_opt()
        .ok_or_else(|| anyhow!("Date overflow: {}", date))?
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow!("Invalid date: {}", date))?;

    let from = Local
        .from_local_datetime(&start)
        .earliest()
        .ok_or_else(|| anyhow!("Ambiguous local midnight: {}", start))?;
    let to = Local
        .from_local_datetime(&next)
        .earliest()
        .ok_or_else(|| anyhow!("Ambiguous local midnight: {}", next))?;
    Ok((from.with_timezone(&Utc), to.with_timezone(&Utc)))
}

/// 启发式摘要：发言人数 + 前几条消息片段
fn heuristic_summary(messages: &[&Message]) -> String {
    let senders: HashSet<&str> = messages.iter().map(|m| m.sender.as_str()).collect();
    let samples: Vec<String> = messages
        .iter()
        .take(HEURISTIC_SAMPLE)
        .map(|m| {
            let snippet: String = m.content.chars().take(HEURISTIC_SNIPPET_CHARS).collect();
            format!("{}: {}", m.sender, snippet)
        })
        .collect();
    format!("{} 位发言人。{}", senders.len(), samples.join("；"))
}
