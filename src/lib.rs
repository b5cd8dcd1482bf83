//! Group Chat Monitor - 群聊重要消息监控

pub mod ai;
pub mod classify;
pub mod config;
pub mod digest;
pub mod message;
pub mod notify;
pub mod pipeline;
pub mod scheduler;
pub mod store;

pub use ai::{AiClient, AiConfig, ClassificationOutcome, GroupSummary};
pub use classify::keyword::{KeywordScore, KEYWORD_DEFAULT_THRESHOLD, WHITELIST_BONUS};
pub use config::{
    ClassificationConfig, ClassifyMode, ConfigStore, FilterMode, KeywordRule, SenderFilter,
    DEFAULT_IMPORTANCE_THRESHOLD,
};
pub use digest::DailyAggregator;
pub use message::{ClassifyMethod, DailySummary, GroupDigest, Message, RawEvent};
pub use notify::{
    LogChannel, NotificationChannel, NotificationDispatcher, NotificationMessage, NotificationSink,
    SendResult, WebhookChannel,
};
pub use pipeline::{DedupCache, IngestOutcome, IngestionPipeline, RateLimiter};
pub use scheduler::{schedule_daily, ScheduleToken};
pub use store::{JsonlMessageStore, MessageStore};
