//! Group Chat Monitor CLI
//!
//! 监控群聊消息流：解析、去重、限流、重要性分类、持久化、通知，
//! 以及每日定时摘要。

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use group_chat_monitor::{
    ConfigStore, DailyAggregator, IngestionPipeline, JsonlMessageStore, LogChannel, MessageStore,
    NotificationDispatcher, NotificationSink, WebhookChannel,
};

#[derive(Parser)]
#[command(name = "gcm")]
#[command(about = "Group Chat Monitor - 群聊重要消息监控")]
#[command(version)]
struct Cli {
    /// 配置文件路径（默认 ~/.config/group-chat-monitor/config.json）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 消息存储路径（默认 ~/.config/group-chat-monitor/messages.jsonl）
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 从标准输入读取事件并持续监控（每行格式：<群组>\t<发送者>: <内容>）
    Run,
    /// 手动生成指定日期的每日摘要
    Digest {
        /// 日期，YYYY-MM-DD 格式（默认今天）
        #[arg(long)]
        date: Option<String>,
    },
    /// 显示存储统计
    Stats {
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 显示当前配置
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let config_store = Arc::new(match &cli.config {
        Some(path) => ConfigStore::load_from(path.clone()),
        None => ConfigStore::load_default(),
    });
    let message_store: Arc<dyn MessageStore> = Arc::new(match &cli.store {
        Some(path) => JsonlMessageStore::open(path.clone()),
        None => JsonlMessageStore::open_default(),
    });

    match cli.command {
        Commands::Run => run(config_store, message_store).await,
        Commands::Digest { date } => digest(config_store, message_store, date).await,
        Commands::Stats { json } => stats(message_store, json),
        Commands::Config => show_config(config_store),
    }
}

/// 按当前配置组装通知分发器
fn build_dispatcher(config_store: &ConfigStore, synchronous: bool) -> NotificationDispatcher {
    let config = config_store.get();
    let mut dispatcher = NotificationDispatcher::new().with_synchronous(synchronous);
    dispatcher.register_channel(Arc::new(LogChannel));
    if !config.webhook_url.is_empty() {
        dispatcher.register_channel(Arc::new(WebhookChannel::new(config.webhook_url.clone())));
    }
    dispatcher
}

async fn run(config_store: Arc<ConfigStore>, message_store: Arc<dyn MessageStore>) -> Result<()> {
    let sink: Arc<dyn NotificationSink> = Arc::new(build_dispatcher(&config_store, false));
    let pipeline = Arc::new(IngestionPipeline::new(
        config_store.clone(),
        message_store.clone(),
        sink.clone(),
    ));

    let aggregator = Arc::new(DailyAggregator::new(
        config_store.clone(),
        message_store,
        sink,
    ));
    // 调度失败只禁用定时摘要，摄取和手动触发不受影响
    let digest_time = config_store.get().digest_time;
    let _schedule = match group_chat_monitor::schedule_daily(&digest_time, move || {
        let aggregator = aggregator.clone();
        async move {
            aggregator.run_for(Local::now().date_naive()).await;
        }
    }) {
        Ok(token) => Some(token),
        Err(e) => {
            warn!(time = %digest_time, error = %e, "Daily digest disabled, use the digest command to trigger manually");
            None
        }
    };

    info!("Monitoring started, reading events from stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match line.split_once('\t') {
            Some((group, text)) => pipeline.submit(text, group, Utc::now()),
            None => warn!(line = %line, "Skipping event without group field"),
        }
    }

    info!("Event stream closed, shutting down");
    Ok(())
}

async fn digest(
    config_store: Arc<ConfigStore>,
    message_store: Arc<dyn MessageStore>,
    date: Option<String>,
) -> Result<()> {
    let date = match date {
        Some(s) => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
            .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", s))?,
        None => Local::now().date_naive(),
    };

    // 一次性命令：同步发送，进程退出前完成投递
    let sink: Arc<dyn NotificationSink> = Arc::new(build_dispatcher(&config_store, true));
    let aggregator = DailyAggregator::new(config_store, message_store, sink);

    match aggregator.run_for(date).await {
        Some(summary) => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        None => anyhow::bail!("Digest generation failed for {}", date),
    }
}

fn stats(message_store: Arc<dyn MessageStore>, json: bool) -> Result<()> {
    let total = message_store.count()?;
    let important = message_store.count_important()?;
    if json {
        println!(
            "{}",
            serde_json::json!({ "total": total, "important": important })
        );
    } else {
        println!("消息总数: {}", total);
        println!("重要消息: {}", important);
    }
    Ok(())
}

fn show_config(config_store: Arc<ConfigStore>) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&config_store.get())?);
    Ok(())
}
