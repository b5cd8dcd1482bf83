//! 分类配置与配置存储
//!
//! 配置文件路径：`~/.config/group-chat-monitor/config.json`（JSON 格式）。
//! 流水线每处理一条消息读取一次配置快照，配置变更只影响后续消息。
//! `ConfigStore` 通过 `tokio::sync::watch` 广播变更通知。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;
use tokio::sync::watch;
use tracing::{debug, warn};

/// 默认重要度阈值
pub const DEFAULT_IMPORTANCE_THRESHOLD: f64 = 0.5;

/// 默认 AI 请求超时（毫秒）
pub const DEFAULT_AI_TIMEOUT_MS: u64 = 30_000;

/// 关键词规则
///
/// 评分过程中规则视为不可变；编译失败的规则会被跳过（记日志，不致命）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordRule {
    /// 规则 ID
    pub id: String,
    /// 关键词或正则表达式
    pub keyword: String,
    /// 权重 [0,1]
    pub weight: f64,
    /// 是否按正则解释
    #[serde(default)]
    pub is_regex: bool,
    /// 是否区分大小写
    #[serde(default)]
    pub case_sensitive: bool,
    /// 是否启用
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl KeywordRule {
    /// 创建字面量关键词规则
    pub fn literal(id: impl Into<String>, keyword: impl Into<String>, weight: f64) -> Self {
        Self {
            id: id.into(),
            keyword: keyword.into(),
            weight,
            is_regex: false,
            case_sensitive: false,
            enabled: true,
        }
    }

    /// 创建正则规则
    pub fn regex(id: impl Into<String>, pattern: impl Into<String>, weight: f64) -> Self {
        Self {
            id: id.into(),
            keyword: pattern.into(),
            weight,
            is_regex: true,
            case_sensitive: false,
            enabled: true,
        }
    }
}

/// 发送者过滤模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    /// 不过滤
    None,
    /// 只处理白名单内的发送者
    Whitelist,
    /// 拒绝黑名单内的发送者
    Blacklist,
}

impl Default for FilterMode {
    fn default() -> Self {
        Self::None
    }
}

/// 发送者过滤器
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SenderFilter {
    /// 过滤模式
    #[serde(default)]
    pub mode: FilterMode,
    /// 白名单
    #[serde(default)]
    pub whitelist: HashSet<String>,
    /// 黑名单
    #[serde(default)]
    pub blacklist: HashSet<String>,
}

impl SenderFilter {
    /// 发送者是否通过过滤
    pub fn passes(&self, sender: &str) -> bool {
        match self.mode {
            FilterMode::None => true,
            FilterMode::Whitelist => self.whitelist.contains(sender),
            FilterMode::Blacklist => !self.blacklist.contains(sender),
        }
    }

    /// 发送者是否在白名单内（用于加分）
    pub fn is_whitelisted(&self, sender: &str) -> bool {
        self.mode == FilterMode::Whitelist && self.whitelist.contains(sender)
    }
}

/// 分类模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifyMode {
    /// 仅关键词规则
    KeywordOnly,
    /// 仅 AI（失败时退回关键词）
    AiOnly,
    /// 两者取较高分
    Both,
}

impl Default for ClassifyMode {
    fn default() -> Self {
        Self::KeywordOnly
    }
}

/// 分类配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationConfig {
    /// 分类模式
    #[serde(default)]
    pub mode: ClassifyMode,
    /// 重要度阈值 [0,1]
    #[serde(default = "default_threshold")]
    pub importance_threshold: f64,
    /// 关键词规则
    #[serde(default)]
    pub rules: Vec<KeywordRule>,
    /// 发送者过滤器
    #[serde(default)]
    pub filters: SenderFilter,
    /// AI 服务地址（chat completions 端点），空表示未配置
    #[serde(default)]
    pub ai_endpoint: String,
    /// AI 服务凭证
    #[serde(default)]
    pub ai_credential: String,
    /// AI 模型名称
    #[serde(default)]
    pub ai_model: String,
    /// AI 请求超时（毫秒）
    #[serde(default = "default_ai_timeout")]
    pub ai_timeout_ms: u64,
    /// 每日摘要触发时间，"HH:MM" 格式
    #[serde(default = "default_digest_time")]
    pub digest_time: String,
    /// Webhook 通知网关地址，空表示未配置
    #[serde(default)]
    pub webhook_url: String,
}

fn default_threshold() -> f64 {
    DEFAULT_IMPORTANCE_THRESHOLD
}

fn default_ai_timeout() -> u64 {
    DEFAULT_AI_TIMEOUT_MS
}

fn default_digest_time() -> String {
    "21:00".to_string()
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            mode: ClassifyMode::KeywordOnly,
            importance_threshold: DEFAULT_IMPORTANCE_THRESHOLD,
            rules: Vec::new(),
            filters: SenderFilter::default(),
            ai_endpoint: String::new(),
            ai_credential: String::new(),
            ai_model: String::new(),
            ai_timeout_ms: DEFAULT_AI_TIMEOUT_MS,
            digest_time: default_digest_time(),
            webhook_url: String::new(),
        }
    }
}

impl ClassificationConfig {
    /// 是否配置了可用的 AI 服务
    pub fn ai_configured(&self) -> bool {
        !self.ai_endpoint.is_empty() && !self.ai_credential.is_empty()
    }
}

/// 配置存储
///
/// 文件为权威来源；内存中保存一份当前值，`set` 时写回文件并广播变更。
pub struct ConfigStore {
    path: Option<PathBuf>,
    current: RwLock<ClassificationConfig>,
    tx: watch::Sender<ClassificationConfig>,
}

impl ConfigStore {
    /// 默认配置文件路径
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("group-chat-monitor")
            .join("config.json")
    }

    /// 从默认路径加载，文件不存在时使用默认配置
    pub fn load_default() -> Self {
        Self::load_from(Self::default_path())
    }

    /// 从指定路径加载
    pub fn load_from(path: PathBuf) -> Self {
        let config = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<ClassificationConfig>(&content) {
                Ok(c) => {
                    debug!(path = %path.display(), "Loaded classification config");
                    c
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Invalid config file, using defaults");
                    ClassificationConfig::default()
                }
            },
            Err(_) => ClassificationConfig::default(),
        };
        let (tx, _) = watch::channel(config.clone());
        Self {
            path: Some(path),
            current: RwLock::new(config),
            tx,
        }
    }

    /// 仅驻留内存的配置存储（测试用）
    pub fn in_memory(config: ClassificationConfig) -> Self {
        let (tx, _) = watch::channel(config.clone());
        Self {
            path: None,
            current: RwLock::new(config),
            tx,
        }
    }

    /// 读取当前配置快照
    pub fn get(&self) -> ClassificationConfig {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// 更新配置：写回文件并广播变更
    pub fn set(&self, config: ClassificationConfig) -> Result<()> {
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Cannot create config dir {}", parent.display()))?;
            }
            let json = serde_json::to_string_pretty(&config)?;
            fs::write(path, json)
                .with_context(|| format!("Cannot write config {}", path.display()))?;
        }
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = config.clone();
        let _ = self.tx.send(config);
        Ok(())
    }

    /// 订阅配置变更
    pub fn subscribe(&self) -> watch::Receiver<ClassificationConfig> {
        self.tx.subscribe()
    }
}
