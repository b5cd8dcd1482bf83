//! AI 分类/摘要客户端
//!
//! 走 OpenAI 兼容的 chat completions 端点，凭证放 Bearer 头。
//! 每次调用只尝试一次，超时由 HTTP 客户端兜底（默认 30 秒），
//! 超时与传输错误同样返回 `Err`——调用方必须就地降级，不得上抛硬失败。

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use std::time::Duration;
use tracing::{debug, warn};

use crate::ai::types::{
    extract_json_payload, ChatMessage, ChatRequest, ChatResponse, ClassificationOutcome,
    ErrorResponse, GroupSummary,
};
use crate::config::ClassificationConfig;
use crate::message::Message;

/// 默认模型（端点未指定时）
pub const DEFAULT_MODEL: &str = "qwen-turbo";

/// 默认超时（毫秒）
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// 默认采样温度（分类任务要求稳定输出）
const DEFAULT_TEMPERATURE: f64 = 0.2;

/// AI 客户端配置
#[derive(Debug, Clone)]
pub struct AiConfig {
    /// chat completions 端点
    pub endpoint: String,
    /// Bearer 凭证
    pub credential: String,
    /// 模型名称
    pub model: String,
    /// 请求超时（毫秒）
    pub timeout_ms: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            credential: String::new(),
            model: DEFAULT_MODEL.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl AiConfig {
    /// 从分类配置提取 AI 配置，未配置时返回 None
    pub fn from_classification(config: &ClassificationConfig) -> Option<Self> {
        if !config.ai_configured() {
            return None;
        }
        let model = if config.ai_model.is_empty() {
            DEFAULT_MODEL.to_string()
        } else {
            config.ai_model.clone()
        };
        Some(Self {
            endpoint: config.ai_endpoint.clone(),
            credential: config.ai_credential.clone(),
            model,
            timeout_ms: config.ai_timeout_ms,
        })
    }
}

/// AI 客户端
pub struct AiClient {
    client: reqwest::Client,
    config: AiConfig,
}

impl AiClient {
    /// 创建新客户端
    pub fn new(config: AiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| anyhow!("Cannot create HTTP client: {}", e))?;
        Ok(Self { client, config })
    }

    /// 从分类配置创建客户端，未配置 AI 时返回 None
    pub fn from_classification(config: &ClassificationConfig) -> Option<Self> {
        let ai_config = AiConfig::from_classification(config)?;
        match Self::new(ai_config) {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(error = %e, "Failed to create AI client");
                None
            }
        }
    }

    /// 发送 chat completions 请求并取回文本内容
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages,
            temperature: DEFAULT_TEMPERATURE,
        };

        debug!(
            model = %self.config.model,
            endpoint = %self.config.endpoint,
            timeout_ms = self.config.timeout_ms,
            "Sending request to AI service"
        );

        let start = std::time::Instant::now();
        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.credential)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                anyhow!(
                    "AI request failed after {}ms: {}",
                    start.elapsed().as_millis(),
                    e
                )
            })?;

        debug!(elapsed_ms = start.elapsed().as_millis(), "AI request completed");

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| anyhow!("Failed to read AI response: {}", e))?;

        if !status.is_success() {
            if let Ok(error_resp) = serde_json::from_str::<ErrorResponse>(&body) {
                return Err(anyhow!("AI service error ({}): {}", status, error_resp.error.message));
            }
            return Err(anyhow!("AI service error ({}): {}", status, body));
        }

        let response: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| anyhow!("Failed to parse AI response: {} - body: {}", e, body))?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if text.is_empty() {
            warn!("Empty response from AI service");
        }
        Ok(text)
    }

    /// 判定单条消息的重要性
    ///
    /// 规则关键词作为提示一并提供给模型。返回的评分钳制到 [0,1]。
    pub async fn classify(&self, message: &Message, rule_hints: &[String]) -> Result<ClassificationOutcome> {
        let hints = if rule_hints.is_empty() {
            "（无）".to_string()
        } else {
            rule_hints.join("、")
        };

        let system = "你是群聊消息分析助手。判断消息是否值得立即提醒用户。只返回 JSON，不要其他内容。";
        let prompt = format!(
            r#"判断以下群聊消息是否重要（是否需要立即提醒用户）：

群组: {}
发送者: {}
内容: {}

用户关注的关键词：{}

重要的标准：涉及会议、时间变更、任务指派、紧急事项、需要用户答复的内容。
闲聊、问候、表情刷屏不重要。

返回 JSON 格式：
{{"is_important": true|false, "score": 0.0-1.0, "reason": "一句话理由"}}

只返回 JSON，不要其他内容。"#,
            message.group, message.sender, message.content, hints
        );

        let response = self
            .complete(vec![ChatMessage::system(system), ChatMessage::user(prompt)])
            .await?;

        let json = extract_json_payload(&response)
            .ok_or_else(|| anyhow!("No JSON payload in AI response: {}", response))?;
        let mut outcome: ClassificationOutcome = serde_json::from_str(json)
            .map_err(|e| anyhow!("Malformed classification payload: {} - {}", e, json))?;

        outcome.score = outcome.score.clamp(0.0, 1.0);
        Ok(outcome)
    }

    /// 生成按群组的每日摘要
    pub async fn summarize(&self, messages: &[Message], date: NaiveDate) -> Result<Vec<GroupSummary>> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }

        let mut lines = String::new();
        for msg in messages {
            lines.push_str(&format!("[{}] {}: {}\n", msg.group, msg.sender, msg.content));
        }

        let system = "你是群聊消息摘要助手。为每个群组生成一句话摘要。只返回 JSON，不要其他内容。";
        let prompt = format!(
            r#"以下是 {} 的重要群聊消息，按群组各生成一段不超过 50 字的摘要：

{}
返回 JSON 数组：
[{{"group": "群组名", "summary": "摘要"}}]

每个出现过的群组恰好一个条目。只返回 JSON，不要其他内容。"#,
            date, lines
        );

        let response = self
            .complete(vec![ChatMessage::system(system), ChatMessage::user(prompt)])
            .await?;

        let json = extract_json_payload(&response)
            .ok_or_else(|| anyhow!("No JSON payload in AI response: {}", response))?;
        let summaries: Vec<GroupSummary> = serde_json::from_str(json)
            .map_err(|e| anyhow!("Malformed summary payload: {} - {}", e, json))?;
        Ok(summaries)
    }
}
