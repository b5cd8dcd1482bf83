//! AI 服务的请求/响应类型与载荷提取
//!
//! 传输格式是 OpenAI 兼容的 chat completions：role/content 消息列表，
//! 模型以自由文本返回，结构化结果是嵌在文本里的 JSON。
//! `extract_json_payload` 从自由文本中提取第一个括号配平的 JSON 片段，
//! 容忍前后夹杂的说明性文字。

use serde::{Deserialize, Serialize};

/// 聊天消息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// chat completions 请求体
#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
}

/// chat completions 响应体
#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoice {
    pub message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponseMessage {
    pub content: Option<String>,
}

/// API 错误响应
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    pub error: ApiError,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiError {
    pub message: String,
}

/// 单条消息的 AI 分类结果
#[derive(Debug, Clone, Deserialize)]
pub struct ClassificationOutcome {
    /// 是否重要
    pub is_important: bool,
    /// 评分，调用方负责钳制到 [0,1]
    pub score: f64,
    /// 判定理由
    #[serde(default)]
    pub reason: String,
}

/// 单个群组的 AI 摘要
#[derive(Debug, Clone, Deserialize)]
pub struct GroupSummary {
    /// 群组名
    pub group: String,
    /// 摘要文本
    pub summary: String,
}

/// 从自由文本中提取第一个完整的 JSON 载荷（对象或数组）
///
/// 逐字符扫描，跟踪字符串字面量与转义，返回第一个括号配平的片段。
/// 模型在 JSON 前后附带说明文字时仍能取到结构化部分。
pub fn extract_json_payload(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = text.find(|c| c == '{' || c == '[')?;
    let open = bytes[start];
    let close = if open == b'{' { b'}' } else { b']' };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            _ if b == open => depth += 1,
            _ if b == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
