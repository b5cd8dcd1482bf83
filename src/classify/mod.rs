//! 重要性分类器
//!
//! 按配置的分类模式组合关键词引擎与 AI 客户端：
//! - `keyword_only`：直接用关键词评分；
//! - `ai_only`：用 AI 评分，失败时退回关键词（消息永远不会停留在未分类）；
//! - `both`：两者都算，取较高分；平分（关键词 >= AI）时理由归属关键词结果。
//!
//! 降级是显式的回退组合（先试 AI，Err 则用关键词结果），
//! `method` 记录实际使用的方式：AI 不可用时即便配置了 ai_only/both 也记为 keyword。

pub mod keyword;

use crate::ai::AiClient;
use crate::config::{ClassificationConfig, ClassifyMode};
use crate::message::{ClassifyMethod, Message};
use tracing::{debug, warn};

pub use keyword::{KeywordScore, KEYWORD_DEFAULT_THRESHOLD, WHITELIST_BONUS};

/// 对消息做重要性分类，填充分类字段后返回
///
/// 最终 `is_important = 发送者通过过滤 && score >= config.importance_threshold`。
pub async fn classify(
    mut message: Message,
    config: &ClassificationConfig,
    ai: Option<&AiClient>,
) -> Message {
    let kw = keyword::score(&message.sender, &message.content, config);

    // 过滤器拒绝的消息无论什么模式都不重要，也不值得花一次 AI 调用
    if !config.filters.passes(&message.sender) {
        message.importance_score = 0.0;
        message.is_important = false;
        message.method = ClassifyMethod::Keyword;
        message.reason = kw.reason;
        message.matched_keywords = kw.matched_keywords;
        return message;
    }

    let (score, reason, matched_keywords, method) = match config.mode {
        ClassifyMode::KeywordOnly => {
            (kw.score, kw.reason, kw.matched_keywords, ClassifyMethod::Keyword)
        }
        ClassifyMode::AiOnly => match try_ai(ai, &message, &kw).await {
            Some(outcome) => (
                outcome.score,
                outcome.reason,
                kw.matched_keywords,
                ClassifyMethod::Ai,
            ),
            None => (kw.score, kw.reason, kw.matched_keywords, ClassifyMethod::Keyword),
        },
        ClassifyMode::Both => match try_ai(ai, &message, &kw).await {
            Some(outcome) => {
                let (score, reason) = combine(&kw, outcome);
                (score, reason, kw.matched_keywords, ClassifyMethod::Both)
            }
            None => (kw.score, kw.reason, kw.matched_keywords, ClassifyMethod::Keyword),
        },
    };

    message.importance_score = score;
    message.is_important = score >= config.importance_threshold;
    message.method = method;
    message.reason = reason;
    message.matched_keywords = matched_keywords;

    debug!(
        id = %message.id,
        score = message.importance_score,
        important = message.is_important,
        method = ?message.method,
        "Message classified"
    );
    message
}

/// `both` 模式的组合：取较高分，平分（关键词 >= AI）时理由归属关键词结果
fn combine(kw: &KeywordScore, ai: crate::ai::ClassificationOutcome) -> (f64, String) {
    if kw.score >= ai.score {
        (kw.score, kw.reason.clone())
    } else {
        (ai.score, ai.reason)
    }
}

/// 尝试 AI 分类，失败（未配置/超时/传输错误/响应畸形）返回 None
async fn try_ai(
    ai: Option<&AiClient>,
    message: &Message,
    kw: &KeywordScore,
) -> Option<crate::ai::ClassificationOutcome> {
    let client = ai?;
    match client.classify(message, &kw.matched_keywords).await {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            warn!(id = %message.id, error = %e, "AI classification failed, degrading to keyword result");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FilterMode, KeywordRule, SenderFilter};
    use chrono::Utc;

    fn message(sender: &str, content: &str) -> Message {
        Message::unclassified("工作群", sender, content, Utc::now())
    }

    fn keyword_config() -> ClassificationConfig {
        ClassificationConfig {
            rules: vec![KeywordRule::literal("r1", "会议", 0.6)],
            importance_threshold: 0.5,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_keyword_only_mode() {
        let config = keyword_config();
        let result = classify(message("张三", "今晚会议延后"), &config, None).await;

        assert!(result.is_important);
        assert!((result.importance_score - 0.6).abs() < f64::EPSILON);
        assert_eq!(result.method, ClassifyMethod::Keyword);
        assert_eq!(result.matched_keywords, vec!["会议"]);
    }

    #[tokio::test]
    async fn test_ai_only_without_client_degrades_to_keyword() {
        // AI 不可用时 ai_only 的结果应等于关键词回退，method = keyword
        let mut config = keyword_config();
        config.mode = ClassifyMode::AiOnly;

        let result = classify(message("张三", "今晚会议延后"), &config, None).await;
        assert!(result.is_important);
        assert!((result.importance_score - 0.6).abs() < f64::EPSILON);
        assert_eq!(result.method, ClassifyMethod::Keyword);
    }

    #[tokio::test]
    async fn test_ai_error_degrades_to_keyword() {
        // 指向不可达端点的客户端：调用失败，走降级路径
        let mut config = keyword_config();
        config.mode = ClassifyMode::AiOnly;
        config.ai_endpoint = "http://127.0.0.1:1/v1/chat/completions".to_string();
        config.ai_credential = "sk-test".to_string();
        config.ai_timeout_ms = 200;

        let ai = AiClient::from_classification(&config);
        let result = classify(message("张三", "今晚会议延后"), &config, ai.as_ref()).await;

        assert_eq!(result.method, ClassifyMethod::Keyword);
        assert!((result.importance_score - 0.6).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_both_mode_without_ai_degrades() {
        let mut config = keyword_config();
        config.mode = ClassifyMode::Both;

        let result = classify(message("张三", "今晚会议延后"), &config, None).await;
        assert_eq!(result.method, ClassifyMethod::Keyword);
        assert!((result.importance_score - 0.6).abs() < f64::EPSILON);
    }

    fn kw_result(score: f64, reason: &str) -> KeywordScore {
        KeywordScore {
            score,
            matched_keywords: vec!["会议".to_string()],
            reason: reason.to_string(),
            is_important: score >= 0.5,
        }
    }

    fn ai_result(score: f64, reason: &str) -> crate::ai::ClassificationOutcome {
        crate::ai::ClassificationOutcome {
            is_important: score >= 0.5,
            score,
            reason: reason.to_string(),
        }
    }

    #[test]
    fn test_combine_ai_higher_wins() {
        let (score, reason) = combine(&kw_result(0.3, "命中: 会议"), ai_result(0.9, "时间变更需要提醒"));
        assert!((score - 0.9).abs() < f64::EPSILON);
        assert_eq!(reason, "时间变更需要提醒");
    }

    #[test]
    fn test_combine_keyword_higher_wins() {
        let (score, reason) = combine(&kw_result(0.8, "命中: 会议"), ai_result(0.4, "日常闲聊"));
        assert!((score - 0.8).abs() < f64::EPSILON);
        assert_eq!(reason, "命中: 会议");
    }

    #[test]
    fn test_combine_tie_attributes_keyword_reason() {
        let (score, reason) = combine(&kw_result(0.6, "命中: 会议"), ai_result(0.6, "提到会议"));
        assert!((score - 0.6).abs() < f64::EPSILON);
        assert_eq!(reason, "命中: 会议");
    }

    #[tokio::test]
    async fn test_threshold_from_config_decides() {
        let mut config = keyword_config();
        config.importance_threshold = 0.7;

        let result = classify(message("张三", "今晚会议延后"), &config, None).await;
        // 0.6 < 0.7：关键词引擎初判重要，但配置阈值说了算
        assert!(!result.is_important);
    }

    #[tokio::test]
    async fn test_filter_rejection_skips_ai() {
        let mut config = keyword_config();
        config.mode = ClassifyMode::AiOnly;
        config.filters = SenderFilter {
            mode: FilterMode::Blacklist,
            blacklist: ["Bot".to_string()].into_iter().collect(),
            ..Default::default()
        };

        let result = classify(message("Bot", "今晚会议延后"), &config, None).await;
        assert!(!result.is_important);
        assert_eq!(result.importance_score, 0.0);
        assert!(result.reason.contains("黑名单"));
    }
}
