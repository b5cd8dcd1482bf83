//! 关键词规则引擎
//!
//! 对消息内容逐条评估启用的规则：字面量按转义后的子串匹配，
//! 正则规则按原样编译，大小写敏感性跟随规则标志。
//! 命中规则的权重累加，白名单发送者加固定分，总分钳制到 [0,1]。
//! 引擎自带固定默认阈值，最终的重要性判定在上层按用户配置的阈值复算。

use crate::config::{ClassificationConfig, FilterMode};
use regex::RegexBuilder;
use tracing::warn;

/// 白名单发送者加分
pub const WHITELIST_BONUS: f64 = 0.3;

/// 引擎默认阈值（上层会以配置阈值复算）
pub const KEYWORD_DEFAULT_THRESHOLD: f64 = 0.5;

/// 关键词评分结果
#[derive(Debug, Clone)]
pub struct KeywordScore {
    /// 钳制后的总分 [0,1]
    pub score: f64,
    /// 命中的关键词
    pub matched_keywords: Vec<String>,
    /// 评分说明
    pub reason: String,
    /// 按引擎默认阈值的初判
    pub is_important: bool,
}

impl KeywordScore {
    fn rejected_by_filter(mode: FilterMode, sender: &str) -> Self {
        let reason = match mode {
            FilterMode::Whitelist => format!("发送者 {} 不在白名单内", sender),
            FilterMode::Blacklist => format!("发送者 {} 在黑名单内", sender),
            FilterMode::None => unreachable!(),
        };
        Self {
            score: 0.0,
            matched_keywords: Vec::new(),
            reason,
            is_important: false,
        }
    }
}

/// 对消息评分
pub fn score(sender: &str, content: &str, config: &ClassificationConfig) -> KeywordScore {
    // 过滤器短路：不通过则不评估任何规则
    if !config.filters.passes(sender) {
        return KeywordScore::rejected_by_filter(config.filters.mode, sender);
    }

    let mut sum = 0.0;
    let mut matched_keywords = Vec::new();
    let mut parts = Vec::new();

    for rule in config.rules.iter().filter(|r| r.enabled) {
        let pattern = if rule.is_regex {
            rule.keyword.clone()
        } else {
            regex::escape(&rule.keyword)
        };

        let compiled = match RegexBuilder::new(&pattern)
            .case_insensitive(!rule.case_sensitive)
            .build()
        {
            Ok(re) => re,
            Err(e) => {
                warn!(rule_id = %rule.id, pattern = %rule.keyword, error = %e, "Skipping rule that fails to compile");
                continue;
            }
        };

        if let Some(m) = compiled.find(content) {
            sum += rule.weight;
            matched_keywords.push(rule.keyword.clone());
            parts.push(format!("{}({})", rule.keyword, m.as_str()));
        }
    }

    if config.filters.is_whitelisted(sender) {
        sum += WHITELIST_BONUS;
        parts.push(format!("白名单发送者 +{}", WHITELIST_BONUS));
    }

    let score = sum.clamp(0.0, 1.0);
    let reason = if parts.is_empty() {
        "未命中任何关键词".to_string()
    } else {
        format!("命中: {}", parts.join(", "))
    };

    KeywordScore {
        score,
        matched_keywords,
        reason,
        is_important: score >= KEYWORD_DEFAULT_THRESHOLD,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KeywordRule, SenderFilter};

    fn config_with_rules(rules: Vec<KeywordRule>) -> ClassificationConfig {
        ClassificationConfig {
            rules,
            ..Default::default()
        }
    }

    #[test]
    fn test_literal_match_scores_weight() {
        // 规则 {keyword:"会议", weight:0.6}，内容 "今晚会议延后" → 命中，分 0.6
        let config = config_with_rules(vec![KeywordRule::literal("r1", "会议", 0.6)]);
        let result = score("张三", "今晚会议延后", &config);

        assert!((result.score - 0.6).abs() < f64::EPSILON);
        assert_eq!(result.matched_keywords, vec!["会议"]);
        assert!(result.is_important);
        assert!(result.reason.contains("会议"));
    }

    #[test]
    fn test_no_match_scores_zero() {
        let config = config_with_rules(vec![KeywordRule::literal("r1", "会议", 0.6)]);
        let result = score("张三", "周末一起吃饭", &config);

        assert_eq!(result.score, 0.0);
        assert!(result.matched_keywords.is_empty());
        assert!(!result.is_important);
    }

    #[test]
    fn test_blacklist_short_circuit() {
        let mut config = config_with_rules(vec![KeywordRule::literal("r1", "会议", 0.6)]);
        config.filters = SenderFilter {
            mode: FilterMode::Blacklist,
            blacklist: ["Bot".to_string()].into_iter().collect(),
            ..Default::default()
        };

        // 内容命中关键词，但发送者在黑名单内 → 短路
        let result = score("Bot", "今晚会议延后", &config);
        assert_eq!(result.score, 0.0);
        assert!(!result.is_important);
        assert!(result.matched_keywords.is_empty());
        assert!(result.reason.contains("黑名单"));
    }

    #[test]
    fn test_weights_sum_and_clamp() {
        let config = config_with_rules(vec![
            KeywordRule::literal("r1", "紧急", 0.7),
            KeywordRule::literal("r2", "会议", 0.6),
        ]);
        let result = score("张三", "紧急会议马上开始", &config);

        // 0.7 + 0.6 = 1.3 → 钳制到 1.0
        assert_eq!(result.score, 1.0);
        assert_eq!(result.matched_keywords.len(), 2);
    }

    #[test]
    fn test_disabled_rule_skipped() {
        let mut rule = KeywordRule::literal("r1", "会议", 0.6);
        rule.enabled = false;
        let config = config_with_rules(vec![rule]);

        let result = score("张三", "今晚会议延后", &config);
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn test_literal_metacharacters_escaped() {
        // 字面量中的正则元字符不应生效
        let config = config_with_rules(vec![KeywordRule::literal("r1", "a.b", 0.6)]);
        assert_eq!(score("s", "acb", &config).score, 0.0);
        assert!((score("s", "xa.by", &config).score - 0.6).abs() < f64::EPSILON);
    }

    #[test]
    fn test_regex_rule() {
        let config = config_with_rules(vec![KeywordRule::regex("r1", r"\d{2}:\d{2}", 0.5)]);
        let result = score("张三", "会议改到 19:30", &config);
        assert!((result.score - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_invalid_regex_skipped_not_fatal() {
        let config = config_with_rules(vec![
            KeywordRule::regex("bad", "([unclosed", 0.9),
            KeywordRule::literal("good", "会议", 0.6),
        ]);
        let result = score("张三", "今晚会议延后", &config);
        // 坏规则被跳过，好规则照常评估
        assert!((result.score - 0.6).abs() < f64::EPSILON);
    }

    #[test]
    fn test_case_sensitivity_flag() {
        let mut sensitive = KeywordRule::literal("r1", "URGENT", 0.6);
        sensitive.case_sensitive = true;
        let config = config_with_rules(vec![sensitive]);
        assert_eq!(score("s", "urgent notice", &config).score, 0.0);

        let insensitive = KeywordRule::literal("r1", "URGENT", 0.6);
        let config = config_with_rules(vec![insensitive]);
        assert!(score("s", "urgent notice", &config).score > 0.0);
    }

    #[test]
    fn test_whitelist_bonus() {
        let mut config = config_with_rules(vec![KeywordRule::literal("r1", "会议", 0.3)]);
        config.filters = SenderFilter {
            mode: FilterMode::Whitelist,
            whitelist: ["老板".to_string()].into_iter().collect(),
            ..Default::default()
        };

        let result = score("老板", "今晚会议延后", &config);
        // 0.3 规则 + 0.3 白名单加分
        assert!((result.score - 0.6).abs() < 1e-9);
        assert!(result.reason.contains("白名单"));
    }
}
