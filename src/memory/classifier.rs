//! Keyword classifier that buckets user messages into memory tiers.

use serde::{Deserialize, Serialize};

use crate::utils::text::contains_any;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    Identity,
    Qualification,
    Preference,
    Project,
    Technical,
    Commercial,
    Evaluation,
    Timeline,
    Document,
    General,
}

impl MemoryCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryCategory::Identity => "identity",
            MemoryCategory::Qualification => "qualification",
            MemoryCategory::Preference => "preference",
            MemoryCategory::Project => "project",
            MemoryCategory::Technical => "technical",
            MemoryCategory::Commercial => "commercial",
            MemoryCategory::Evaluation => "evaluation",
            MemoryCategory::Timeline => "timeline",
            MemoryCategory::Document => "document",
            MemoryCategory::General => "general",
        }
    }

    /// Storage tier a category is persisted into.
    pub fn tier(&self) -> MemoryTier {
        match self {
            MemoryCategory::Identity | MemoryCategory::Qualification | MemoryCategory::Preference => {
                MemoryTier::Global
            }
            MemoryCategory::Project
            | MemoryCategory::Technical
            | MemoryCategory::Commercial
            | MemoryCategory::Evaluation
            | MemoryCategory::Timeline => MemoryTier::CrossSession,
            MemoryCategory::Document | MemoryCategory::General => MemoryTier::Session,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryTier {
    /// The single user profile.
    Global,
    /// Only the current session transcript.
    Session,
    /// Notes keyed by document identity, shared by every session on it.
    CrossSession,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub category: MemoryCategory,
    pub tier: MemoryTier,
}

const CATEGORY_KEYWORDS: &[(MemoryCategory, &[&str])] = &[
    (
        MemoryCategory::Identity,
        &["我是", "我叫", "我的名字", "我们公司", "我司", "本公司", "my name", "i am ", "i'm ", "our company"],
    ),
    (
        MemoryCategory::Qualification,
        &["资质", "资格", "证书", "认证", "许可证", "营业执照", "iso", "certificate", "license", "qualification"],
    ),
    (
        MemoryCategory::Preference,
        &["喜欢", "偏好", "习惯", "以后都", "总是", "不要用", "风格", "字体", "格式要求", "prefer", "always", "never use", "style"],
    ),
    (
        MemoryCategory::Project,
        &["项目", "工程", "标段", "招标", "投标", "project", "tender", "bid"],
    ),
    (
        MemoryCategory::Technical,
        &["技术", "方案", "参数", "规格", "架构", "指标", "technical", "specification", "architecture"],
    ),
    (
        MemoryCategory::Commercial,
        &["报价", "价格", "付款", "合同金额", "商务", "费用", "预算", "price", "quote", "payment", "budget"],
    ),
    (
        MemoryCategory::Evaluation,
        &["评分", "评标", "打分", "评审", "评价", "score", "evaluation"],
    ),
    (
        MemoryCategory::Timeline,
        &["截止", "工期", "时间节点", "进度", "日期", "交付", "deadline", "schedule", "milestone"],
    ),
    (
        MemoryCategory::Document,
        &["本文", "这份文档", "文档", "章节", "目录", "document", "section", "chapter"],
    ),
];

/// Classify a message by keyword hits. The category with the most hits wins,
/// ties go to the earlier category; no hits means [`MemoryCategory::General`].
pub fn classify(message: &str) -> Classification {
    let lower = message.to_lowercase();
    let mut best: Option<(MemoryCategory, usize)> = None;
    for (category, keywords) in CATEGORY_KEYWORDS {
        let hits = keywords.iter().filter(|k| lower.contains(*k)).count();
        if hits > 0 && best.map_or(true, |(_, h)| hits > h) {
            best = Some((*category, hits));
        }
    }
    let category = best.map(|(c, _)| c).unwrap_or(MemoryCategory::General);
    Classification {
        category,
        tier: category.tier(),
    }
}

/// True if the message carries any memorable keyword at all.
pub fn is_memorable(message: &str) -> bool {
    CATEGORY_KEYWORDS
        .iter()
        .any(|(_, keywords)| contains_any(message, keywords))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_goes_global() {
        let c = classify("我是张工，我们公司做市政工程");
        assert_eq!(c.category, MemoryCategory::Identity);
        assert_eq!(c.tier, MemoryTier::Global);
    }

    #[test]
    fn test_commercial_goes_cross_session() {
        let c = classify("报价按预算的九折，付款分三期");
        assert_eq!(c.category, MemoryCategory::Commercial);
        assert_eq!(c.tier, MemoryTier::CrossSession);
    }

    #[test]
    fn test_fallback_general_session() {
        let c = classify("今天天气不错");
        assert_eq!(c.category, MemoryCategory::General);
        assert_eq!(c.tier, MemoryTier::Session);
        assert!(!is_memorable("今天天气不错"));
    }

    #[test]
    fn test_english_keywords() {
        assert_eq!(classify("The deadline is next Friday").category, MemoryCategory::Timeline);
        assert_eq!(classify("I prefer a formal style").category, MemoryCategory::Preference);
    }
}
