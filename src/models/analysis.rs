//! 结构化抽取结果与分类维度

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// 单个案例的结构化分析结果
///
/// 九个字段全部必填。缺字段或类型不符时反序列化失败，
/// 由调用方当作抽取错误处理，不会产生半成品。
///
/// `relevance_level` / `support_level` 保留服务返回的原始字符串，
/// 是否落在固定取值范围内由分类器判断。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisResult {
    /// The full Blue Book style citation for this case.
    #[serde(rename = "blue_book_citation", alias = "citation")]
    pub citation: String,
    /// A brief summary of the case, 2-4 sentences.
    pub summary: String,
    /// One of 'High', 'Medium', or 'Low'.
    pub relevance_level: String,
    /// Why this relevance level was assigned.
    pub reasoning: String,
    /// Key points in the case related to the research question.
    pub key_points: Vec<String>,
    /// The key cases cited in the opinion.
    pub citations: Vec<String>,
    /// Key quotes, cited in Blue Book style to the exact page.
    pub quotes: Vec<String>,
    /// Brief-style argument for (or distinguishing) the case.
    pub argument: String,
    /// One of 'Strongly Supports', 'Supports', or 'Does not Support'.
    pub support_level: String,
}

impl AnalysisResult {
    /// 解析相关度，超出取值范围时返回 None
    pub fn relevance(&self) -> Option<RelevanceLevel> {
        RelevanceLevel::from_label(&self.relevance_level)
    }

    /// 解析支持度，超出取值范围时返回 None
    pub fn support(&self) -> Option<SupportLevel> {
        SupportLevel::from_label(&self.support_level)
    }
}

/// 相关度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RelevanceLevel {
    High,
    Medium,
    Low,
}

impl RelevanceLevel {
    /// 全部取值（报告输出顺序）
    pub const ALL: [RelevanceLevel; 3] = [
        RelevanceLevel::High,
        RelevanceLevel::Medium,
        RelevanceLevel::Low,
    ];

    /// 服务端使用的标签
    pub fn label(self) -> &'static str {
        match self {
            RelevanceLevel::High => "High",
            RelevanceLevel::Medium => "Medium",
            RelevanceLevel::Low => "Low",
        }
    }

    /// 从标签解析（精确匹配，忽略首尾空白）
    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim() {
            "High" => Some(RelevanceLevel::High),
            "Medium" => Some(RelevanceLevel::Medium),
            "Low" => Some(RelevanceLevel::Low),
            _ => None,
        }
    }

    /// 报告子目录名
    pub fn folder_name(self) -> &'static str {
        match self {
            RelevanceLevel::High => "high_relevance",
            RelevanceLevel::Medium => "medium_relevance",
            RelevanceLevel::Low => "low_relevance",
        }
    }

    /// 小写短名，用于文件名
    pub fn slug(self) -> &'static str {
        match self {
            RelevanceLevel::High => "high",
            RelevanceLevel::Medium => "medium",
            RelevanceLevel::Low => "low",
        }
    }
}

impl std::fmt::Display for RelevanceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// 支持度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SupportLevel {
    StronglySupports,
    Supports,
    DoesNotSupport,
}

impl SupportLevel {
    /// 全部取值（报告输出顺序）
    pub const ALL: [SupportLevel; 3] = [
        SupportLevel::StronglySupports,
        SupportLevel::Supports,
        SupportLevel::DoesNotSupport,
    ];

    /// 服务端使用的标签
    pub fn label(self) -> &'static str {
        match self {
            SupportLevel::StronglySupports => "Strongly Supports",
            SupportLevel::Supports => "Supports",
            SupportLevel::DoesNotSupport => "Does not Support",
        }
    }

    /// 从标签解析（精确匹配，忽略首尾空白）
    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim() {
            "Strongly Supports" => Some(SupportLevel::StronglySupports),
            "Supports" => Some(SupportLevel::Supports),
            "Does not Support" => Some(SupportLevel::DoesNotSupport),
            _ => None,
        }
    }
}

impl std::fmt::Display for SupportLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}
