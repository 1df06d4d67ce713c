//! 结果分类服务 - 业务能力层
//!
//! 把终态结果划分为：
//! - 按 (相关度, 支持度) 分组的成功结果（最多 9 组，空组不生成）
//! - 失败列表
//! - 未分类列表（枚举值不在固定取值范围内）
//!
//! 纯函数，同样的输入总是得到同样的输出，组内顺序等于结果产生顺序。

use std::collections::BTreeMap;

use tracing::warn;

use crate::models::{AnalysisResult, DocumentOutcome, Outcome, RelevanceLevel, SupportLevel};

/// 分组键
pub type BucketKey = (RelevanceLevel, SupportLevel);

/// 已分组的成功结果
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedEntry {
    /// 在输入结果序列中的位置
    pub sequence: usize,
    pub document_id: String,
    pub result: AnalysisResult,
}

/// 失败文档
#[derive(Debug, Clone, PartialEq)]
pub struct FailedDocument {
    pub document_id: String,
    pub attempts: u32,
    pub error: String,
}

/// 抽取成功但枚举值超出取值范围的结果
#[derive(Debug, Clone, PartialEq)]
pub struct UncategorizedResult {
    pub document_id: String,
    pub relevance_level: String,
    pub support_level: String,
    pub result: AnalysisResult,
}

/// 分类结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    buckets: BTreeMap<BucketKey, Vec<ClassifiedEntry>>,
    failures: Vec<FailedDocument>,
    uncategorized: Vec<UncategorizedResult>,
}

impl Classification {
    /// 指定分组的成员，空组返回空切片
    pub fn bucket(&self, relevance: RelevanceLevel, support: SupportLevel) -> &[ClassifiedEntry] {
        self.buckets
            .get(&(relevance, support))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// 按分类顺序遍历非空分组
    pub fn buckets(&self) -> impl Iterator<Item = (BucketKey, &[ClassifiedEntry])> {
        self.buckets
            .iter()
            .map(|(key, entries)| (*key, entries.as_slice()))
    }

    /// 指定相关度下的全部成员（跨三个支持度，保持结果产生顺序）
    pub fn by_relevance(&self, relevance: RelevanceLevel) -> Vec<&ClassifiedEntry> {
        let mut entries: Vec<&ClassifiedEntry> = SupportLevel::ALL
            .iter()
            .flat_map(|support| self.bucket(relevance, *support).iter())
            .collect();
        entries.sort_by_key(|entry| entry.sequence);
        entries
    }

    pub fn failures(&self) -> &[FailedDocument] {
        &self.failures
    }

    pub fn uncategorized(&self) -> &[UncategorizedResult] {
        &self.uncategorized
    }

    /// 抽取成功的数量（含未分类）
    pub fn success_count(&self) -> usize {
        self.classified_count() + self.uncategorized.len()
    }

    /// 已分组的成功数量
    pub fn classified_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// 分类涉及的文档总数
    pub fn total(&self) -> usize {
        self.classified_count() + self.failures.len() + self.uncategorized.len()
    }
}

/// 对终态结果进行分类
pub fn classify(outcomes: &[DocumentOutcome]) -> Classification {
    let mut classification = Classification::default();

    for (sequence, outcome) in outcomes.iter().enumerate() {
        match &outcome.outcome {
            Outcome::Success(result) => match (result.relevance(), result.support()) {
                (Some(relevance), Some(support)) => {
                    classification
                        .buckets
                        .entry((relevance, support))
                        .or_default()
                        .push(ClassifiedEntry {
                            sequence,
                            document_id: outcome.document_id.clone(),
                            result: result.clone(),
                        });
                }
                _ => {
                    warn!(
                        "❓ {} 的分类值超出范围: relevance='{}', support='{}'",
                        outcome.document_id, result.relevance_level, result.support_level
                    );
                    classification.uncategorized.push(UncategorizedResult {
                        document_id: outcome.document_id.clone(),
                        relevance_level: result.relevance_level.clone(),
                        support_level: result.support_level.clone(),
                        result: result.clone(),
                    });
                }
            },
            Outcome::Failure(error) => {
                classification.failures.push(FailedDocument {
                    document_id: outcome.document_id.clone(),
                    attempts: outcome.attempts,
                    error: error.clone(),
                });
            }
        }
    }

    classification
}
