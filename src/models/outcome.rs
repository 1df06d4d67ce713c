//! 单个文档的终态结果

use crate::models::analysis::AnalysisResult;

/// 分析终态
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// 抽取成功
    Success(AnalysisResult),
    /// 重试耗尽或超时，附带错误描述
    Failure(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}

/// 文档终态记录
///
/// 每个输入文档恰好产生一条。
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentOutcome {
    /// 文档标识
    pub document_id: String,
    /// 实际调用抽取服务的次数
    pub attempts: u32,
    /// 终态
    pub outcome: Outcome,
}

impl DocumentOutcome {
    pub fn success(document_id: impl Into<String>, attempts: u32, result: AnalysisResult) -> Self {
        Self {
            document_id: document_id.into(),
            attempts,
            outcome: Outcome::Success(result),
        }
    }

    pub fn failure(document_id: impl Into<String>, attempts: u32, error: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            attempts,
            outcome: Outcome::Failure(error.into()),
        }
    }
}
