//! 单文档分析流程 - 流程层
//!
//! 核心职责：为"一篇文档"产生唯一的终态结果
//!
//! 流程顺序：
//! 1. 调用抽取服务（受单次超时约束）
//! 2. 失败且未达上限 → 等待 `base_delay * 2^attempt` 后重试
//! 3. 成功立即返回；重试耗尽返回 Failure
//!
//! 整个重试序列还可以受单文档超时约束。等待只挂起当前任务。

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::clients::Extractor;
use crate::config::Config;
use crate::error::ExtractionError;
use crate::models::{AnalysisResult, Document, DocumentOutcome, Outcome};
use crate::utils::logging::truncate_text;

/// 重试策略
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// 最大重试次数
    pub max_retries: u32,
    /// 退避基础时长
    pub base_delay: Duration,
    /// 单次调用超时
    pub call_timeout: Option<Duration>,
    /// 整个重试序列的超时
    pub document_timeout: Option<Duration>,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.retry_delay(),
            call_timeout: config.request_timeout(),
            document_timeout: config.document_timeout(),
        }
    }

    /// 第 `attempt` 次失败后（从 0 开始）的等待时长
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    /// 总尝试次数上限
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// 带重试的分析器
///
/// - 包装抽取客户端，只处理单篇文档
/// - 重试计数只存在于一次 `run` 调用内部，不共享
/// - 抽取错误全部在这里消化，不向调度器抛出
pub struct RetryingAnalyzer {
    extractor: Arc<dyn Extractor>,
    policy: RetryPolicy,
}

impl RetryingAnalyzer {
    pub fn new(extractor: Arc<dyn Extractor>, policy: RetryPolicy) -> Self {
        Self { extractor, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// 分析一篇文档，返回终态
    pub async fn run(&self, document: &Document) -> DocumentOutcome {
        debug!(
            "[{}] 开始分析: {}",
            document.id,
            truncate_text(&document.text, 60)
        );

        let mut attempts = 0u32;
        let outcome = match self.policy.document_timeout {
            Some(limit) => {
                let bounded = timeout(limit, self.run_attempts(document, &mut attempts)).await;
                match bounded {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        warn!(
                            "[{}] ⏱️ 文档处理超时 ({:?})，已尝试 {} 次",
                            document.id, limit, attempts
                        );
                        Outcome::Failure(format!(
                            "Timed out after {:?} ({} attempts)",
                            limit, attempts
                        ))
                    }
                }
            }
            None => self.run_attempts(document, &mut attempts).await,
        };

        DocumentOutcome {
            document_id: document.id.clone(),
            attempts,
            outcome,
        }
    }

    async fn run_attempts(&self, document: &Document, attempts: &mut u32) -> Outcome {
        let max_retries = self.policy.max_retries;
        let mut attempt = 0u32;

        loop {
            *attempts = attempt + 1;

            match self.call_once(&document.text).await {
                Ok(result) => {
                    info!("[{}] ✓ 抽取成功 (第 {} 次尝试)", document.id, attempt + 1);
                    return Outcome::Success(result);
                }
                Err(e) if attempt < max_retries => {
                    let wait = self.policy.backoff_delay(attempt);
                    warn!(
                        "[{}] ⚠️ 第 {} 次尝试失败: {}，{:?} 后重试",
                        document.id,
                        attempt + 1,
                        e,
                        wait
                    );
                    sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!("[{}] ❌ 重试 {} 次后仍失败: {}", document.id, max_retries, e);
                    return Outcome::Failure(format!(
                        "Failed after {} retries: {}",
                        max_retries, e
                    ));
                }
            }
        }
    }

    async fn call_once(&self, text: &str) -> Result<AnalysisResult, ExtractionError> {
        match self.policy.call_timeout {
            Some(limit) => timeout(limit, self.extractor.extract(text))
                .await
                .unwrap_or(Err(ExtractionError::Timeout { limit })),
            None => self.extractor.extract(text).await,
        }
    }
}
