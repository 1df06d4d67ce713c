//! 应用生命周期 - 编排层
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：校验配置、读取参考案例、创建抽取客户端
//! 2. **批量加载**：扫描并加载所有待分析的文档（`Vec<Document>`）
//! 3. **调度**：委托 `BatchScheduler` 分批处理
//! 4. **分类与输出**：在唯一的汇总点分类，交给 `ReportSink` 写出
//! 5. **全局统计**：汇总并打印本次运行结果
//!
//! 初始化阶段的任何错误都发生在第一批开始之前。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::clients::{Extractor, OpenAiExtractor};
use crate::config::Config;
use crate::error::{AppResult, SetupError};
use crate::models::{load_all_documents, Document};
use crate::orchestrator::batch_scheduler::{
    BatchScheduler, ConcurrencyLimiter, ScheduleReport, StopSignal,
};
use crate::services::{classify, Classification, MarkdownReportWriter, ReportManifest, ReportSink};
use crate::utils::logging::{log_documents_loaded, log_startup, print_final_stats};
use crate::workflow::{RetryPolicy, RetryingAnalyzer};

/// 应用主结构
pub struct App {
    config: Config,
    extractor: Arc<dyn Extractor>,
    report_sink: Box<dyn ReportSink>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> AppResult<Self> {
        config.validate()?;
        log_startup(&config);

        let reference_text = load_reference_text(&config).await?;
        let extractor = OpenAiExtractor::new(&config, reference_text)?;
        info!("✓ 抽取客户端已就绪 (模型: {})", extractor.model_name());

        let report_sink = Box::new(MarkdownReportWriter::new(&config.output_folder));

        Ok(Self::with_components(
            config,
            Arc::new(extractor),
            report_sink,
        ))
    }

    /// 使用指定的抽取能力与报告输出创建应用
    pub fn with_components(
        config: Config,
        extractor: Arc<dyn Extractor>,
        report_sink: Box<dyn ReportSink>,
    ) -> Self {
        Self {
            config,
            extractor,
            report_sink,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 运行应用主逻辑，处理期间响应 Ctrl-C
    ///
    /// 第一次 Ctrl-C 跑完当前批次后停止，第二次立即中止。
    pub async fn run(&self) -> AppResult<RunReport> {
        let (stop_tx, stop_rx) = watch::channel(StopSignal::Run);
        let ctrl_c = futures::stream::unfold((), |()| async {
            tokio::signal::ctrl_c().await.ok().map(|()| ((), ()))
        });
        let listener = tokio::spawn(escalate_interrupts(ctrl_c, stop_tx));

        let result = self.run_until(stop_rx).await;
        listener.abort();
        result
    }

    /// 运行应用主逻辑，按 `stop` 信号停止或中止
    pub async fn run_until(&self, stop: watch::Receiver<StopSignal>) -> AppResult<RunReport> {
        let started = Instant::now();

        // 加载所有待处理的文档
        let documents = self.load_documents().await?;

        if documents.is_empty() {
            warn!(
                "⚠️ {} 中没有找到待处理的文档，程序结束",
                self.config.input_folder
            );
            return Ok(RunReport::default());
        }

        log_documents_loaded(documents.len(), self.config.max_concurrent_requests);

        // 处理所有文档
        let schedule = self.build_scheduler().run_until(documents, stop).await?;

        info!("\n📝 正在生成分类报告...");
        let classification = classify(&schedule.outcomes);
        let manifest = self.report_sink.write(&classification).await?;

        let summary = RunSummary::new(&classification, &schedule, started.elapsed());

        // 输出最终统计
        print_final_stats(&summary, classification.failures());

        Ok(RunReport {
            summary,
            classification,
            schedule,
            manifest,
        })
    }

    /// 加载文档
    async fn load_documents(&self) -> AppResult<Vec<Document>> {
        info!("\n📁 正在扫描待处理的文档...");
        Ok(load_all_documents(&self.config.input_folder).await?)
    }

    fn build_scheduler(&self) -> BatchScheduler {
        let policy = RetryPolicy::from_config(&self.config);
        let analyzer = Arc::new(RetryingAnalyzer::new(Arc::clone(&self.extractor), policy));
        let limiter = ConcurrencyLimiter::new(self.config.max_concurrent_requests);
        BatchScheduler::new(analyzer, limiter)
    }
}

/// 把中断信号逐级转换为停止信号
///
/// 第一次中断发送 `Drain`，之后的中断发送 `Abort` 并结束监听。
pub async fn escalate_interrupts<S>(interrupts: S, stop_tx: watch::Sender<StopSignal>)
where
    S: Stream<Item = ()>,
{
    tokio::pin!(interrupts);
    while interrupts.next().await.is_some() {
        if *stop_tx.borrow() == StopSignal::Run {
            warn!("🛑 收到 Ctrl-C，当前批次完成后停止（再按一次立即中止）");
            stop_tx.send_replace(StopSignal::Drain);
        } else {
            error!("🛑 再次收到 Ctrl-C，立即中止当前批次");
            stop_tx.send_replace(StopSignal::Abort);
            break;
        }
    }
}

/// 读取参考案例全文
///
/// 未配置时返回 None，由抽取客户端使用随程序附带的参考判例。
async fn load_reference_text(config: &Config) -> Result<Option<String>, SetupError> {
    let Some(path) = config.reference_case_file.as_deref() else {
        return Ok(None);
    };

    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SetupError::ReferenceFileUnreadable {
            path: PathBuf::from(path),
            source,
        })?;
    info!("📚 已加载参考案例: {} ({} 字符)", path, text.chars().count());
    Ok(Some(text))
}

/// 运行统计
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// 输入文档总数
    pub total: usize,
    /// 抽取成功数（含未分类）
    pub succeeded: usize,
    pub failed: usize,
    pub uncategorized: usize,
    /// 因中断未处理的文档数
    pub skipped: usize,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn new(classification: &Classification, schedule: &ScheduleReport, elapsed: Duration) -> Self {
        Self {
            total: classification.total() + schedule.skipped.len(),
            succeeded: classification.success_count(),
            failed: classification.failures().len(),
            uncategorized: classification.uncategorized().len(),
            skipped: schedule.skipped.len(),
            elapsed,
        }
    }
}

/// 一次运行的完整结果
#[derive(Debug, Default)]
pub struct RunReport {
    pub summary: RunSummary,
    pub classification: Classification,
    pub schedule: ScheduleReport,
    pub manifest: ReportManifest,
}
