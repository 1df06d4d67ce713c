//! 批次调度器 - 编排层
//!
//! ## 职责
//!
//! 1. **分批**：按 `batch_size` 把文档切成连续批次
//! 2. **批内并发**：每篇文档一个 tokio 任务，持有一个 Semaphore 许可
//! 3. **批间串行**：本批全部得到终态后才开始下一批
//! 4. **收集结果**：按完成顺序收集，每篇文档恰好一条
//! 5. **两级停止**：`Drain` 让进行中的批次跑完、不再开始新批次；
//!    `Abort` 立即取消进行中的任务并关闭限制器
//!
//! ## 故障处理
//!
//! 抽取失败已经在 `RetryingAnalyzer` 里变成 `Outcome::Failure`。
//! 这里只处理任务 panic / 被取消：中止本批剩余任务，整批作废，返回 `TaskFault`。

use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{error, warn};

use crate::error::SchedulerError;
use crate::models::{Document, DocumentOutcome};
use crate::utils::logging::{log_batch_complete, log_batch_start};
use crate::workflow::RetryingAnalyzer;

/// 并发限制器
///
/// 大小即批大小，由调度器独占。
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    size: usize,
}

impl ConcurrencyLimiter {
    /// 创建限制器，大小至少为 1
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// 关闭限制器，之后的 `acquire` 都会失败
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    /// 获取一个许可，随任务一起移动，任务结束时释放
    ///
    /// 限制器被中止关闭后返回 `LimiterClosed`。
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, SchedulerError> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| SchedulerError::LimiterClosed)
    }
}

/// 停止信号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopSignal {
    /// 正常运行
    #[default]
    Run,
    /// 跑完当前批次后停止
    Drain,
    /// 立即中止当前批次
    Abort,
}

/// 单个批次的起止时间
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchTiming {
    /// 批次编号（从 1 开始）
    pub index: usize,
    pub size: usize,
    pub started_at: Instant,
    pub finished_at: Instant,
}

/// 调度结果
#[derive(Debug, Default)]
pub struct ScheduleReport {
    /// 终态结果（批内按完成顺序）
    pub outcomes: Vec<DocumentOutcome>,
    /// 已执行批次
    pub batches: Vec<BatchTiming>,
    /// 因停止信号未开始处理的文档
    pub skipped: Vec<String>,
    /// 是否被停止信号中断
    pub interrupted: bool,
}

/// 批次调度器
pub struct BatchScheduler {
    analyzer: Arc<RetryingAnalyzer>,
    limiter: ConcurrencyLimiter,
}

impl BatchScheduler {
    pub fn new(analyzer: Arc<RetryingAnalyzer>, limiter: ConcurrencyLimiter) -> Self {
        Self { analyzer, limiter }
    }

    pub fn batch_size(&self) -> usize {
        self.limiter.size()
    }

    /// 处理全部文档
    pub async fn run(&self, documents: Vec<Document>) -> Result<ScheduleReport, SchedulerError> {
        let (_stop_tx, stop_rx) = watch::channel(StopSignal::Run);
        self.run_until(documents, stop_rx).await
    }

    /// 处理全部文档，按停止信号提前结束
    ///
    /// - `Drain`：不再开始新批次，未开始的文档记入 `skipped`
    /// - `Abort`：取消进行中的批次，返回 `SchedulerError::Aborted`
    pub async fn run_until(
        &self,
        documents: Vec<Document>,
        mut stop: watch::Receiver<StopSignal>,
    ) -> Result<ScheduleReport, SchedulerError> {
        let total = documents.len();
        let batch_size = self.batch_size();
        let total_batches = total.div_ceil(batch_size);

        let mut report = ScheduleReport::default();
        let mut remaining = documents.into_iter();
        let mut batch_num = 0;

        loop {
            let batch: Vec<Document> = remaining.by_ref().take(batch_size).collect();
            if batch.is_empty() {
                break;
            }

            let signal = *stop.borrow_and_update();
            if signal != StopSignal::Run {
                report.skipped.extend(batch.into_iter().map(|doc| doc.id));
                report.skipped.extend(remaining.by_ref().map(|doc| doc.id));
                report.interrupted = true;
                warn!(
                    "🛑 收到停止信号，跳过剩余 {} 个文档",
                    report.skipped.len()
                );
                break;
            }

            batch_num += 1;
            let start = (batch_num - 1) * batch_size + 1;
            let size = batch.len();
            log_batch_start(batch_num, total_batches, start, start + size - 1, total);

            let started_at = Instant::now();
            let outcomes = self.run_batch(batch_num, batch, &mut stop).await?;
            let finished_at = Instant::now();

            let success = outcomes.iter().filter(|o| o.outcome.is_success()).count();
            log_batch_complete(batch_num, success, size, finished_at - started_at);

            report.batches.push(BatchTiming {
                index: batch_num,
                size,
                started_at,
                finished_at,
            });
            report.outcomes.extend(outcomes);
        }

        Ok(report)
    }

    /// 处理单个批次，等待本批所有任务完成或收到中止信号
    async fn run_batch(
        &self,
        batch_num: usize,
        batch: Vec<Document>,
        stop: &mut watch::Receiver<StopSignal>,
    ) -> Result<Vec<DocumentOutcome>, SchedulerError> {
        let mut abort_handles = Vec::with_capacity(batch.len());
        let mut in_flight = FuturesUnordered::new();

        // 为本批创建并发任务
        for document in batch {
            let permit = self.limiter.acquire().await?;
            let analyzer = Arc::clone(&self.analyzer);
            let document_id = document.id.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                analyzer.run(&document).await
            });
            abort_handles.push(handle.abort_handle());
            in_flight.push(async move { (document_id, handle.await) });
        }

        let mut outcomes = Vec::with_capacity(abort_handles.len());
        // 发送端已关闭时不再监听
        let mut watching = true;
        loop {
            tokio::select! {
                next = in_flight.next() => {
                    let Some((document_id, joined)) = next else {
                        break;
                    };
                    match joined {
                        Ok(outcome) => outcomes.push(outcome),
                        Err(e) => {
                            error!("[{}] 💥 任务执行异常: {}", document_id, e);
                            for handle in &abort_handles {
                                handle.abort();
                            }
                            return Err(SchedulerError::TaskFault {
                                batch: batch_num,
                                document_id,
                                reason: e.to_string(),
                            });
                        }
                    }
                }
                changed = stop.changed(), if watching => {
                    if changed.is_err() {
                        watching = false;
                        continue;
                    }
                    if *stop.borrow_and_update() == StopSignal::Abort {
                        let cancelled = abort_handles.len() - outcomes.len();
                        error!("🛑 收到中止信号，取消第 {} 批中 {} 个进行中的文档", batch_num, cancelled);
                        for handle in &abort_handles {
                            handle.abort();
                        }
                        self.limiter.close();
                        return Err(SchedulerError::Aborted {
                            batch: batch_num,
                            cancelled,
                        });
                    }
                }
            }
        }

        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::Extractor;
    use crate::error::ExtractionError;
    use crate::models::{AnalysisResult, Outcome};
    use crate::workflow::RetryPolicy;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::sleep;
    use tokio_test::{assert_err, assert_ok};

    fn sample_result() -> AnalysisResult {
        AnalysisResult {
            citation: "Doe v. Roe".to_string(),
            summary: String::new(),
            relevance_level: "Low".to_string(),
            reasoning: String::new(),
            key_points: vec![],
            citations: vec![],
            quotes: vec![],
            argument: String::new(),
            support_level: "Supports".to_string(),
        }
    }

    /// 记录并发数的桩：文本为 "panic" 时 panic，"fail" 时返回错误
    struct CountingExtractor {
        delay: Duration,
        current: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    impl CountingExtractor {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                current: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Extractor for CountingExtractor {
        async fn extract(&self, text: &str) -> Result<AnalysisResult, ExtractionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            sleep(self.delay).await;
            self.current.fetch_sub(1, Ordering::SeqCst);

            match text {
                "panic" => panic!("extractor blew up"),
                "fail" => Err(ExtractionError::request("stub", "permanent")),
                _ => Ok(sample_result()),
            }
        }
    }

    fn scheduler(extractor: Arc<CountingExtractor>, batch_size: usize) -> BatchScheduler {
        let policy = RetryPolicy {
            max_retries: 0,
            base_delay: Duration::from_secs(1),
            call_timeout: None,
            document_timeout: None,
        };
        let analyzer = Arc::new(RetryingAnalyzer::new(extractor, policy));
        BatchScheduler::new(analyzer, ConcurrencyLimiter::new(batch_size))
    }

    fn documents(n: usize) -> Vec<Document> {
        (0..n)
            .map(|i| Document::new(format!("doc_{i:02}.txt"), "text"))
            .collect()
    }

    #[test]
    fn test_limiter_size_is_at_least_one() {
        assert_eq!(ConcurrencyLimiter::new(0).size(), 1);
        assert_eq!(ConcurrencyLimiter::new(7).size(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_document_gets_exactly_one_outcome() {
        let extractor = Arc::new(CountingExtractor::new(Duration::from_millis(100)));
        let scheduler = scheduler(extractor.clone(), 5);

        let mut docs = documents(11);
        docs.push(Document::new("bad.txt", "fail"));
        let report = assert_ok!(scheduler.run(docs).await);

        assert_eq!(report.outcomes.len(), 12);
        let ids: HashSet<_> = report.outcomes.iter().map(|o| o.document_id.clone()).collect();
        assert_eq!(ids.len(), 12);
        assert!(ids.contains("bad.txt"));
        assert_eq!(
            report.outcomes.iter().filter(|o| !o.outcome.is_success()).count(),
            1
        );
        assert!(report.skipped.is_empty());
        assert!(!report.interrupted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_are_sized_and_strictly_sequential() {
        let extractor = Arc::new(CountingExtractor::new(Duration::from_millis(100)));
        let scheduler = scheduler(extractor.clone(), 5);

        let report = scheduler.run(documents(12)).await.unwrap();

        let sizes: Vec<_> = report.batches.iter().map(|b| b.size).collect();
        assert_eq!(sizes, vec![5, 5, 2]);
        for pair in report.batches.windows(2) {
            assert!(pair[1].started_at >= pair[0].finished_at);
            assert_eq!(pair[1].index, pair[0].index + 1);
        }
        assert_eq!(extractor.peak.load(Ordering::SeqCst), 5);
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 12);
        // 三批依次执行，每批 100ms
        let elapsed = report.batches[2].finished_at - report.batches[0].started_at;
        assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(400), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_never_exceeds_batch_size() {
        let extractor = Arc::new(CountingExtractor::new(Duration::from_millis(10)));
        let scheduler = scheduler(extractor.clone(), 3);

        scheduler.run(documents(10)).await.unwrap();

        assert!(extractor.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_input_produces_empty_report() {
        let extractor = Arc::new(CountingExtractor::new(Duration::ZERO));
        let report = scheduler(extractor, 4).run(Vec::new()).await.unwrap();

        assert!(report.outcomes.is_empty());
        assert!(report.batches.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_panic_is_a_task_fault() {
        let extractor = Arc::new(CountingExtractor::new(Duration::from_millis(10)));
        let scheduler = scheduler(extractor, 2);

        let docs = vec![
            Document::new("a.txt", "text"),
            Document::new("b.txt", "text"),
            Document::new("boom.txt", "panic"),
            Document::new("c.txt", "text"),
        ];
        let err = assert_err!(scheduler.run(docs).await);

        match err {
            SchedulerError::TaskFault {
                batch, document_id, ..
            } => {
                assert_eq!(batch, 2);
                assert_eq!(document_id, "boom.txt");
            }
            other => panic!("应当是 TaskFault: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_before_start_skips_everything() {
        let extractor = Arc::new(CountingExtractor::new(Duration::from_millis(10)));
        let scheduler = scheduler(extractor.clone(), 2);
        let (_tx, rx) = watch::channel(StopSignal::Drain);

        let report = scheduler.run_until(documents(3), rx).await.unwrap();

        assert!(report.interrupted);
        assert!(report.outcomes.is_empty());
        assert_eq!(report.skipped, vec!["doc_00.txt", "doc_01.txt", "doc_02.txt"]);
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_lets_in_flight_batch_finish() {
        let extractor = Arc::new(CountingExtractor::new(Duration::from_millis(100)));
        let scheduler = scheduler(extractor.clone(), 2);
        let (tx, rx) = watch::channel(StopSignal::Run);

        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            let _ = tx.send(StopSignal::Drain);
        });

        let report = scheduler.run_until(documents(5), rx).await.unwrap();

        assert!(report.interrupted);
        assert_eq!(report.outcomes.len(), 2);
        assert!(report
            .outcomes
            .iter()
            .all(|o| matches!(o.outcome, Outcome::Success(_))));
        assert_eq!(report.skipped, vec!["doc_02.txt", "doc_03.txt", "doc_04.txt"]);
        assert_eq!(report.batches.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_cancels_in_flight_batch() {
        let extractor = Arc::new(CountingExtractor::new(Duration::from_secs(600)));
        let scheduler = scheduler(extractor.clone(), 2);
        let (tx, rx) = watch::channel(StopSignal::Run);

        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            let _ = tx.send(StopSignal::Abort);
        });

        let started = Instant::now();
        let err = assert_err!(scheduler.run_until(documents(5), rx).await);

        assert!(matches!(
            err,
            SchedulerError::Aborted {
                batch: 1,
                cancelled: 2
            }
        ));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_then_abort_escalates() {
        let extractor = Arc::new(CountingExtractor::new(Duration::from_secs(600)));
        let scheduler = scheduler(extractor, 2);
        let (tx, rx) = watch::channel(StopSignal::Run);

        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            let _ = tx.send(StopSignal::Drain);
            sleep(Duration::from_millis(50)).await;
            let _ = tx.send(StopSignal::Abort);
        });

        let started = Instant::now();
        let err = assert_err!(scheduler.run_until(documents(4), rx).await);

        assert!(matches!(err, SchedulerError::Aborted { batch: 1, .. }));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborted_scheduler_refuses_new_work() {
        let extractor = Arc::new(CountingExtractor::new(Duration::from_secs(600)));
        let scheduler = scheduler(extractor, 2);
        let (tx, rx) = watch::channel(StopSignal::Run);

        tokio::spawn(async move {
            sleep(Duration::from_millis(10)).await;
            let _ = tx.send(StopSignal::Abort);
        });
        assert_err!(scheduler.run_until(documents(2), rx).await);
        assert!(scheduler.limiter.is_closed());

        let err = assert_err!(scheduler.run(documents(1)).await);
        assert!(matches!(err, SchedulerError::LimiterClosed));
    }
}
