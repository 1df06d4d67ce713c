//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和流程调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `app` - 应用生命周期
//! - 初始化（配置校验、参考案例、抽取客户端）
//! - 加载文档（Vec<Document>）
//! - 分类、写报告、输出全局统计
//!
//! ### `batch_scheduler` - 批次调度器
//! - 按批大小切分文档
//! - 批内并发（Semaphore + tokio::spawn），批间串行
//! - 响应停止信号
//!
//! ## 层次关系
//!
//! ```text
//! app (处理 Vec<Document>)
//!     ↓
//! batch_scheduler (处理一批 Document)
//!     ↓
//! workflow::RetryingAnalyzer (处理单个 Document)
//!     ↓
//! clients::Extractor (一次抽取调用)
//! ```
//!
//! 分类与报告属于 services 层，只在 app 的汇总点调用一次。

pub mod app;
pub mod batch_scheduler;

// 重新导出主要类型
pub use app::{App, RunReport, RunSummary};
pub use batch_scheduler::{
    BatchScheduler, BatchTiming, ConcurrencyLimiter, ScheduleReport, StopSignal,
};
