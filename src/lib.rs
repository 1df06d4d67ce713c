//! # Case Analysis
//!
//! 批量调用结构化抽取服务分析判例，并按两个维度分类输出报告
//!
//! ## 架构设计
//!
//! ### ① 客户端层（Clients）
//! - `clients/` - 一次调用 = 一次请求，不重试
//! - `Extractor` - 抽取能力（文本 → AnalysisResult）
//! - `OpenAiExtractor` - OpenAI 兼容接口实现
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `classify` - 按 (相关度, 支持度) 分组
//! - `MarkdownReportWriter` - 写报告能力
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一篇文档"的完整处理流程
//! - `RetryingAnalyzer` - 抽取 + 指数退避重试 → 唯一终态
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_scheduler` - 分批调度，批内并发、批间串行
//! - `orchestrator/app` - 应用生命周期与全局统计
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::{Extractor, OpenAiExtractor};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{AnalysisResult, Document, DocumentOutcome, Outcome, RelevanceLevel, SupportLevel};
pub use orchestrator::{App, BatchScheduler, RunReport, RunSummary};
pub use services::{classify, Classification, MarkdownReportWriter, ReportSink};
pub use workflow::{RetryPolicy, RetryingAnalyzer};
