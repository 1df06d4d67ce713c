//! 报告写入服务 - 业务能力层
//!
//! 只负责把分类结果写成文件，不关心分类规则和调度流程。
//!
//! 输出目录结构：
//!
//! ```text
//! {output}/
//! ├── high_relevance/
//! │   ├── high_relevance_analysis.md
//! │   └── Relevance High - Supports.md
//! ├── medium_relevance/
//! ├── low_relevance/
//! ├── failures.md        （有失败时）
//! └── uncategorized.md   （有未分类时）
//! ```

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};

use crate::error::ReportError;
use crate::models::{AnalysisResult, RelevanceLevel};
use crate::services::classifier::{Classification, ClassifiedEntry};

/// 报告输出能力
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// 写出一次运行的分类结果
    async fn write(&self, classification: &Classification) -> Result<ReportManifest, ReportError>;
}

/// 本次写出的文件清单
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportManifest {
    pub files: Vec<PathBuf>,
}

/// Markdown 报告写入器
pub struct MarkdownReportWriter {
    output_dir: PathBuf,
}

impl MarkdownReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    async fn write_file(
        &self,
        path: PathBuf,
        content: String,
        manifest: &mut ReportManifest,
    ) -> Result<(), ReportError> {
        fs::write(&path, content)
            .await
            .map_err(|e| ReportError::write_failed(&path, e))?;
        info!("✓ 报告已保存: {}", path.display());
        manifest.files.push(path);
        Ok(())
    }
}

#[async_trait]
impl ReportSink for MarkdownReportWriter {
    async fn write(&self, classification: &Classification) -> Result<ReportManifest, ReportError> {
        let mut manifest = ReportManifest::default();

        for relevance in RelevanceLevel::ALL {
            let folder = self.output_dir.join(relevance.folder_name());
            fs::create_dir_all(&folder)
                .await
                .map_err(|e| ReportError::write_failed(&folder, e))?;
        }

        // 每个相关度一个汇总文件
        for relevance in RelevanceLevel::ALL {
            let entries = classification.by_relevance(relevance);
            if entries.is_empty() {
                debug!("{} 相关度没有结果，跳过汇总文件", relevance);
                continue;
            }
            let path = self
                .output_dir
                .join(relevance.folder_name())
                .join(format!("{}_relevance_analysis.md", relevance.slug()));
            self.write_file(path, render_entries(entries), &mut manifest)
                .await?;
        }

        // 每个非空组合一个文件
        for ((relevance, support), entries) in classification.buckets() {
            let path = self
                .output_dir
                .join(relevance.folder_name())
                .join(format!("Relevance {} - {}.md", relevance, support));
            self.write_file(path, render_entries(entries.iter()), &mut manifest)
                .await?;
        }

        if !classification.failures().is_empty() {
            let mut content = String::from("# Failed Documents\n\n");
            for failed in classification.failures() {
                let _ = writeln!(
                    content,
                    "- **{}** ({} attempts): {}",
                    failed.document_id, failed.attempts, failed.error
                );
            }
            let path = self.output_dir.join("failures.md");
            self.write_file(path, content, &mut manifest).await?;
        }

        if !classification.uncategorized().is_empty() {
            let mut content = String::from("# Uncategorized Results\n\n");
            for item in classification.uncategorized() {
                let _ = writeln!(
                    content,
                    "> Document `{}`: relevance '{}', support '{}'\n",
                    item.document_id, item.relevance_level, item.support_level
                );
                content.push_str(&render_analysis(&item.result));
                content.push_str("\n---\n\n");
            }
            let path = self.output_dir.join("uncategorized.md");
            self.write_file(path, content, &mut manifest).await?;
        }

        Ok(manifest)
    }
}

/// 渲染多条结果，条目之间用水平线分隔
fn render_entries<'a>(entries: impl IntoIterator<Item = &'a ClassifiedEntry>) -> String {
    entries
        .into_iter()
        .map(|entry| render_analysis(&entry.result))
        .collect::<Vec<_>>()
        .join("\n---\n\n")
}

/// 渲染单条分析结果
pub fn render_analysis(result: &AnalysisResult) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "# Case Analysis: {}\n", result.citation);

    let _ = writeln!(out, "## SUMMARY\n\n{}\n", result.summary);

    let _ = writeln!(out, "## RELEVANCY\n");
    let _ = writeln!(out, "Relevance Level: {}\n", result.relevance_level);
    let _ = writeln!(out, "Reasoning: {}\n", result.reasoning);

    let _ = writeln!(out, "## SUPPORT LEVEL\n");
    let _ = writeln!(out, "Support Level: {}\n", result.support_level);

    let _ = writeln!(out, "## ARGUMENT\n\n{}\n", result.argument);

    push_list(&mut out, "KEY POINTS", &result.key_points);
    push_list(&mut out, "CITATIONS", &result.citations);
    push_list(&mut out, "QUOTES", &result.quotes);

    out
}

fn push_list(out: &mut String, heading: &str, items: &[String]) {
    let _ = writeln!(out, "## {}\n", heading);
    for item in items {
        let _ = writeln!(out, "- {}", item);
    }
    out.push('\n');
}
