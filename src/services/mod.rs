pub mod classifier;
pub mod report_writer;

pub use classifier::{classify, Classification, FailedDocument, UncategorizedResult};
pub use report_writer::{MarkdownReportWriter, ReportManifest, ReportSink};
