pub mod analysis;
pub mod document;
pub mod loaders;
pub mod outcome;

pub use analysis::{AnalysisResult, RelevanceLevel, SupportLevel};
pub use document::Document;
pub use loaders::{load_all_documents, load_document};
pub use outcome::{DocumentOutcome, Outcome};
