pub mod extraction_client;
pub mod prompts;

pub use extraction_client::{Extractor, OpenAiExtractor};
