pub mod cleanup;
pub mod extractor;

pub use extractor::{ContextExtractor, ContextFlags, SelectionItem};
