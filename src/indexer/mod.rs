pub mod graph_builder;
pub mod parser;
pub mod progress;
pub mod resolver;
pub mod scope_builder;
pub mod signature;
pub mod walker;

pub use graph_builder::{GraphBuilder, IndexOptions};
pub use parser::{ParsedFile, Parser};
pub use progress::{IndexingProgress, ProgressSnapshot};
pub use resolver::{DeclarationTable, BUILTIN_TYPES};
pub use scope_builder::{scope_at_offset, scope_chain, ScopeBuilder};
pub use walker::FileWalker;
