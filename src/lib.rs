pub mod config;
pub mod context;
pub mod diff;
pub mod engine;
pub mod error;
pub mod index;
pub mod indexer;
pub mod languages;
pub mod patch;

pub use config::AnalysisConfig;
pub use context::{ContextExtractor, ContextFlags, SelectionItem};
pub use diff::{
    tokenize, DiffLine, DiffLineKind, MemberDiffer, ModifiedChange, Token, TokenChange,
    TokenDiffEngine, TokenKind, TreeChange, TreeChangeType, TreeDiff, TreeDiffer,
};
pub use engine::AnalysisEngine;
pub use error::{IndexerError, Result};
pub use index::{
    get_deep_dependencies, DependencyTracker, GraphCache, GraphStats, LinkKind, ScopeId, ScopeNode,
    ScopeTree, SymbolGraph, SymbolKind, SymbolLink, SymbolNode,
};
pub use indexer::{GraphBuilder, IndexOptions, Parser, ScopeBuilder};
pub use languages::LanguageRegistry;
pub use patch::{PatchStatus, ProposedPatch, SnippetPatcher};
