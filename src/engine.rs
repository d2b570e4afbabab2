//! Facade over indexing, context extraction, diffing and patching.
//!
//! The engine owns the project graph cache; every other operation is a pure
//! function of its inputs.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use crate::config::AnalysisConfig;
use crate::context::{ContextExtractor, ContextFlags, SelectionItem};
use crate::diff::{
    tokenize, DiffLine, DiffLineKind, MemberDiffer, Token, TokenChange, TokenDiffEngine, TreeDiff,
    TreeDiffer,
};
use crate::error::Result;
use crate::index::{get_deep_dependencies, GraphCache, ScopeTree, SymbolGraph};
use crate::indexer::{IndexingProgress, Parser, ScopeBuilder};
use crate::patch::{ProposedPatch, SnippetPatcher};

pub struct AnalysisEngine {
    config: AnalysisConfig,
    cache: GraphCache,
}

impl AnalysisEngine {
    pub fn new(config: AnalysisConfig) -> Self {
        let cache = GraphCache::new(config.index_options());
        Self { config, cache }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn progress(&self) -> &IndexingProgress {
        self.cache.progress()
    }

    /// Graph of `root`, built once and cached until another root is requested
    pub async fn index_project(&self, root: &Path) -> Result<Arc<SymbolGraph>> {
        self.cache.get_or_build(root).await
    }

    pub async fn current_graph(&self) -> Option<Arc<SymbolGraph>> {
        self.cache.current().await
    }

    pub fn build_scope_tree(&self, text: &str, file_path: &str) -> ScopeTree {
        match Parser::default().parse_text(text) {
            Ok(parsed) => ScopeBuilder::new().build(&parsed, file_path),
            Err(e) => {
                tracing::warn!("Cannot build scopes for {}: {}", file_path, e);
                ScopeTree {
                    file_path: file_path.to_string(),
                    ..ScopeTree::default()
                }
            }
        }
    }

    pub fn get_deep_dependencies(&self, graph: &SymbolGraph, symbol_id: &str) -> HashSet<String> {
        get_deep_dependencies(graph, symbol_id)
    }

    /// Declaration selections are resolved against the cached graph, which
    /// is built for `root` first if it holds another project
    pub async fn build_context(
        &self,
        selection: &[SelectionItem],
        root: &Path,
        flags: &ContextFlags,
    ) -> Result<String> {
        let needs_graph = selection.iter().any(|item| !item.selects_whole_file());
        let graph = if needs_graph {
            Some(self.index_project(root).await?)
        } else {
            None
        };
        Ok(ContextExtractor::new(graph.as_deref()).build_context(selection, root, flags))
    }

    pub fn tokenize(&self, text: &str) -> Vec<Token> {
        tokenize(text).unwrap_or_else(|e| {
            tracing::warn!("Cannot tokenize text: {}", e);
            Vec::new()
        })
    }

    pub fn compute_token_diff(&self, source: &[Token], target: &[Token]) -> Vec<TokenChange> {
        TokenDiffEngine::new(self.config.diff_cell_budget, self.config.rename_similarity_threshold)
            .diff(source, target)
    }

    pub fn compute_tree_diff(&self, old: &str, new: &str) -> TreeDiff {
        TreeDiffer::new().compare_text(old, new).unwrap_or_else(|e| {
            tracing::warn!("Cannot compare syntax trees: {}", e);
            TreeDiff::default()
        })
    }

    pub fn compute_semantic_diff(&self, old: &str, new: &str) -> Vec<DiffLine> {
        MemberDiffer::new()
            .compute_semantic_diff(old, new)
            .unwrap_or_else(|e| {
                tracing::warn!("Cannot compute semantic diff: {}", e);
                new.lines()
                    .enumerate()
                    .map(|(row, text)| DiffLine {
                        line_number: row + 1,
                        text: text.to_string(),
                        kind: DiffLineKind::Unchanged,
                    })
                    .collect()
            })
    }

    pub async fn patch(&self, fragment: &str, root: &Path) -> Result<Option<ProposedPatch>> {
        let graph = self.index_project(root).await?;
        SnippetPatcher::new(&graph).patch(fragment, root)
    }
}

impl Default for AnalysisEngine {
    fn default() -> Self {
        Self::new(AnalysisConfig::default())
    }
}
