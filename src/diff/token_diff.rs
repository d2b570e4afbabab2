//! Longest-common-subsequence diff over token streams.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::diff::tokens::Token;
use crate::error::{IndexerError, Result};

pub const DEFAULT_CELL_BUDGET: usize = 2_000_000;
pub const DEFAULT_RENAME_THRESHOLD: f64 = 0.6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum TokenChange {
    Unchanged { source: Token, target: Token },
    Inserted { token: Token },
    Removed { token: Token },
    /// Whole-input replacement, emitted when the LCS table would exceed the budget
    Modified {
        source_count: usize,
        target_count: usize,
        too_large: bool,
    },
}

impl TokenChange {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, TokenChange::Unchanged { .. })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TokenDiffEngine {
    cell_budget: usize,
    threshold: f64,
}

impl Default for TokenDiffEngine {
    fn default() -> Self {
        Self::new(DEFAULT_CELL_BUDGET, DEFAULT_RENAME_THRESHOLD)
    }
}

impl TokenDiffEngine {
    pub fn new(cell_budget: usize, threshold: f64) -> Self {
        Self { cell_budget, threshold }
    }

    /// Diff with the default similarity at this engine's rename threshold
    pub fn diff(&self, source: &[Token], target: &[Token]) -> Vec<TokenChange> {
        let threshold = self.threshold;
        self.compute_diff(source, target, |a, b| similar_with_threshold(a, b, threshold))
    }

    pub fn compute_diff<F>(&self, source: &[Token], target: &[Token], similar: F) -> Vec<TokenChange>
    where
        F: Fn(&Token, &Token) -> bool,
    {
        self.run(source, target, &similar, None).unwrap_or_default()
    }

    /// Like [`TokenDiffEngine::compute_diff`], checking `cancel` once per table row
    pub fn compute_diff_cancellable<F>(
        &self,
        source: &[Token],
        target: &[Token],
        similar: F,
        cancel: &CancellationToken,
    ) -> Result<Vec<TokenChange>>
    where
        F: Fn(&Token, &Token) -> bool,
    {
        self.run(source, target, &similar, Some(cancel))
    }

    fn run(
        &self,
        source: &[Token],
        target: &[Token],
        similar: &dyn Fn(&Token, &Token) -> bool,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<TokenChange>> {
        let (n, m) = (source.len(), target.len());
        let cells = (n + 1).saturating_mul(m + 1);
        if cells > self.cell_budget {
            tracing::debug!(
                "Token diff of {}x{} exceeds budget of {} cells",
                n,
                m,
                self.cell_budget
            );
            return Ok(vec![TokenChange::Modified {
                source_count: n,
                target_count: m,
                too_large: true,
            }]);
        }

        // lcs[i * width + j] = LCS length of source[i..] and target[j..]
        let width = m + 1;
        let mut lcs = vec![0u32; cells];
        for i in (0..n).rev() {
            if cancel.is_some_and(|c| c.is_cancelled()) {
                return Err(IndexerError::Cancelled);
            }
            for j in (0..m).rev() {
                lcs[i * width + j] = if similar(&source[i], &target[j]) {
                    lcs[(i + 1) * width + j + 1] + 1
                } else {
                    lcs[(i + 1) * width + j].max(lcs[i * width + j + 1])
                };
            }
        }

        let mut changes = Vec::with_capacity(n.max(m));
        let (mut i, mut j) = (0, 0);
        while i < n && j < m {
            if similar(&source[i], &target[j]) && lcs[i * width + j] == lcs[(i + 1) * width + j + 1] + 1 {
                changes.push(TokenChange::Unchanged {
                    source: source[i].clone(),
                    target: target[j].clone(),
                });
                i += 1;
                j += 1;
            } else if lcs[(i + 1) * width + j] >= lcs[i * width + j + 1] {
                changes.push(TokenChange::Removed { token: source[i].clone() });
                i += 1;
            } else {
                changes.push(TokenChange::Inserted { token: target[j].clone() });
                j += 1;
            }
        }
        changes.extend(source[i..].iter().map(|t| TokenChange::Removed { token: t.clone() }));
        changes.extend(target[j..].iter().map(|t| TokenChange::Inserted { token: t.clone() }));
        Ok(changes)
    }
}

/// Similarity at the default rename threshold
pub fn default_similarity(a: &Token, b: &Token) -> bool {
    similar_with_threshold(a, b, DEFAULT_RENAME_THRESHOLD)
}

/// Same kind, and either identical text or, for renamable kinds, a close
/// spelling or the same binding ordinal
pub fn similar_with_threshold(a: &Token, b: &Token, threshold: f64) -> bool {
    if a.kind != b.kind {
        return false;
    }
    if a.text == b.text {
        return true;
    }
    if !a.kind.is_renamable() {
        return false;
    }
    if a.binding.is_some() && a.binding == b.binding {
        return true;
    }
    strsim::normalized_levenshtein(&a.text, &b.text) > threshold
}
