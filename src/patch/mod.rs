pub mod inference;
pub mod merge;

use std::path::Path;

use crate::error::Result;
use crate::index::SymbolGraph;

pub use inference::{infer_target, Fragment, Inference, PatchTarget};
pub use merge::{merge_members, PatchStatus, ProposedPatch};

/// Proposes how a free-form fragment changes its owning file. Never writes.
pub struct SnippetPatcher<'g> {
    graph: &'g SymbolGraph,
}

impl<'g> SnippetPatcher<'g> {
    pub fn new(graph: &'g SymbolGraph) -> Self {
        Self { graph }
    }

    /// `None` when no owner can be inferred or the merge changes nothing
    pub fn patch(&self, fragment_text: &str, root: &Path) -> Result<Option<ProposedPatch>> {
        let fragment = Fragment::parse(fragment_text)?;
        let Some(target) = infer_target(&fragment, self.graph) else {
            tracing::debug!("No owner inferred for fragment");
            return Ok(None);
        };

        let path = Path::new(&target.file_path);
        let full_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        };
        let original = match std::fs::read_to_string(&full_path) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Cannot read patch target {}: {}", full_path.display(), e);
                return Ok(None);
            }
        };

        let Some((new_text, status)) = merge_members(&original, &target, &fragment)? else {
            return Ok(None);
        };
        tracing::info!(
            "Proposed patch for {}: {} replaced, {} appended",
            target.file_path,
            status.replaced.len(),
            status.appended.len()
        );
        Ok(Some(ProposedPatch {
            file_path: target.file_path,
            original_text: original,
            new_text,
            status,
        }))
    }
}
