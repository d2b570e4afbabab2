//! Bounded dependency closure over the symbol graph.
//!
//! `Calls` and `Implements` edges are followed transitively. `UsesType`,
//! `Accesses` and `Inherits` targets are recorded as leaves and never expanded,
//! which keeps the closure from pulling in whole type hierarchies.

use std::collections::{HashSet, VecDeque};

use tokio_util::sync::CancellationToken;

use crate::error::{IndexerError, Result};
use crate::index::graph::SymbolGraph;

pub struct DependencyTracker<'a> {
    graph: &'a SymbolGraph,
}

impl<'a> DependencyTracker<'a> {
    pub fn new(graph: &'a SymbolGraph) -> Self {
        Self { graph }
    }

    /// Ids reachable from `start_id`, including `start_id` itself
    pub fn deep_dependencies(&self, start_id: &str) -> HashSet<String> {
        self.walk(start_id, None).unwrap_or_default()
    }

    pub fn deep_dependencies_cancellable(
        &self,
        start_id: &str,
        cancel: &CancellationToken,
    ) -> Result<HashSet<String>> {
        self.walk(start_id, Some(cancel))
    }

    fn walk(&self, start_id: &str, cancel: Option<&CancellationToken>) -> Result<HashSet<String>> {
        let mut visited = HashSet::new();
        if !self.graph.nodes.contains_key(start_id) {
            return Ok(visited);
        }

        let mut queue = VecDeque::new();
        visited.insert(start_id.to_string());
        queue.push_back(start_id.to_string());

        while let Some(current) = queue.pop_front() {
            if cancel.is_some_and(|c| c.is_cancelled()) {
                return Err(IndexerError::Cancelled);
            }

            let Some(node) = self.graph.node(&current) else {
                continue;
            };

            for link in &node.outgoing_links {
                if !visited.insert(link.target_id.clone()) {
                    continue;
                }
                if link.kind.is_deep() {
                    queue.push_back(link.target_id.clone());
                }
            }
        }

        Ok(visited)
    }
}

/// Convenience wrapper over [`DependencyTracker::deep_dependencies`]
pub fn get_deep_dependencies(graph: &SymbolGraph, start_id: &str) -> HashSet<String> {
    DependencyTracker::new(graph).deep_dependencies(start_id)
}

pub fn get_deep_dependencies_cancellable(
    graph: &SymbolGraph,
    start_id: &str,
    cancel: &CancellationToken,
) -> Result<HashSet<String>> {
    DependencyTracker::new(graph).deep_dependencies_cancellable(start_id, cancel)
}
