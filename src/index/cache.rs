//! Single-slot cache of the most recently built project graph.
//!
//! The slot lock is held for the whole build, so concurrent requests for
//! the same root wait for the in-flight build instead of starting another.
//! Requesting a different root discards the cached graph. Readers of the
//! published graph go through `current` and never wait on a build.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::error::{IndexerError, Result};
use crate::index::graph::SymbolGraph;
use crate::indexer::graph_builder::{GraphBuilder, IndexOptions};
use crate::indexer::progress::IndexingProgress;

#[derive(Default)]
pub struct GraphCache {
    slot: Mutex<Option<(PathBuf, Arc<SymbolGraph>)>>,
    current: RwLock<Option<Arc<SymbolGraph>>>,
    options: IndexOptions,
    progress: IndexingProgress,
}

impl GraphCache {
    pub fn new(options: IndexOptions) -> Self {
        Self {
            slot: Mutex::new(None),
            current: RwLock::new(None),
            options,
            progress: IndexingProgress::new(),
        }
    }

    pub fn progress(&self) -> &IndexingProgress {
        &self.progress
    }

    /// Returns the graph for `root`, building it if the slot holds another root
    pub async fn get_or_build(&self, root: &Path) -> Result<Arc<SymbolGraph>> {
        let mut slot = self.slot.lock().await;
        if let Some((cached_root, graph)) = slot.as_ref() {
            if cached_root == root {
                tracing::debug!("Graph cache hit for {}", root.display());
                return Ok(Arc::clone(graph));
            }
            tracing::info!(
                "Graph cache switching from {} to {}",
                cached_root.display(),
                root.display()
            );
        }
        *slot = None;
        *self.current.write().await = None;

        let builder = GraphBuilder::new(self.options.clone()).with_progress(self.progress.clone());
        let build_root = root.to_path_buf();
        let graph = tokio::task::spawn_blocking(move || builder.index_project(&build_root))
            .await
            .map_err(|e| IndexerError::Index(format!("Index build task failed: {}", e)))??;

        let graph = Arc::new(graph);
        *slot = Some((root.to_path_buf(), Arc::clone(&graph)));
        *self.current.write().await = Some(Arc::clone(&graph));
        Ok(graph)
    }

    /// Last published graph, if any
    pub async fn current(&self) -> Option<Arc<SymbolGraph>> {
        self.current.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn project(class: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("A.cs"),
            format!("namespace App {{ public class {} {{ }} }}", class),
        )
        .unwrap();
        dir
    }

    #[tokio::test]
    async fn test_same_root_is_cached() {
        let dir = project("Alpha");
        let cache = GraphCache::default();
        assert!(cache.current().await.is_none());

        let first = cache.get_or_build(dir.path()).await.unwrap();
        let second = cache.get_or_build(dir.path()).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.node("App.Alpha").is_some());
        assert!(Arc::ptr_eq(&cache.current().await.unwrap(), &first));
    }

    #[tokio::test]
    async fn test_different_root_rebuilds() {
        let a = project("Alpha");
        let b = project("Beta");
        let cache = GraphCache::default();

        cache.get_or_build(a.path()).await.unwrap();
        let graph = cache.get_or_build(b.path()).await.unwrap();
        assert!(graph.node("App.Beta").is_some());
        assert!(graph.node("App.Alpha").is_none());
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_build() {
        let dir = project("Alpha");
        let cache = Arc::new(GraphCache::default());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let root = dir.path().to_path_buf();
                tokio::spawn(async move { cache.get_or_build(&root).await.unwrap() })
            })
            .collect();

        let mut graphs = Vec::new();
        for handle in handles {
            graphs.push(handle.await.unwrap());
        }
        assert!(graphs.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test]
    async fn test_current_does_not_wait_for_build_lock() {
        let dir = project("Alpha");
        let cache = GraphCache::default();
        let graph = cache.get_or_build(dir.path()).await.unwrap();

        let _building = cache.slot.lock().await;
        let current = tokio::time::timeout(std::time::Duration::from_secs(1), cache.current())
            .await
            .expect("current() blocked on the build lock");
        assert!(Arc::ptr_eq(&current.unwrap(), &graph));
    }

    #[tokio::test]
    async fn test_switching_roots_clears_published_graph() {
        let a = project("Alpha");
        let cache = GraphCache::default();
        cache.get_or_build(a.path()).await.unwrap();

        assert!(cache.get_or_build(&a.path().join("missing")).await.is_err());
        assert!(cache.current().await.is_none());
    }

    #[tokio::test]
    async fn test_failed_build_leaves_slot_empty() {
        let dir = TempDir::new().unwrap();
        let cache = GraphCache::default();
        assert!(cache.get_or_build(&dir.path().join("missing")).await.is_err());
        assert!(cache.current().await.is_none());
    }
}
