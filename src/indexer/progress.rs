use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::Serialize;

/// Shared counters for one indexing pass; cloned handles observe the same pass.
#[derive(Clone, Default)]
pub struct IndexingProgress {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    files_total: AtomicUsize,
    files_parsed: AtomicUsize,
    files_failed: AtomicUsize,
    nodes_emitted: AtomicUsize,
    is_active: AtomicBool,
    started_at: Mutex<Option<Instant>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    pub is_active: bool,
    pub files_total: usize,
    pub files_parsed: usize,
    pub files_failed: usize,
    pub nodes_emitted: usize,
    pub elapsed_ms: u64,
    pub progress_pct: f64,
}

impl IndexingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, total_files: usize) {
        self.inner.files_total.store(total_files, Ordering::Release);
        self.inner.files_parsed.store(0, Ordering::Release);
        self.inner.files_failed.store(0, Ordering::Release);
        self.inner.nodes_emitted.store(0, Ordering::Release);
        self.inner.is_active.store(true, Ordering::Release);
        if let Ok(mut started) = self.inner.started_at.lock() {
            *started = Some(Instant::now());
        }
    }

    pub fn inc_parsed(&self) {
        self.inner.files_parsed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_error(&self) {
        self.inner.files_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_nodes(&self, count: usize) {
        self.inner.nodes_emitted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn finish(&self) {
        self.inner.is_active.store(false, Ordering::Release);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let is_active = self.inner.is_active.load(Ordering::Acquire);
        let files_total = self.inner.files_total.load(Ordering::Acquire);
        let files_parsed = self.inner.files_parsed.load(Ordering::Acquire);
        let files_failed = self.inner.files_failed.load(Ordering::Acquire);
        let nodes_emitted = self.inner.nodes_emitted.load(Ordering::Acquire);

        let elapsed_ms = self
            .inner
            .started_at
            .lock()
            .ok()
            .and_then(|started| started.map(|t| t.elapsed().as_millis() as u64))
            .unwrap_or(0);

        let done = files_parsed + files_failed;
        let progress_pct = if files_total > 0 {
            (done as f64 / files_total as f64) * 100.0
        } else {
            0.0
        };

        ProgressSnapshot {
            is_active,
            files_total,
            files_parsed,
            files_failed,
            nodes_emitted,
            elapsed_ms,
            progress_pct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_counts() {
        let progress = IndexingProgress::new();
        progress.start(4);
        progress.inc_parsed();
        progress.inc_parsed();
        progress.inc_error();
        progress.add_nodes(7);

        let snap = progress.snapshot();
        assert!(snap.is_active);
        assert_eq!(snap.files_total, 4);
        assert_eq!(snap.files_parsed, 2);
        assert_eq!(snap.files_failed, 1);
        assert_eq!(snap.nodes_emitted, 7);
        assert!((snap.progress_pct - 75.0).abs() < f64::EPSILON);

        progress.finish();
        assert!(!progress.snapshot().is_active);
    }

    #[test]
    fn test_progress_clone_shares_state() {
        let progress = IndexingProgress::new();
        let handle = progress.clone();
        progress.start(1);
        handle.inc_parsed();
        assert_eq!(progress.snapshot().files_parsed, 1);
    }

    #[test]
    fn test_empty_progress() {
        let snap = IndexingProgress::new().snapshot();
        assert_eq!(snap.progress_pct, 0.0);
        assert_eq!(snap.elapsed_ms, 0);
    }
}
