use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

use crate::error::{IndexerError, Result};
use crate::languages::LanguageRegistry;

pub struct FileWalker {
    registry: LanguageRegistry,
}

impl FileWalker {
    pub fn new(registry: LanguageRegistry) -> Self {
        Self { registry }
    }

    /// Lists supported source files under `root`, sorted by path.
    ///
    /// An unreadable root is the one fatal indexing condition.
    pub fn walk(&self, root: &Path) -> Result<Vec<PathBuf>> {
        std::fs::read_dir(root)
            .map_err(|e| IndexerError::ProjectRoot(format!("{}: {}", root.display(), e)))?;

        let mut files = Vec::new();

        let walker = WalkBuilder::new(root)
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .ignore(true)
            .build();

        for entry in walker.flatten() {
            let path = entry.path();
            if path.is_file() && self.is_supported(path) {
                files.push(path.to_path_buf());
            }
        }

        files.sort();
        Ok(files)
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        self.registry.get_for_file(path).is_some()
    }
}

impl Default for FileWalker {
    fn default() -> Self {
        Self::new(LanguageRegistry::new())
    }
}
