//! Analysis settings, loaded from `.code-context.toml`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::context::ContextFlags;
use crate::error::Result;
use crate::indexer::IndexOptions;

pub const CONFIG_FILENAME: &str = ".code-context.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Largest LCS table the token differ will allocate
    pub diff_cell_budget: usize,
    pub rename_similarity_threshold: f64,
    pub include_granular_nodes: bool,
    /// Names treated like standard-library types (no `UsesType` edges)
    pub extra_builtin_types: Vec<String>,
    pub context: ContextFlags,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            diff_cell_budget: 2_000_000,
            rename_similarity_threshold: 0.6,
            include_granular_nodes: false,
            extra_builtin_types: Vec::new(),
            context: ContextFlags::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: AnalysisConfig = toml::from_str(&text)?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Reads `<root>/.code-context.toml` when present, defaults otherwise
    pub fn discover(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILENAME);
        if path.is_file() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn index_options(&self) -> IndexOptions {
        IndexOptions {
            include_granular_nodes: self.include_granular_nodes,
            extra_builtin_types: self.extra_builtin_types.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IndexerError;

    #[test]
    fn test_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = AnalysisConfig::discover(dir.path()).unwrap();
        assert_eq!(config, AnalysisConfig::default());
        assert_eq!(config.diff_cell_budget, 2_000_000);
        assert!(config.context.omit_comments);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILENAME),
            r#"
diff_cell_budget = 500
extra_builtin_types = ["ILogger"]

[context]
omit_namespaces = false
"#,
        )
        .unwrap();

        let config = AnalysisConfig::discover(dir.path()).unwrap();
        assert_eq!(config.diff_cell_budget, 500);
        assert_eq!(config.rename_similarity_threshold, 0.6);
        assert_eq!(config.index_options().extra_builtin_types, vec!["ILogger".to_string()]);
        assert!(!config.context.omit_namespaces);
        assert!(config.context.omit_imports);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILENAME), "diff_cell_budget = \"lots\"").unwrap();
        let err = AnalysisConfig::discover(dir.path()).unwrap_err();
        assert!(matches!(err, IndexerError::Config(_)));
    }
}
