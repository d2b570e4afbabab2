use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Language not supported: {0}")]
    UnsupportedLanguage(String),

    #[error("Project root is not readable: {0}")]
    ProjectRoot(String),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, IndexerError>;
