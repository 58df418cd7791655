use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: std::io::Error },

    #[error("malformed reference store {path}: {source}")]
    Malformed { path: PathBuf, source: serde_json::Error },

    #[error("unknown backend '{0}' in reference store")]
    UnknownBackend(String),

    #[error("invalid size class '{0}' in reference store")]
    InvalidSize(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
