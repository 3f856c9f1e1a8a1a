use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the SDK.
#[derive(Debug, Error)]
pub enum SdkError {
    #[error("repository error: {0}")]
    Repository(#[from] dcr_types::RepositoryError),

    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type SdkResult<T> = Result<T, SdkError>;
