use std::path::PathBuf;

use thiserror::Error;

use crate::timestamp::TimestampKey;

#[derive(Error, Debug)]
pub enum ActivityError {
    #[error("no archive available for timestamp {0}")]
    ArchiveMissing(TimestampKey),

    #[error("invalid timestamp '{0}', expected YYYY-MM-DD-H")]
    InvalidTimestamp(String),

    #[error("artifact not found: {}", .0.display())]
    MissingArtifact(PathBuf),

    #[error("unexpected payload in {}: {reason}", path.display())]
    UnexpectedPayload { path: PathBuf, reason: String },

    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    UrlError(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, ActivityError>;
