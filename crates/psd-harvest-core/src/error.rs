use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Extraction failed: {0}")]
    Extract(#[from] ExtractError),

    #[error("State store error: {0}")]
    State(#[from] StateError),

    #[error("Structural error: {0}")]
    Structural(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Fatal errors abort the whole run. Everything else only fails the current file.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::State(_) | Error::Structural(_) | Error::Config(_)
        )
    }
}

/// Failure reported by an [`Extractor`](crate::extract::Extractor).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("corrupt or unreadable document: {0}")]
    Corrupt(String),

    #[error("unsupported document feature: {0}")]
    Unsupported(String),

    #[error("failed to encode image: {0}")]
    Encode(String),
}

#[derive(Error, Debug)]
pub enum StateError {
    #[error("failed to read state file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse state file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to persist state file {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
