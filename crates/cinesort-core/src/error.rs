use std::path::PathBuf;
use thiserror::Error;

use crate::probe::ProbeError;
use crate::provider::ProviderError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Could not classify '{0}'")]
    ClassificationAmbiguous(String),

    #[error("Metadata provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Metadata provider rate limited: {0}")]
    ProviderRateLimited(String),

    #[error("Technical probe unavailable: {0}")]
    ProbeUnavailable(String),

    #[error("Destination already taken: {}", .0.display())]
    PlacementCollision(PathBuf),

    #[error("Storage corrupt: {0}")]
    StorageCorrupt(String),

    #[error("Run aborted by operator")]
    OperatorAbort,

    #[error("Run cancelled")]
    Cancelled,

    #[error("No metadata cache and no provider available")]
    ResolutionUnavailable,

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error stops the whole batch instead of failing one file.
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            Error::OperatorAbort | Error::Cancelled | Error::ResolutionUnavailable
        )
    }
}

impl From<ProviderError> for Error {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Unavailable(msg) => Error::ProviderUnavailable(msg),
            ProviderError::RateLimited(msg) => Error::ProviderRateLimited(msg),
        }
    }
}

impl From<ProbeError> for Error {
    fn from(err: ProbeError) -> Self {
        match err {
            ProbeError::Unavailable(msg) => Error::ProbeUnavailable(msg),
            ProbeError::Failed(msg) => Error::Other(msg),
        }
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::Other(format!("CSV error: {}", err))
    }
}
