//! Error types for the ingestion crate.

use std::time::Duration;

use thiserror::Error;

use crate::source::FetchError;

/// Errors that can occur during ingestion.
///
/// None of these leave a partially written version visible: the active
/// version of a dataset only changes after a successful promote.
#[derive(Error, Debug)]
pub enum IngestionError {
    /// The raw grid cannot be turned into a canonical one.
    #[error("Malformed grid: {0}")]
    MalformedGrid(String),

    /// None of the requested variables is present in the raw grid.
    #[error("Missing variable: none of [{}] present", .0.join(", "))]
    MissingVariable(Vec<String>),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Failed to write store: {0}")]
    Write(#[from] grid_processor::GridProcessorError),

    #[error("Registry error: {0}")]
    Registry(#[from] storage::RegistryError),

    /// The run did not finish before its deadline.
    #[error("Ingestion timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A blocking worker panicked or was cancelled.
    #[error("Worker failed: {0}")]
    Worker(String),
}

impl IngestionError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedGrid(msg.into())
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedGrid(_) => "malformed_grid",
            Self::MissingVariable(_) => "missing_variable",
            Self::Fetch(_) => "fetch",
            Self::Write(_) => "write",
            Self::Registry(_) => "registry",
            Self::Timeout(_) => "timeout",
            Self::InvalidConfig(_) => "config",
            Self::Worker(_) => "worker",
        }
    }
}

impl From<tokio::task::JoinError> for IngestionError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Worker(err.to_string())
    }
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestionError>;
