//! Registry error types.

use thiserror::Error;

/// Errors that can occur in registry operations.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Unknown dataset, or unknown / pruned version.
    #[error("not found: {0}")]
    NotFound(String),

    /// A version with the same id is already registered.
    #[error("version already exists: {dataset}/{version}")]
    AlreadyExists { dataset: String, version: String },

    /// The version directory is incomplete or inconsistent.
    #[error("invalid version: {0}")]
    InvalidVersion(String),

    /// Dataset or version id that cannot be used as a path component.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Manifest could not be read or written.
    #[error("manifest error: {0}")]
    Manifest(String),

    /// The store behind a version could not be opened.
    #[error("store error: {0}")]
    Store(#[from] grid_processor::GridProcessorError),
}

impl RegistryError {
    /// Create a NotFound error for a dataset.
    pub fn dataset_not_found(dataset: &str) -> Self {
        Self::NotFound(format!("dataset '{}'", dataset))
    }

    /// Create a NotFound error for a version.
    pub fn version_not_found(dataset: &str, version: &str) -> Self {
        Self::NotFound(format!("version '{}' of dataset '{}'", version, dataset))
    }

    /// Create an InvalidVersion error.
    pub fn invalid_version(msg: impl Into<String>) -> Self {
        Self::InvalidVersion(msg.into())
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Manifest(err.to_string())
    }
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
