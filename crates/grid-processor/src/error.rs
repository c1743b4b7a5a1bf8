//! Error types for grid processing.

use thiserror::Error;

/// Errors that can occur while building, writing or reading grids.
#[derive(Error, Debug)]
pub enum GridProcessorError {
    /// The in-memory grid violates a canonical-grid invariant.
    #[error("invalid grid: {0}")]
    InvalidGrid(String),

    /// Failed to open a chunked store.
    #[error("failed to open store: {0}")]
    OpenFailed(String),

    /// Failed to read data from a store.
    #[error("failed to read grid data: {0}")]
    ReadFailed(String),

    /// Failed to write or durably persist a store.
    #[error("failed to write store: {0}")]
    WriteError(String),

    /// A requested cell index is outside the array shape.
    #[error("cell ({t}, {y}, {x}) is outside grid shape {shape:?}")]
    OutOfBounds {
        t: usize,
        y: usize,
        x: usize,
        shape: (usize, usize, usize),
    },

    /// Variable not present in the store.
    #[error("unknown variable: {0}")]
    UnknownVariable(String),

    /// Invalid metadata in the store.
    #[error("invalid grid metadata: {0}")]
    InvalidMetadata(String),

    /// Zarr format error.
    #[error("Zarr format error: {0}")]
    ZarrError(String),

    /// Storage/IO error.
    #[error("storage error: {0}")]
    StorageError(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl GridProcessorError {
    /// Create an InvalidGrid error.
    pub fn invalid_grid(msg: impl Into<String>) -> Self {
        Self::InvalidGrid(msg.into())
    }

    /// Create an OpenFailed error.
    pub fn open_failed(msg: impl Into<String>) -> Self {
        Self::OpenFailed(msg.into())
    }

    /// Create a ReadFailed error.
    pub fn read_failed(msg: impl Into<String>) -> Self {
        Self::ReadFailed(msg.into())
    }

    /// Create a WriteError.
    pub fn write_error(msg: impl Into<String>) -> Self {
        Self::WriteError(msg.into())
    }

    /// Create an InvalidMetadata error.
    pub fn invalid_metadata(msg: impl Into<String>) -> Self {
        Self::InvalidMetadata(msg.into())
    }

    /// Create a ZarrError.
    pub fn zarr_error(msg: impl Into<String>) -> Self {
        Self::ZarrError(msg.into())
    }
}

impl From<std::io::Error> for GridProcessorError {
    fn from(err: std::io::Error) -> Self {
        Self::StorageError(err.to_string())
    }
}

impl From<serde_json::Error> for GridProcessorError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidMetadata(err.to_string())
    }
}

/// Result type for grid processor operations.
pub type Result<T> = std::result::Result<T, GridProcessorError>;
