//! Query engine errors.

use edr_protocol::{CoordinateParseError, EdrError};
use grid_processor::GridProcessorError;
use storage::RegistryError;
use thiserror::Error;

/// Errors a query can fail with. None of them touch registry state.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Unknown dataset, or a dataset without an active version.
    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    /// Unknown or pruned version of a known dataset.
    #[error("instance not found: {0}")]
    InstanceNotFound(String),

    #[error("invalid coordinates: {0}")]
    InvalidCoordinates(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Requested datetime outside the temporal extent.
    #[error("out of range: {0}")]
    OutOfRange(String),

    #[error("query too large: {cells} values requested, limit is {limit}")]
    QueryTooLarge { cells: usize, limit: usize },

    #[error("storage error: {0}")]
    Storage(String),
}

impl QueryError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CollectionNotFound(_) => "collection_not_found",
            Self::InstanceNotFound(_) => "instance_not_found",
            Self::InvalidCoordinates(_) => "invalid_coordinates",
            Self::InvalidParameter(_) => "invalid_parameter",
            Self::OutOfRange(_) => "out_of_range",
            Self::QueryTooLarge { .. } => "query_too_large",
            Self::Storage(_) => "storage",
        }
    }
}

impl From<CoordinateParseError> for QueryError {
    fn from(err: CoordinateParseError) -> Self {
        match err {
            CoordinateParseError::InvalidDateTime(_) => Self::InvalidParameter(err.to_string()),
            _ => Self::InvalidCoordinates(err.to_string()),
        }
    }
}

impl From<GridProcessorError> for QueryError {
    fn from(err: GridProcessorError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<RegistryError> for QueryError {
    fn from(err: RegistryError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<QueryError> for EdrError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::CollectionNotFound(id) => EdrError::CollectionNotFound(id),
            QueryError::InstanceNotFound(id) => EdrError::InstanceNotFound(id),
            QueryError::InvalidCoordinates(msg) => {
                EdrError::InvalidParameter(format!("invalid coordinates: {}", msg))
            }
            QueryError::InvalidParameter(msg) => EdrError::InvalidParameter(msg),
            QueryError::OutOfRange(msg) => EdrError::OutOfRange(msg),
            e @ QueryError::QueryTooLarge { .. } => EdrError::ResponseTooLarge(e.to_string()),
            QueryError::Storage(msg) => EdrError::DataAccessError(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (QueryError::CollectionNotFound("x".into()), 404),
            (QueryError::InstanceNotFound("x".into()), 404),
            (QueryError::InvalidCoordinates("x".into()), 400),
            (QueryError::InvalidParameter("x".into()), 400),
            (QueryError::OutOfRange("x".into()), 400),
            (QueryError::QueryTooLarge { cells: 2, limit: 1 }, 413),
            (QueryError::Storage("x".into()), 500),
        ];
        for (err, status) in cases {
            let kind = err.kind();
            assert_eq!(EdrError::from(err).status_code(), status, "{kind}");
        }
    }

    #[test]
    fn test_datetime_parse_errors_are_parameter_errors() {
        let err: QueryError = CoordinateParseError::InvalidDateTime("soon".into()).into();
        assert!(matches!(err, QueryError::InvalidParameter(_)));

        let err: QueryError = CoordinateParseError::OutOfRange("lat 95".into()).into();
        assert!(matches!(err, QueryError::InvalidCoordinates(_)));
    }
}
