//! EDR API error types.

use thiserror::Error;

use crate::queries::CoordinateParseError;
use crate::responses::ExceptionResponse;

/// Errors that can occur in EDR API operations.
#[derive(Debug, Error)]
pub enum EdrError {
    /// Collection not found.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    /// Instance not found.
    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    /// Invalid query parameter.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Coordinate parsing error.
    #[error("Coordinate error: {0}")]
    CoordinateError(#[from] CoordinateParseError),

    /// Requested datetime lies outside the available instants.
    #[error("Out of range: {0}")]
    OutOfRange(String),

    /// Response would be too large.
    #[error("Response too large: {0}")]
    ResponseTooLarge(String),

    /// Unsupported output format.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// No data has been ingested yet.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    InternalError(String),

    /// Data access error.
    #[error("Data access error: {0}")]
    DataAccessError(String),
}

impl EdrError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            EdrError::CollectionNotFound(_) => 404,
            EdrError::InstanceNotFound(_) => 404,
            EdrError::InvalidParameter(_) => 400,
            EdrError::CoordinateError(_) => 400,
            EdrError::OutOfRange(_) => 400,
            EdrError::ResponseTooLarge(_) => 413,
            EdrError::UnsupportedFormat(_) => 400,
            EdrError::Unavailable(_) => 503,
            EdrError::InternalError(_) => 500,
            EdrError::DataAccessError(_) => 500,
        }
    }

    /// Convert to an ExceptionResponse.
    pub fn to_exception(&self) -> ExceptionResponse {
        let detail = self.to_string();
        match self.status_code() {
            404 => ExceptionResponse::not_found(detail),
            413 => ExceptionResponse::payload_too_large(detail),
            503 => ExceptionResponse::unavailable(detail),
            500 => ExceptionResponse::internal_error(detail),
            _ => ExceptionResponse::bad_request(detail),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(EdrError::CollectionNotFound("test".to_string()).status_code(), 404);
        assert_eq!(EdrError::InvalidParameter("test".to_string()).status_code(), 400);
        assert_eq!(EdrError::OutOfRange("test".to_string()).status_code(), 400);
        assert_eq!(EdrError::ResponseTooLarge("test".to_string()).status_code(), 413);
        assert_eq!(EdrError::Unavailable("test".to_string()).status_code(), 503);
        assert_eq!(EdrError::InternalError("test".to_string()).status_code(), 500);
    }

    #[test]
    fn test_error_to_exception() {
        let err = EdrError::CollectionNotFound("missing-collection".to_string());
        let exc = err.to_exception();

        assert_eq!(exc.status, Some(404));
        assert!(exc.detail.unwrap().contains("missing-collection"));
    }

    #[test]
    fn test_coordinate_error_conversion() {
        let coord_err = CoordinateParseError::OutOfRange("Longitude out of range".to_string());
        let err: EdrError = coord_err.into();

        assert_eq!(err.status_code(), 400);
        assert_eq!(err.to_exception().status, Some(400));
    }

    #[test]
    fn test_response_too_large_exception() {
        let err = EdrError::ResponseTooLarge("120000 cells (limit: 100000)".to_string());
        let exc = err.to_exception();

        assert_eq!(exc.status, Some(413));
        assert!(exc.type_.contains("response-too-large"));
    }
}
