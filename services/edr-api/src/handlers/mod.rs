//! HTTP request handlers for the EDR API.

pub mod admin;
pub mod area;
pub mod collections;
pub mod conformance;
pub mod health;
pub mod instances;
pub mod landing;
pub mod position;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use edr_protocol::{media_types, EdrError, ExceptionResponse};
use serde::Serialize;

/// Serialize `body` as a JSON response with the given content type.
pub fn json_response<T: Serialize>(
    status: StatusCode,
    content_type: &'static str,
    body: &T,
) -> Response {
    match serde_json::to_vec(body) {
        Ok(bytes) => (status, [(header::CONTENT_TYPE, content_type)], bytes).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Metadata documents, cacheable for `max_age` seconds.
pub fn metadata_response<T: Serialize>(body: &T, max_age: u32) -> Response {
    let mut response = json_response(StatusCode::OK, media_types::JSON, body);
    if let Ok(value) = format!("max-age={}", max_age).parse() {
        response.headers_mut().insert(header::CACHE_CONTROL, value);
    }
    response
}

pub fn exception_response(status: StatusCode, exc: &ExceptionResponse) -> Response {
    json_response(status, media_types::JSON, exc)
}

/// Exception document for an [`EdrError`], with the matching status code.
pub fn edr_error_response(err: EdrError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        tracing::error!(error = %err, "Request failed");
    } else {
        tracing::debug!(error = %err, "Request rejected");
    }
    exception_response(status, &err.to_exception())
}
