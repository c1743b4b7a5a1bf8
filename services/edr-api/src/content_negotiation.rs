//! Content negotiation for the `f` query parameter and the Accept header.
//!
//! Data queries answer in GeoJSON only and metadata in JSON. A request that
//! asks for anything else is refused before any work is done: an unknown `f`
//! value is a 400, an Accept header with no acceptable type is a 406.

use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use edr_protocol::{media_types, EdrError, ExceptionResponse};

use crate::handlers::{edr_error_response, exception_response};

/// Media types a data query (position, area) can be answered with.
pub const DATA_QUERY_MEDIA_TYPES: &[&str] = &[media_types::GEO_JSON, media_types::JSON];

/// Media types for metadata (landing page, collections, instances).
pub const METADATA_MEDIA_TYPES: &[&str] = &[media_types::JSON];

/// Check the `f` parameter and Accept header of a data query.
///
/// An empty `f` is treated as absent.
pub fn check_data_query_format(headers: &HeaderMap, f_param: Option<&str>) -> Result<(), Response> {
    match f_param.map(str::trim).filter(|f| !f.is_empty()) {
        Some(f) if is_geojson_alias(f) => Ok(()),
        Some(f) => Err(edr_error_response(EdrError::UnsupportedFormat(format!(
            "'{}'; supported formats: GeoJSON",
            f
        )))),
        None => check_accept_header(headers, DATA_QUERY_MEDIA_TYPES),
    }
}

/// Check the Accept header of a metadata request.
pub fn check_metadata_accept(headers: &HeaderMap) -> Result<(), Response> {
    check_accept_header(headers, METADATA_MEDIA_TYPES)
}

fn is_geojson_alias(f: &str) -> bool {
    matches!(
        f.to_lowercase().as_str(),
        "geojson" | "geo+json" | "json" | "application/geo+json" | "application/json"
    )
}

/// Accept `headers` if any listed media type (ignoring quality values)
/// matches `supported`, directly or through a wildcard.
pub fn check_accept_header(headers: &HeaderMap, supported: &[&str]) -> Result<(), Response> {
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("*/*");

    let requested: Vec<&str> = accept
        .split(',')
        .filter_map(|s| s.split(';').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if requested.is_empty() {
        return Ok(());
    }

    let acceptable = requested.iter().any(|accepted| {
        if *accepted == "*/*" {
            return true;
        }
        match accepted.strip_suffix('*') {
            Some(prefix) if prefix.ends_with('/') => {
                supported.iter().any(|s| s.starts_with(prefix))
            }
            _ => supported.contains(accepted),
        }
    });

    if acceptable {
        Ok(())
    } else {
        Err(not_acceptable_response(&requested, supported))
    }
}

fn not_acceptable_response(requested: &[&str], supported: &[&str]) -> Response {
    let exc = ExceptionResponse::new(
        "http://www.opengis.net/def/exceptions/ogcapi-edr-1/1.0/invalid-parameter-value",
        406,
        format!(
            "Requested media type(s) '{}' not supported. Supported: {}",
            requested.join(", "),
            supported.join(", ")
        ),
    )
    .with_title("Not Acceptable");
    exception_response(StatusCode::NOT_ACCEPTABLE, &exc)
}
