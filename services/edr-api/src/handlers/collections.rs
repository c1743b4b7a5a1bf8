//! Collection metadata handlers.
//!
//! Each dataset id with an active version is one collection. Its metadata
//! (extent, parameters, instants) comes from the active version's manifest.

use axum::{
    extract::{Extension, Path},
    http::HeaderMap,
    response::Response,
};
use edr_protocol::{CollectionList, EdrError};
use std::sync::Arc;

use super::{edr_error_response, metadata_response};
use crate::content_negotiation::check_metadata_accept;
use crate::engine::render;
use crate::state::AppState;

/// GET /edr/collections
pub async fn list_collections_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = check_metadata_accept(&headers) {
        return response;
    }

    let collections = state
        .engine
        .collections()
        .iter()
        .map(|version| render::collection(version, &state.base_url))
        .collect();
    metadata_response(&CollectionList::new(collections, &state.base_url), 60)
}

/// GET /edr/collections/:collection_id
pub async fn get_collection_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(collection_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = check_metadata_accept(&headers) {
        return response;
    }

    match state.engine.collection(&collection_id) {
        Ok(version) => metadata_response(&render::collection(&version, &state.base_url), 60),
        Err(e) => edr_error_response(EdrError::from(e)),
    }
}
