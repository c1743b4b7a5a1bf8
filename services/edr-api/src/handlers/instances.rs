//! Instance handlers: one instance per retained dataset version.

use axum::{
    extract::{Extension, Path},
    http::HeaderMap,
    response::Response,
};
use edr_protocol::{EdrError, InstanceList};
use std::sync::Arc;

use super::{edr_error_response, metadata_response};
use crate::content_negotiation::check_metadata_accept;
use crate::engine::render;
use crate::state::AppState;

/// GET /edr/collections/:collection_id/instances
pub async fn list_instances_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(collection_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = check_metadata_accept(&headers) {
        return response;
    }

    let listings = match state.engine.versions(&collection_id) {
        Ok(listings) => listings,
        Err(e) => return edr_error_response(EdrError::from(e)),
    };

    // Newest first
    let instances = listings
        .iter()
        .rev()
        .map(|listing| render::instance(listing, &state.base_url))
        .collect();
    metadata_response(
        &InstanceList::new(instances, &state.base_url, &collection_id),
        30,
    )
}

/// GET /edr/collections/:collection_id/instances/:instance_id
pub async fn get_instance_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path((collection_id, instance_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = check_metadata_accept(&headers) {
        return response;
    }

    match state.engine.version(&collection_id, &instance_id) {
        Ok(listing) => metadata_response(&render::instance(&listing, &state.base_url), 30),
        Err(e) => edr_error_response(EdrError::from(e)),
    }
}
