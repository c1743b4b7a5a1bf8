//! Position query handler.

use axum::{
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::Response,
};
use edr_protocol::{media_types, EdrError, PositionQuery};
use serde::Deserialize;
use std::sync::Arc;

use super::{edr_error_response, json_response};
use crate::content_negotiation::check_data_query_format;
use crate::engine::{render, QueryError};
use crate::state::AppState;

/// Query parameters for position endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct PositionQueryParams {
    /// Coordinates as WKT POINT or lon,lat. Required parameter.
    pub coords: Option<String>,

    /// Datetime instant, list or interval.
    pub datetime: Option<String>,

    /// Parameter name(s) to retrieve.
    #[serde(rename = "parameter-name")]
    pub parameter_name: Option<String>,

    /// Output format.
    pub f: Option<String>,
}

impl PositionQueryParams {
    fn parse(&self) -> Result<PositionQuery, EdrError> {
        let coords = match self.coords.as_deref() {
            Some(c) if !c.trim().is_empty() => c,
            _ => {
                return Err(EdrError::InvalidParameter(
                    "Missing required parameter: coords".to_string(),
                ))
            }
        };
        PositionQuery::parse(
            coords,
            self.datetime.as_deref(),
            self.parameter_name.as_deref(),
        )
        .map_err(|e| EdrError::from(QueryError::from(e)))
    }
}

/// GET /edr/collections/:collection_id/position
pub async fn position_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(collection_id): Path<String>,
    Query(params): Query<PositionQueryParams>,
    headers: HeaderMap,
) -> Response {
    position_query(state, collection_id, None, params, headers).await
}

/// GET /edr/collections/:collection_id/instances/:instance_id/position
pub async fn instance_position_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path((collection_id, instance_id)): Path<(String, String)>,
    Query(params): Query<PositionQueryParams>,
    headers: HeaderMap,
) -> Response {
    position_query(state, collection_id, Some(instance_id), params, headers).await
}

async fn position_query(
    state: Arc<AppState>,
    collection_id: String,
    instance_id: Option<String>,
    params: PositionQueryParams,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = check_data_query_format(&headers, params.f.as_deref()) {
        return response;
    }

    let query = match params.parse() {
        Ok(query) => query,
        Err(e) => return edr_error_response(e),
    };

    let result = match &instance_id {
        Some(version_id) => {
            state
                .engine
                .position_at(&collection_id, version_id, &query)
                .await
        }
        None => state.engine.position(&collection_id, &query).await,
    };

    match result {
        Ok(result) => json_response(
            StatusCode::OK,
            media_types::GEO_JSON,
            &render::feature_collection(&result),
        ),
        Err(e) => edr_error_response(e.into()),
    }
}
