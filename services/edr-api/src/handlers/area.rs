//! Area query handler.

use axum::{
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::Response,
};
use edr_protocol::{media_types, EdrError};
use serde::Deserialize;
use std::sync::Arc;

use super::{edr_error_response, json_response};
use crate::content_negotiation::check_data_query_format;
use crate::engine::{render, AreaRequest, QueryError};
use crate::state::AppState;

/// Query parameters for area endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct AreaQueryParams {
    /// WKT POLYGON or `minLon,minLat,maxLon,maxLat`. Required parameter.
    pub coords: Option<String>,

    /// Alternative to `coords` for a plain bbox.
    pub bbox: Option<String>,

    /// Datetime instant, list or interval.
    pub datetime: Option<String>,

    /// Parameter name(s) to retrieve.
    #[serde(rename = "parameter-name")]
    pub parameter_name: Option<String>,

    /// Output format.
    pub f: Option<String>,
}

impl AreaQueryParams {
    fn parse(&self) -> Result<AreaRequest, EdrError> {
        let coords = [self.coords.as_deref(), self.bbox.as_deref()]
            .into_iter()
            .flatten()
            .find(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                EdrError::InvalidParameter("Missing required parameter: coords".to_string())
            })?;
        AreaRequest::parse(
            coords,
            self.datetime.as_deref(),
            self.parameter_name.as_deref(),
        )
        .map_err(|e| EdrError::from(QueryError::from(e)))
    }
}

/// GET /edr/collections/:collection_id/area
pub async fn area_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(collection_id): Path<String>,
    Query(params): Query<AreaQueryParams>,
    headers: HeaderMap,
) -> Response {
    area_query(state, collection_id, None, params, headers).await
}

/// GET /edr/collections/:collection_id/instances/:instance_id/area
pub async fn instance_area_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path((collection_id, instance_id)): Path<(String, String)>,
    Query(params): Query<AreaQueryParams>,
    headers: HeaderMap,
) -> Response {
    area_query(state, collection_id, Some(instance_id), params, headers).await
}

async fn area_query(
    state: Arc<AppState>,
    collection_id: String,
    instance_id: Option<String>,
    params: AreaQueryParams,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = check_data_query_format(&headers, params.f.as_deref()) {
        return response;
    }

    let request = match params.parse() {
        Ok(request) => request,
        Err(e) => return edr_error_response(e),
    };

    let result = match &instance_id {
        Some(version_id) => {
            state
                .engine
                .area_at(&collection_id, version_id, &request)
                .await
        }
        None => state.engine.area(&collection_id, &request).await,
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

#[cfg(test)]
mod tests {
    use super::*;
    use edr_protocol::AreaGeometry;

    #[test]
    fn test_params_accept_bbox_alias() {
        let params = AreaQueryParams {
            bbox: Some("-148,12,-146,14".to_string()),
            ..Default::default()
        };
        let request = params.parse().unwrap();
        assert!(matches!(request.geometry, AreaGeometry::Bbox(_)));
    }

    #[test]
    fn test_params_errors() {
        assert!(matches!(
            AreaQueryParams::default().parse(),
            Err(EdrError::InvalidParameter(_))
        ));

        let params = AreaQueryParams {
            coords: Some("-148,14,-146,12".to_string()),
            ..Default::default()
        };
        assert_eq!(params.parse().unwrap_err().status_code(), 400);
    }
}
