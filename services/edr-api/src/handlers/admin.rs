//! Admin endpoints: dataset listing, reload, promote and prune.

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Response,
};
use chrono::{DateTime, Utc};
use edr_protocol::{media_types, EdrError};
use ingestion::IngestionError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storage::{RegistryError, VersionListing};
use tracing::{info, warn};

use super::{edr_error_response, json_response};
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct DatasetsResponse {
    pub datasets: Vec<DatasetSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub dataset_id: String,
    pub active_version: Option<String>,
    /// Oldest first.
    pub versions: Vec<VersionSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VersionSummary {
    pub version_id: String,
    pub active: bool,
    /// Queries currently reading this version.
    pub in_flight: usize,
    pub created_at: DateTime<Utc>,
    pub reference_time: Option<DateTime<Utc>>,
    pub bytes: u64,
}

impl From<&VersionListing> for VersionSummary {
    fn from(listing: &VersionListing) -> Self {
        let manifest = listing.version.manifest();
        Self {
            version_id: manifest.version_id.clone(),
            active: listing.active,
            in_flight: listing.in_flight,
            created_at: manifest.created_at,
            reference_time: manifest.reference_time,
            bytes: manifest.bytes,
        }
    }
}

/// Which dataset an admin operation applies to.
#[derive(Debug, Default, Deserialize)]
pub struct DatasetParams {
    /// Defaults to the dataset the service ingests.
    pub dataset: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PruneParams {
    pub dataset: Option<String>,
    /// Versions to keep, including the active one.
    pub keep: Option<usize>,
}

/// GET /admin/datasets
pub async fn list_datasets_handler(Extension(state): Extension<Arc<AppState>>) -> Response {
    let datasets = state
        .registry
        .datasets()
        .into_iter()
        .filter_map(|dataset_id| {
            let listings = state.registry.list(&dataset_id).ok()?;
            let active_version = listings
                .iter()
                .find(|l| l.active)
                .map(|l| l.version.version_id().to_string());
            Some(DatasetSummary {
                dataset_id,
                active_version,
                versions: listings.iter().map(VersionSummary::from).collect(),
            })
        })
        .collect();

    json_response(
        StatusCode::OK,
        media_types::JSON,
        &DatasetsResponse { datasets },
    )
}

/// POST /admin/reload
///
/// Runs the ingestion pipeline to completion and reports the outcome.
pub async fn reload_handler(Extension(state): Extension<Arc<AppState>>) -> Response {
    let Some(pipeline) = state.pipeline.as_ref() else {
        return edr_error_response(EdrError::Unavailable(
            "no forecast source configured".to_string(),
        ));
    };

    info!(dataset = %pipeline.dataset_id(), "Reload requested");
    match pipeline.reload_latest().await {
        Ok(outcome) => json_response(StatusCode::OK, media_types::JSON, &outcome),
        Err(e) => {
            warn!(dataset = %pipeline.dataset_id(), error = %e, "Requested reload failed");
            edr_error_response(reload_error(e))
        }
    }
}

fn reload_error(err: IngestionError) -> EdrError {
    match err {
        IngestionError::Fetch(e) if e.is_transient() => EdrError::Unavailable(e.to_string()),
        IngestionError::Timeout(_) => EdrError::Unavailable(err.to_string()),
        IngestionError::MalformedGrid(_) | IngestionError::MissingVariable(_) => {
            EdrError::DataAccessError(err.to_string())
        }
        other => EdrError::InternalError(other.to_string()),
    }
}

/// POST /admin/promote/:version_id
pub async fn promote_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(version_id): Path<String>,
    Query(params): Query<DatasetParams>,
) -> Response {
    let dataset_id = params.dataset.unwrap_or_else(|| state.default_dataset.clone());

    if !state.registry.datasets().contains(&dataset_id) {
        return edr_error_response(EdrError::CollectionNotFound(dataset_id));
    }
    match state.registry.promote(&dataset_id, &version_id) {
        Ok(version) => {
            let listing = VersionListing {
                version,
                active: true,
                in_flight: 0,
            };
            json_response(
                StatusCode::OK,
                media_types::JSON,
                &VersionSummary::from(&listing),
            )
        }
        Err(RegistryError::NotFound(_)) => {
            edr_error_response(EdrError::InstanceNotFound(version_id))
        }
        Err(e) => edr_error_response(EdrError::InternalError(e.to_string())),
    }
}

/// POST /admin/prune?keep=N&dataset=id
pub async fn prune_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<PruneParams>,
) -> Response {
    let dataset_id = params
        .dataset
        .unwrap_or_else(|| state.default_dataset.clone());
    let keep = params.keep.unwrap_or(state.keep_versions);

    match state.registry.prune(&dataset_id, keep) {
        Ok(report) => {
            metrics::counter!("registry_versions_pruned_total")
                .increment((report.removed.len() + report.deferred.len()) as u64);
            json_response(StatusCode::OK, media_types::JSON, &report)
        }
        Err(RegistryError::NotFound(_)) | Err(RegistryError::InvalidId(_)) => {
            edr_error_response(EdrError::CollectionNotFound(dataset_id))
        }
        Err(e) => edr_error_response(EdrError::InternalError(e.to_string())),
    }
}
