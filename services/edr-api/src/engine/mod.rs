//! Query engine: position, area and instance queries against the registry.
//!
//! Every query follows the same steps:
//!
//! 1. Pin a version (the active one unless a specific instance is asked for);
//!    an unknown dataset is `CollectionNotFound`.
//! 2. Check the geometry against the version's coverage; a geometry entirely
//!    outside yields an empty result.
//! 3. Map coordinates to the nearest grid index per axis.
//! 4. Resolve the datetime filter against the time axis.
//! 5. Read the cells and tag each value `exact` or `nearest`.
//!
//! The pinned [`VersionHandle`] lives until the query future completes or is
//! dropped, so a concurrent promote or prune never changes what a running
//! query reads.

mod error;
pub mod render;
mod resolve;

pub use error::QueryError;
pub use resolve::{
    default_time_tolerance, format_instant, nearest_index, nearest_lon_index, CellMatch,
    TimeMatch,
};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use edr_protocol::{AreaGeometry, CoordinateParseError, DateTimeQuery, PositionQuery};
use grid_processor::{GridReader, VariableInfo};
use serde::Serialize;
use storage::{DatasetRegistry, DatasetVersion, RegistryError, VersionHandle, VersionListing};
use tracing::debug;

use crate::config::LimitsConfig;

/// Result type for queries.
pub type Result<T> = std::result::Result<T, QueryError>;

/// How a value relates to the requested coordinate and instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// The request named the cell center and time step exactly.
    Exact,
    /// The request was snapped to the nearest cell or time step.
    Nearest,
    /// Reserved. Values are never interpolated.
    Interpolated,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Nearest => "nearest",
            Self::Interpolated => "interpolated",
        }
    }
}

/// One value per requested variable at one cell and instant.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    /// Cell center.
    pub lon: f64,
    pub lat: f64,
    pub time: DateTime<Utc>,
    /// `None` where the store holds no data.
    pub values: BTreeMap<String, Option<f32>>,
    pub resolution: Resolution,
}

/// Features of one query, with the metadata of the variables they carry.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub dataset_id: String,
    pub version_id: String,
    pub parameters: BTreeMap<String, VariableInfo>,
    pub features: Vec<Feature>,
}

impl QueryResult {
    fn empty(version: &DatasetVersion, parameters: BTreeMap<String, VariableInfo>) -> Self {
        Self {
            dataset_id: version.dataset_id().to_string(),
            version_id: version.version_id().to_string(),
            parameters,
            features: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Parsed area request: a bbox or polygon plus the common filters.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaRequest {
    pub geometry: AreaGeometry,
    pub datetime: Option<DateTimeQuery>,
    pub parameter_names: Option<Vec<String>>,
}

impl AreaRequest {
    /// Build an area request from raw query-string values.
    ///
    /// `coords` is either `minLon,minLat,maxLon,maxLat` or a WKT `POLYGON`.
    pub fn parse(
        coords: &str,
        datetime: Option<&str>,
        parameter_name: Option<&str>,
    ) -> std::result::Result<Self, CoordinateParseError> {
        let geometry = AreaGeometry::parse(coords)?;
        let datetime = datetime
            .filter(|d| !d.trim().is_empty())
            .map(DateTimeQuery::parse)
            .transpose()?;
        let parameter_names = parameter_name
            .map(PositionQuery::parse_parameter_names)
            .filter(|names| !names.is_empty());
        Ok(Self {
            geometry,
            datetime,
            parameter_names,
        })
    }
}

/// Which version a query reads.
#[derive(Debug, Clone, Copy)]
enum Target<'a> {
    Active,
    Version(&'a str),
}

/// Resolves queries against the versions held by a [`DatasetRegistry`].
pub struct QueryEngine {
    registry: Arc<DatasetRegistry>,
    limits: LimitsConfig,
}

impl QueryEngine {
    pub fn new(registry: Arc<DatasetRegistry>, limits: LimitsConfig) -> Self {
        Self { registry, limits }
    }

    pub fn registry(&self) -> &Arc<DatasetRegistry> {
        &self.registry
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }

    /// Values at one point of the active version.
    pub async fn position(&self, dataset_id: &str, query: &PositionQuery) -> Result<QueryResult> {
        self.observed("position", self.run_position(dataset_id, Target::Active, query))
            .await
    }

    /// Values at one point of a specific retained version.
    pub async fn position_at(
        &self,
        dataset_id: &str,
        version_id: &str,
        query: &PositionQuery,
    ) -> Result<QueryResult> {
        self.observed(
            "position",
            self.run_position(dataset_id, Target::Version(version_id), query),
        )
        .await
    }

    /// Values of every cell inside a bbox or polygon of the active version.
    pub async fn area(&self, dataset_id: &str, request: &AreaRequest) -> Result<QueryResult> {
        self.observed("area", self.run_area(dataset_id, Target::Active, request))
            .await
    }

    /// Area query against a specific retained version.
    pub async fn area_at(
        &self,
        dataset_id: &str,
        version_id: &str,
        request: &AreaRequest,
    ) -> Result<QueryResult> {
        self.observed(
            "area",
            self.run_area(dataset_id, Target::Version(version_id), request),
        )
        .await
    }

    /// Instants available in the active version.
    pub fn instances(&self, dataset_id: &str) -> Result<Vec<DateTime<Utc>>> {
        let version = self.active(dataset_id)?;
        Ok(version.extent().temporal.instants.clone())
    }

    /// Active version of a dataset, for discovery metadata.
    pub fn collection(&self, dataset_id: &str) -> Result<Arc<DatasetVersion>> {
        self.active(dataset_id)
    }

    /// Active versions of every dataset that has one.
    pub fn collections(&self) -> Vec<Arc<DatasetVersion>> {
        self.registry
            .datasets()
            .iter()
            .filter_map(|id| self.registry.get_active(id).ok())
            .collect()
    }

    /// Retained versions of a dataset, oldest first.
    pub fn versions(&self, dataset_id: &str) -> Result<Vec<VersionListing>> {
        self.registry
            .list(dataset_id)
            .map_err(|e| not_found_as(e, || QueryError::CollectionNotFound(dataset_id.to_string())))
    }

    /// One retained version of a dataset.
    pub fn version(&self, dataset_id: &str, version_id: &str) -> Result<VersionListing> {
        self.versions(dataset_id)?
            .into_iter()
            .find(|listing| listing.version.version_id() == version_id)
            .ok_or_else(|| QueryError::InstanceNotFound(version_id.to_string()))
    }

    fn active(&self, dataset_id: &str) -> Result<Arc<DatasetVersion>> {
        self.registry
            .get_active(dataset_id)
            .map_err(|e| not_found_as(e, || QueryError::CollectionNotFound(dataset_id.to_string())))
    }

    fn acquire(&self, dataset_id: &str, target: Target<'_>) -> Result<VersionHandle> {
        let collection_not_found = || QueryError::CollectionNotFound(dataset_id.to_string());
        match target {
            Target::Active => self
                .registry
                .acquire(dataset_id)
                .map_err(|e| not_found_as(e, collection_not_found)),
            Target::Version(version_id) => {
                if !self.registry.datasets().iter().any(|id| id == dataset_id) {
                    return Err(collection_not_found());
                }
                self.registry
                    .acquire_version(dataset_id, version_id)
                    .map_err(|e| {
                        not_found_as(e, || QueryError::InstanceNotFound(version_id.to_string()))
                    })
            }
        }
    }

    async fn run_position(
        &self,
        dataset_id: &str,
        target: Target<'_>,
        query: &PositionQuery,
    ) -> Result<QueryResult> {
        let handle = self.acquire(dataset_id, target)?;
        let reader = handle.reader().await?;
        let axes = reader.axes();
        let parameters = select_variables(reader.variables(), query.parameter_names.as_deref())?;
        let mut result = QueryResult::empty(&handle, parameters);

        let Some(cell) = resolve::locate_point(axes, query.lon, query.lat) else {
            debug!(
                dataset = %dataset_id,
                lon = query.lon,
                lat = query.lat,
                "Point outside coverage"
            );
            return Ok(result);
        };

        let tolerance = self.limits.time_tolerance(&axes.times);
        let times = resolve::select_times(&axes.times, query.datetime.as_ref(), tolerance)?;

        result.features = extract(reader.as_ref(), &[cell], &times, &result.parameters).await?;
        Ok(result)
    }

    async fn run_area(
        &self,
        dataset_id: &str,
        target: Target<'_>,
        request: &AreaRequest,
    ) -> Result<QueryResult> {
        let handle = self.acquire(dataset_id, target)?;
        let reader = handle.reader().await?;
        let axes = reader.axes();
        let parameters = select_variables(reader.variables(), request.parameter_names.as_deref())?;
        let mut result = QueryResult::empty(&handle, parameters);

        let query_box = resolve::envelope_box(&request.geometry);
        if !resolve::touches_extent(axes, &handle.extent().bbox, &query_box) {
            debug!(dataset = %dataset_id, bbox = ?query_box, "Area outside coverage");
            return Ok(result);
        }

        let tolerance = self.limits.time_tolerance(&axes.times);
        let times = resolve::select_times(&axes.times, request.datetime.as_ref(), tolerance)?;

        let span = resolve::area_span(axes, &request.geometry);
        let matched = span.count();
        let requested = matched.max(1).saturating_mul(times.len());
        if requested > self.limits.max_cells {
            return Err(QueryError::QueryTooLarge {
                cells: requested,
                limit: self.limits.max_cells,
            });
        }

        let cells = if matched == 0 {
            // Smaller than a cell: answer with the cell nearest its center
            let (lon, lat) = resolve::box_center(&query_box);
            let mut cell = resolve::nearest_cell(axes, lon, lat);
            cell.exact = false;
            vec![cell]
        } else {
            span.cells()
        };

        result.features = extract(reader.as_ref(), &cells, &times, &result.parameters).await?;
        Ok(result)
    }

    async fn observed<F>(&self, kind: &'static str, query: F) -> Result<QueryResult>
    where
        F: std::future::Future<Output = Result<QueryResult>>,
    {
        let started = Instant::now();
        let result = query.await;
        let outcome = match &result {
            Ok(r) if r.is_empty() => "empty",
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        metrics::counter!("edr_queries_total", "query" => kind, "outcome" => outcome).increment(1);
        metrics::histogram!("edr_query_duration_seconds", "query" => kind)
            .record(started.elapsed().as_secs_f64());
        result
    }
}

/// Map registry "not found" style errors to a query error, keeping the rest
/// as storage failures.
fn not_found_as(err: RegistryError, not_found: impl FnOnce() -> QueryError) -> QueryError {
    match err {
        RegistryError::NotFound(_) | RegistryError::InvalidId(_) => not_found(),
        other => other.into(),
    }
}

/// Requested variables (all when `None`), matched case-insensitively.
fn select_variables(
    available: &BTreeMap<String, VariableInfo>,
    requested: Option<&[String]>,
) -> Result<BTreeMap<String, VariableInfo>> {
    let Some(requested) = requested else {
        return Ok(available.clone());
    };

    let mut selected = BTreeMap::new();
    for name in requested {
        let Some((key, info)) = available
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
        else {
            let known: Vec<&str> = available.keys().map(String::as_str).collect();
            return Err(QueryError::InvalidParameter(format!(
                "unknown parameter '{}'; available: {}",
                name,
                known.join(", ")
            )));
        };
        selected.insert(key.clone(), info.clone());
    }
    Ok(selected)
}

/// Read every (time, cell) pair, time-major, and assemble features.
async fn extract(
    reader: &dyn GridReader,
    cells: &[CellMatch],
    times: &[TimeMatch],
    parameters: &BTreeMap<String, VariableInfo>,
) -> Result<Vec<Feature>> {
    let axes = reader.axes();
    let mut indices = Vec::with_capacity(cells.len() * times.len());
    for time in times {
        for cell in cells {
            indices.push((time.index, cell.y, cell.x));
        }
    }

    let mut columns = Vec::with_capacity(parameters.len());
    for name in parameters.keys() {
        columns.push((name, reader.read_cells(name, &indices).await?));
    }

    let mut features = Vec::with_capacity(indices.len());
    let mut i = 0;
    for time in times {
        for cell in cells {
            let values = columns
                .iter()
                .map(|(name, data)| {
                    let v = data[i];
                    ((*name).clone(), (!v.is_nan()).then_some(v))
                })
                .collect();
            let resolution = if time.exact && cell.exact {
                Resolution::Exact
            } else {
                Resolution::Nearest
            };
            features.push(Feature {
                lon: axes.longitudes[cell.x],
                lat: axes.latitudes[cell.y],
                time: axes.times[time.index],
                values,
                resolution,
            });
            i += 1;
        }
    }
    Ok(features)
}
