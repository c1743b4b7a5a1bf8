//! Common test fixtures for the wave EDR workspace.
//!
//! Pre-defined grids for the scenarios that matter: a regional grid with
//! north-to-south latitudes and a grid that straddles the antimeridian, plus
//! helpers that publish grids into a registry the way ingestion does.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use grid_processor::{
    compute_extent, ChunkCache, ChunkedStoreWriter, Grid, GridProcessorConfig, StoreAttributes,
};
use storage::{DatasetRegistry, DatasetVersion, Manifest};
use tempfile::TempDir;
use tokio::sync::RwLock;

use crate::generators::{axis, time_steps, wave_grid};

/// Common bounding boxes as (min_lon, min_lat, max_lon, max_lat).
pub mod bbox {
    /// Inside the regional fixture grid
    pub const REGIONAL_INNER: (f64, f64, f64, f64) = (-148.0, 12.0, -146.0, 14.0);

    /// Crosses the antimeridian, inside the Pacific fixture grid
    pub const PACIFIC: (f64, f64, f64, f64) = (178.0, -1.0, -178.0, 1.0);

    /// Far from any fixture grid
    pub const ATLANTIC: (f64, f64, f64, f64) = (-40.0, 30.0, -30.0, 40.0);
}

/// Dataset id used by fixtures.
pub const DATASET_ID: &str = "waves";

/// Forecast reference time of all fixtures (2024-01-15T00:00:00Z).
pub fn reference_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap()
}

/// 4 steps, 3-hourly; latitudes 20..10 (north to south); longitudes -150..-140.
pub fn regional_grid() -> Grid {
    wave_grid(
        time_steps(reference_time(), 4, 3),
        axis(20.0, -1.0, 11),
        axis(-150.0, 1.0, 11),
        &["htsgwsfc", "perpwsfc", "dirpwsfc"],
        &[(0, 0, 0)],
    )
}

/// 2 steps, 6-hourly; latitudes -5..5; longitudes 170..179 and -180..-170.
///
/// The longitude axis is increasing, so the -180 block comes first.
pub fn pacific_grid() -> Grid {
    let mut lons = axis(-180.0, 1.0, 11);
    lons.extend(axis(170.0, 1.0, 10));
    wave_grid(
        time_steps(reference_time(), 2, 6),
        axis(-5.0, 1.0, 11),
        lons,
        &["htsgwsfc"],
        &[],
    )
}

/// Chunking small enough that fixture grids span several chunks.
pub fn small_chunk_config() -> GridProcessorConfig {
    GridProcessorConfig {
        time_chunk: 2,
        lat_chunk: 4,
        lon_chunk: 4,
        ..Default::default()
    }
}

/// A registry in a fresh temporary directory.
///
/// Keep the `TempDir` alive for as long as the registry is used.
pub fn temp_registry() -> (TempDir, Arc<DatasetRegistry>) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let cache = Arc::new(RwLock::new(ChunkCache::new(64 * 1024 * 1024)));
    let registry = DatasetRegistry::new(dir.path().join("data"), cache, 4)
        .expect("Failed to create registry");
    (dir, Arc::new(registry))
}

/// Write, commit and register `grid` as a new version. Does not promote.
pub fn publish_version(
    registry: &DatasetRegistry,
    dataset_id: &str,
    grid: &Grid,
    created_at: DateTime<Utc>,
) -> Arc<DatasetVersion> {
    let version_id = registry.next_version_id(dataset_id, created_at);
    let staging: PathBuf = registry.stage_dir(dataset_id).expect("valid dataset id");

    let writer = ChunkedStoreWriter::new(small_chunk_config());
    let staged = writer
        .write(
            grid,
            &staging,
            &StoreAttributes {
                dataset_id: dataset_id.to_string(),
                title: "Test waves".to_string(),
                reference_time: Some(reference_time()),
            },
        )
        .expect("Failed to write store");

    let variables = grid
        .variables()
        .iter()
        .map(|(name, v)| (name.clone(), v.info.clone()))
        .collect();
    Manifest::from_store(
        dataset_id,
        &version_id,
        compute_extent(grid),
        variables,
        staged.summary(),
    )
    .with_title("Test waves")
    .with_reference_time(Some(reference_time()))
    .write(staged.dir())
    .expect("Failed to write manifest");

    let dir = staged
        .commit(&registry.version_dir(dataset_id, &version_id))
        .expect("Failed to commit");
    let version = DatasetVersion::load(&dir).expect("Failed to load version");
    registry
        .register(dataset_id, version)
        .expect("Failed to register")
}

/// Publish and promote in one step.
pub fn publish_active(
    registry: &DatasetRegistry,
    dataset_id: &str,
    grid: &Grid,
    created_at: DateTime<Utc>,
) -> Arc<DatasetVersion> {
    let version = publish_version(registry, dataset_id, grid, created_at);
    registry
        .promote(dataset_id, version.version_id())
        .expect("Failed to promote")
}

#[cfg(test)]
mod tests {
    use super::*;
    use grid_processor::BoundingBox;

    #[test]
    fn test_fixture_extents() {
        let regional = compute_extent(&regional_grid());
        assert_eq!(regional.bbox, BoundingBox::new(-150.0, 10.0, -140.0, 20.0));
        assert_eq!(regional.temporal.instants.len(), 4);

        let pacific = compute_extent(&pacific_grid());
        assert!(pacific.bbox.crosses_antimeridian());
        assert_eq!((pacific.bbox.min_lon, pacific.bbox.max_lon), (170.0, -170.0));
    }

    #[test]
    fn test_publish_version_registers() {
        let (_dir, registry) = temp_registry();
        let version = publish_active(&registry, DATASET_ID, &regional_grid(), reference_time());

        assert_eq!(registry.datasets(), vec![DATASET_ID.to_string()]);
        assert_eq!(
            registry.get_active(DATASET_ID).unwrap().version_id(),
            version.version_id()
        );
        assert!(version.store_path().exists());
    }
}
