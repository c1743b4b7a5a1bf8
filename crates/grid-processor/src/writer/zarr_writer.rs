//! Zarr V3 writer for persisting canonical grids as chunked stores.
//!
//! A store is always written into a staging directory first. The returned
//! [`StagedStore`] removes that directory when dropped unless it has been
//! committed, so a failed or cancelled ingestion never leaves a partial
//! store where readers could find it.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zarrs::array::codec::bytes_to_bytes::blosc::{
    BloscCodec, BloscCompressionLevel, BloscCompressor, BloscShuffleMode,
};
use zarrs::array::{Array, ArrayBuilder, DataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::group::GroupBuilder;
use zarrs_filesystem::FilesystemStore;

use crate::config::{GridProcessorConfig, ZarrCompression};
use crate::error::{GridProcessorError, Result};
use crate::types::{Grid, VariableInfo};

/// Directory name of the Zarr store inside a version directory.
pub const STORE_DIR_NAME: &str = "store.zarr";

/// Array names reserved for coordinate axes.
pub const TIME_ARRAY: &str = "time";
pub const LAT_ARRAY: &str = "lat";
pub const LON_ARRAY: &str = "lon";

/// Dataset-level attributes stored on the root group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreAttributes {
    pub dataset_id: String,
    pub title: String,
    pub reference_time: Option<DateTime<Utc>>,
}

/// Summary of a written store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSummary {
    /// Chunk shape as (time, lat, lon).
    pub chunk_shape: [usize; 3],
    /// Compression codec name.
    pub compression: String,
    /// Compression level, 0 when uncompressed.
    pub compression_level: u8,
    /// Bytes on disk after compression.
    pub bytes_written: u64,
    /// Variable arrays in the store.
    pub variables: Vec<String>,
}

/// A fully written store that is not yet visible at its final location.
#[derive(Debug)]
pub struct StagedStore {
    dir: PathBuf,
    summary: StoreSummary,
    synced: bool,
    committed: bool,
}

impl StagedStore {
    /// Staging directory holding the store (and anything the caller adds).
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the Zarr store inside the staging directory.
    pub fn store_path(&self) -> PathBuf {
        self.dir.join(STORE_DIR_NAME)
    }

    pub fn summary(&self) -> &StoreSummary {
        &self.summary
    }

    /// Fsync everything under the staging directory, including files the
    /// caller added after `write`. A later `commit` is then only a rename.
    pub fn sync(&mut self) -> Result<()> {
        sync_tree(&self.dir)?;
        self.synced = true;
        Ok(())
    }

    /// Move the staging directory to `dest` with a single rename.
    ///
    /// `dest` must not exist and must be on the same filesystem. Files added
    /// after the last `sync` are synced first.
    pub fn commit(mut self, dest: &Path) -> Result<PathBuf> {
        if dest.exists() {
            return Err(GridProcessorError::write_error(format!(
                "destination already exists: {}",
                dest.display()
            )));
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                GridProcessorError::write_error(format!("create {}: {}", parent.display(), e))
            })?;
        }

        if !self.synced {
            sync_tree(&self.dir)?;
        }
        fs::rename(&self.dir, dest).map_err(|e| {
            GridProcessorError::write_error(format!(
                "rename {} -> {}: {}",
                self.dir.display(),
                dest.display(),
                e
            ))
        })?;
        if let Some(parent) = dest.parent() {
            sync_dir(parent);
        }

        self.committed = true;
        info!(dest = %dest.display(), "Committed staged store");
        Ok(dest.to_path_buf())
    }
}

impl Drop for StagedStore {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => debug!(dir = %self.dir.display(), "Removed uncommitted staged store"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(dir = %self.dir.display(), error = %e, "Failed to remove staged store"),
        }
    }
}

/// Writer for chunked, compressed Zarr V3 stores.
#[derive(Debug, Clone)]
pub struct ChunkedStoreWriter {
    config: GridProcessorConfig,
}

impl ChunkedStoreWriter {
    /// Create a new writer with the given configuration.
    pub fn new(config: GridProcessorConfig) -> Self {
        Self { config }
    }

    /// Write `grid` into `staging_dir`, which must not exist yet.
    ///
    /// The store lands at `staging_dir/store.zarr`. Every file is flushed to
    /// disk before this returns.
    pub fn write(
        &self,
        grid: &Grid,
        staging_dir: &Path,
        attributes: &StoreAttributes,
    ) -> Result<StagedStore> {
        if staging_dir.exists() {
            return Err(GridProcessorError::write_error(format!(
                "staging directory already exists: {}",
                staging_dir.display()
            )));
        }
        fs::create_dir_all(staging_dir).map_err(|e| {
            GridProcessorError::write_error(format!("create {}: {}", staging_dir.display(), e))
        })?;

        // From here on the guard cleans up on any early return
        let mut staged = StagedStore {
            dir: staging_dir.to_path_buf(),
            summary: StoreSummary {
                chunk_shape: [0; 3],
                compression: self.config.zarr_compression.as_str().to_string(),
                compression_level: self.compression_level(),
                bytes_written: 0,
                variables: grid.variables().keys().cloned().collect(),
            },
            synced: false,
            committed: false,
        };

        let store_path = staged.store_path();
        fs::create_dir_all(&store_path)?;
        let store = Arc::new(
            FilesystemStore::new(&store_path)
                .map_err(|e| GridProcessorError::write_error(e.to_string()))?,
        );

        let (nt, ny, nx) = grid.shape();
        let chunk_shape = self.config.chunk_shape(nt, ny, nx);
        staged.summary.chunk_shape = chunk_shape;

        self.write_root_group(&store, grid, attributes)?;
        self.write_coordinates(&store, grid)?;

        for (name, variable) in grid.variables() {
            let array = self.build_variable_array(&store, name, &variable.info, grid, chunk_shape)?;
            let subset = ArraySubset::new_with_start_shape(
                vec![0, 0, 0],
                vec![nt as u64, ny as u64, nx as u64],
            )
            .map_err(|e| GridProcessorError::write_error(e.to_string()))?;
            array
                .store_array_subset_elements(&subset, &variable.data)
                .map_err(|e| {
                    GridProcessorError::write_error(format!("variable '{}': {}", name, e))
                })?;
            debug!(variable = %name, shape = ?(nt, ny, nx), "Wrote variable array");
        }

        staged.summary.bytes_written = sync_tree(&store_path)?;

        info!(
            dataset = %attributes.dataset_id,
            dir = %staging_dir.display(),
            variables = staged.summary.variables.len(),
            chunk_shape = ?chunk_shape,
            compression = %staged.summary.compression,
            bytes = staged.summary.bytes_written,
            "Wrote chunked store"
        );

        Ok(staged)
    }

    fn compression_level(&self) -> u8 {
        if self.config.zarr_compression == ZarrCompression::None {
            0
        } else {
            self.config.zarr_compression_level
        }
    }

    fn write_root_group(
        &self,
        store: &Arc<FilesystemStore>,
        grid: &Grid,
        attributes: &StoreAttributes,
    ) -> Result<()> {
        let mut attrs = serde_json::Map::new();
        attrs.insert("dataset_id".to_string(), serde_json::json!(attributes.dataset_id));
        attrs.insert("title".to_string(), serde_json::json!(attributes.title));
        if let Some(reference_time) = attributes.reference_time {
            attrs.insert(
                "reference_time".to_string(),
                serde_json::json!(reference_time.to_rfc3339()),
            );
        }
        attrs.insert(
            "variables".to_string(),
            serde_json::json!(grid.variables().keys().collect::<Vec<_>>()),
        );

        let mut builder = GroupBuilder::new();
        builder.attributes(attrs);
        let group = builder
            .build(store.clone(), "/")
            .map_err(|e| GridProcessorError::write_error(e.to_string()))?;
        group
            .store_metadata()
            .map_err(|e| GridProcessorError::write_error(e.to_string()))
    }

    fn write_coordinates(&self, store: &Arc<FilesystemStore>, grid: &Grid) -> Result<()> {
        let times: Vec<i64> = grid.times().iter().map(|t| t.timestamp()).collect();
        let time_array = coordinate_array(
            store,
            TIME_ARRAY,
            DataType::Int64,
            FillValue::from(0i64),
            times.len(),
            "seconds since 1970-01-01T00:00:00Z",
        )?;
        time_array
            .store_array_subset_elements(&full_subset(times.len())?, &times)
            .map_err(|e| GridProcessorError::write_error(e.to_string()))?;

        let lat_array = coordinate_array(
            store,
            LAT_ARRAY,
            DataType::Float64,
            FillValue::from(f64::NAN),
            grid.latitudes().len(),
            "degrees_north",
        )?;
        lat_array
            .store_array_subset_elements(&full_subset(grid.latitudes().len())?, grid.latitudes())
            .map_err(|e| GridProcessorError::write_error(e.to_string()))?;

        let lon_array = coordinate_array(
            store,
            LON_ARRAY,
            DataType::Float64,
            FillValue::from(f64::NAN),
            grid.longitudes().len(),
            "degrees_east",
        )?;
        lon_array
            .store_array_subset_elements(&full_subset(grid.longitudes().len())?, grid.longitudes())
            .map_err(|e| GridProcessorError::write_error(e.to_string()))
    }

    fn build_variable_array(
        &self,
        store: &Arc<FilesystemStore>,
        name: &str,
        info: &VariableInfo,
        grid: &Grid,
        chunk_shape: [usize; 3],
    ) -> Result<Array<FilesystemStore>> {
        if [TIME_ARRAY, LAT_ARRAY, LON_ARRAY].contains(&name) {
            return Err(GridProcessorError::write_error(format!(
                "variable name '{}' collides with a coordinate array",
                name
            )));
        }

        let mut attrs = serde_json::Map::new();
        attrs.insert("units".to_string(), serde_json::json!(info.units));
        attrs.insert("long_name".to_string(), serde_json::json!(info.title));
        attrs.insert("description".to_string(), serde_json::json!(info.description));
        if !info.standard_name.is_empty() {
            attrs.insert(
                "standard_name".to_string(),
                serde_json::json!(info.standard_name),
            );
        }
        attrs.insert(
            "_ARRAY_DIMENSIONS".to_string(),
            serde_json::json!([TIME_ARRAY, LAT_ARRAY, LON_ARRAY]),
        );

        let (nt, ny, nx) = grid.shape();
        let chunk_grid: zarrs::array::ChunkGrid = chunk_shape
            .iter()
            .map(|&c| c as u64)
            .collect::<Vec<u64>>()
            .try_into()
            .map_err(|e| GridProcessorError::ConfigError(format!("{:?}", e)))?;

        let mut binding = ArrayBuilder::new(
            vec![nt as u64, ny as u64, nx as u64],
            DataType::Float32,
            chunk_grid,
            FillValue::from(f32::NAN),
        );
        let mut builder = binding.attributes(attrs);

        if self.config.zarr_compression != ZarrCompression::None {
            let codec = self.create_compression_codec()?;
            builder = builder.bytes_to_bytes_codecs(vec![codec]);
        }

        let array = builder
            .build(store.clone(), &format!("/{}", name))
            .map_err(|e| GridProcessorError::write_error(e.to_string()))?;
        array
            .store_metadata()
            .map_err(|e| GridProcessorError::write_error(e.to_string()))?;
        Ok(array)
    }

    /// Create the compression codec based on configuration.
    fn create_compression_codec(
        &self,
    ) -> Result<Arc<dyn zarrs::array::codec::BytesToBytesCodecTraits>> {
        let level = BloscCompressionLevel::try_from(self.config.zarr_compression_level)
            .map_err(|_| GridProcessorError::ConfigError("Invalid compression level".to_string()))?;

        let shuffle = if self.config.zarr_shuffle {
            BloscShuffleMode::Shuffle
        } else {
            BloscShuffleMode::NoShuffle
        };

        // typesize is required when shuffle is enabled
        let typesize = if self.config.zarr_shuffle {
            Some(std::mem::size_of::<f32>())
        } else {
            None
        };

        let compressor = match self.config.zarr_compression {
            ZarrCompression::None => {
                return Err(GridProcessorError::ConfigError(
                    "No compression configured".to_string(),
                ))
            }
            ZarrCompression::BloscLz4 => BloscCompressor::LZ4,
            ZarrCompression::BloscZstd => BloscCompressor::Zstd,
        };

        let codec = BloscCodec::new(compressor, level, None, shuffle, typesize)
            .map_err(|e| GridProcessorError::ConfigError(e.to_string()))?;

        Ok(Arc::new(codec))
    }
}

fn coordinate_array(
    store: &Arc<FilesystemStore>,
    name: &str,
    data_type: DataType,
    fill_value: FillValue,
    len: usize,
    units: &str,
) -> Result<Array<FilesystemStore>> {
    let mut attrs = serde_json::Map::new();
    attrs.insert("units".to_string(), serde_json::json!(units));
    attrs.insert("_ARRAY_DIMENSIONS".to_string(), serde_json::json!([name]));

    let chunk_grid: zarrs::array::ChunkGrid = vec![len.max(1) as u64]
        .try_into()
        .map_err(|e| GridProcessorError::ConfigError(format!("{:?}", e)))?;

    let array = ArrayBuilder::new(vec![len as u64], data_type, chunk_grid, fill_value)
        .attributes(attrs)
        .build(store.clone(), &format!("/{}", name))
        .map_err(|e| GridProcessorError::write_error(e.to_string()))?;
    array
        .store_metadata()
        .map_err(|e| GridProcessorError::write_error(e.to_string()))?;
    Ok(array)
}

fn full_subset(len: usize) -> Result<ArraySubset> {
    ArraySubset::new_with_start_shape(vec![0], vec![len as u64])
        .map_err(|e| GridProcessorError::write_error(e.to_string()))
}

/// Fsync every file under `root`, then the directories. Returns total file bytes.
fn sync_tree(root: &Path) -> Result<u64> {
    let mut bytes = 0u64;
    let mut dirs = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| GridProcessorError::write_error(e.to_string()))?;
        if entry.file_type().is_dir() {
            dirs.push(entry.into_path());
            continue;
        }
        let file = fs::File::open(entry.path())?;
        file.sync_all()
            .map_err(|e| GridProcessorError::write_error(format!("fsync {}: {}", entry.path().display(), e)))?;
        bytes += file.metadata()?.len();
    }

    for dir in dirs {
        sync_dir(&dir);
    }
    Ok(bytes)
}

/// Directory fsync is best effort; some platforms refuse to open directories.
fn sync_dir(dir: &Path) {
    if let Ok(handle) = fs::File::open(dir) {
        let _ = handle.sync_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GridAxes, GridVariable};
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn small_grid() -> Grid {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let axes = GridAxes {
            times: vec![t0, t0 + chrono::Duration::hours(3)],
            latitudes: vec![10.0, 11.0, 12.0],
            longitudes: vec![-1.0, 0.0, 1.0, 2.0],
        };
        let mut vars = BTreeMap::new();
        vars.insert(
            "htsgwsfc".to_string(),
            GridVariable {
                info: VariableInfo {
                    title: "Significant Wave Height".to_string(),
                    units: "m".to_string(),
                    ..Default::default()
                },
                data: (0..24).map(|i| i as f32).collect(),
            },
        );
        Grid::new(axes, vars).unwrap()
    }

    #[test]
    fn test_write_creates_store_layout() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let staging = temp_dir.path().join(".staging").join("v1");

        let writer = ChunkedStoreWriter::new(GridProcessorConfig::default());
        let staged = writer
            .write(&small_grid(), &staging, &StoreAttributes::default())
            .expect("Failed to write");

        assert_eq!(staged.summary().chunk_shape, [2, 3, 4]);
        assert_eq!(staged.summary().compression, "blosc_zstd");
        assert_eq!(staged.summary().compression_level, 3);
        assert!(staged.summary().bytes_written > 0);
        assert!(staged.store_path().join("zarr.json").exists());
        assert!(staged.store_path().join("htsgwsfc").join("zarr.json").exists());
        assert!(staged.store_path().join("time").join("zarr.json").exists());
    }

    #[test]
    fn test_uncommitted_store_is_removed_on_drop() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let staging = temp_dir.path().join("staging");

        let writer = ChunkedStoreWriter::new(GridProcessorConfig::default());
        let staged = writer
            .write(&small_grid(), &staging, &StoreAttributes::default())
            .expect("Failed to write");
        assert!(staging.exists());

        drop(staged);
        assert!(!staging.exists());
    }

    #[test]
    fn test_commit_moves_store() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let staging = temp_dir.path().join("staging");
        let dest = temp_dir.path().join("waves").join("v1");

        let writer = ChunkedStoreWriter::new(GridProcessorConfig {
            zarr_compression: ZarrCompression::None,
            ..Default::default()
        });
        let staged = writer
            .write(&small_grid(), &staging, &StoreAttributes::default())
            .expect("Failed to write");
        assert_eq!(staged.summary().compression_level, 0);

        let committed = staged.commit(&dest).expect("Failed to commit");
        assert_eq!(committed, dest);
        assert!(!staging.exists());
        assert!(dest.join(STORE_DIR_NAME).join("zarr.json").exists());
    }

    #[test]
    fn test_synced_store_still_removed_on_drop() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let staging = temp_dir.path().join("staging");

        let writer = ChunkedStoreWriter::new(GridProcessorConfig::default());
        let mut staged = writer
            .write(&small_grid(), &staging, &StoreAttributes::default())
            .expect("Failed to write");
        fs::write(staging.join("manifest.json"), b"{}").unwrap();
        staged.sync().expect("Failed to sync");

        drop(staged);
        assert!(!staging.exists());
    }

    #[test]
    fn test_write_rejects_existing_staging_dir() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let writer = ChunkedStoreWriter::new(GridProcessorConfig::default());

        let err = writer
            .write(&small_grid(), temp_dir.path(), &StoreAttributes::default())
            .unwrap_err();
        assert!(matches!(err, GridProcessorError::WriteError(_)));
        // The pre-existing directory is not ours to delete
        assert!(temp_dir.path().exists());
    }
}
