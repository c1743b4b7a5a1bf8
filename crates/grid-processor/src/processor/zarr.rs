//! Zarr V3 store reader.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use futures::{StreamExt, TryStreamExt};
use tokio::sync::RwLock;
use tracing::debug;
use zarrs::array::Array;
use zarrs::array_subset::ArraySubset;
use zarrs::group::Group;
use zarrs_filesystem::FilesystemStore;

use crate::cache::{hash_path, ChunkCache, ChunkData};
use crate::error::{GridProcessorError, Result};
use crate::types::{CacheStats, GridAxes, VariableInfo};
use crate::writer::{LAT_ARRAY, LON_ARRAY, TIME_ARRAY};

use super::{CellIndex, GridReader};

type ChunkCoord = (usize, usize, usize);

struct VariableArray {
    array: Arc<Array<FilesystemStore>>,
    path_hash: u64,
}

/// Reader for a store written by [`ChunkedStoreWriter`](crate::ChunkedStoreWriter).
///
/// Reading works chunk by chunk:
/// 1. Group the requested cells by the chunk that holds them
/// 2. Serve each chunk from the shared cache or decode it on a blocking thread
/// 3. Copy the requested values out of the decoded chunks
pub struct ZarrStoreReader {
    root: PathBuf,
    axes: GridAxes,
    variables: BTreeMap<String, VariableInfo>,
    arrays: BTreeMap<String, VariableArray>,
    chunk_shape: [usize; 3],
    chunk_cache: Arc<RwLock<ChunkCache>>,
    concurrency: usize,
}

impl ZarrStoreReader {
    /// Open a store and load its coordinate axes.
    ///
    /// # Arguments
    /// * `path` - Path to the `store.zarr` directory
    /// * `chunk_cache` - Cache shared by every open reader
    /// * `concurrency` - Maximum number of chunk reads in flight per request
    pub fn open(
        path: &Path,
        chunk_cache: Arc<RwLock<ChunkCache>>,
        concurrency: usize,
    ) -> Result<Self> {
        let store = Arc::new(
            FilesystemStore::new(path).map_err(|e| GridProcessorError::open_failed(e.to_string()))?,
        );

        let group = Group::open(store.clone(), "/")
            .map_err(|e| GridProcessorError::open_failed(format!("{}: {}", path.display(), e)))?;
        let names: Vec<String> = group
            .attributes()
            .get("variables")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .ok_or_else(|| GridProcessorError::invalid_metadata("root group lists no variables"))?;

        let axes = Self::read_axes(&store)?;
        let shape = axes.shape();

        let mut variables = BTreeMap::new();
        let mut arrays = BTreeMap::new();
        let mut chunk_shape = [0usize; 3];

        for name in names {
            let array = Array::open(store.clone(), &format!("/{}", name))
                .map_err(|e| GridProcessorError::open_failed(format!("array '{}': {}", name, e)))?;

            let array_shape = array.shape();
            if array_shape != [shape.0 as u64, shape.1 as u64, shape.2 as u64].as_slice() {
                return Err(GridProcessorError::invalid_metadata(format!(
                    "array '{}' has shape {:?}, axes give {:?}",
                    name, array_shape, shape
                )));
            }

            let origin = vec![0u64; 3];
            let chunk = array
                .chunk_grid()
                .chunk_shape(&origin, array.shape())
                .map_err(|e| GridProcessorError::invalid_metadata(e.to_string()))?
                .ok_or_else(|| GridProcessorError::invalid_metadata("missing chunk shape"))?;
            chunk_shape = [
                chunk[0].get() as usize,
                chunk[1].get() as usize,
                chunk[2].get() as usize,
            ];

            variables.insert(name.clone(), Self::variable_info(&array));
            let path_hash = hash_path(&path.join(&name).to_string_lossy());
            arrays.insert(
                name,
                VariableArray {
                    array: Arc::new(array),
                    path_hash,
                },
            );
        }

        if arrays.is_empty() {
            return Err(GridProcessorError::invalid_metadata("store has no variables"));
        }

        debug!(
            path = %path.display(),
            variables = arrays.len(),
            shape = ?shape,
            chunk_shape = ?chunk_shape,
            "Opened chunked store"
        );

        Ok(Self {
            root: path.to_path_buf(),
            axes,
            variables,
            arrays,
            chunk_shape,
            chunk_cache,
            concurrency: concurrency.max(1),
        })
    }

    /// Path of the store on disk.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Chunk shape as (time, lat, lon).
    pub fn chunk_shape(&self) -> [usize; 3] {
        self.chunk_shape
    }

    fn read_axes(store: &Arc<FilesystemStore>) -> Result<GridAxes> {
        let time = Array::open(store.clone(), &format!("/{}", TIME_ARRAY))
            .map_err(|e| GridProcessorError::open_failed(format!("time axis: {}", e)))?;
        let seconds: Vec<i64> = time
            .retrieve_array_subset_elements(&time.subset_all())
            .map_err(|e| GridProcessorError::read_failed(e.to_string()))?;
        let times = seconds
            .into_iter()
            .map(|s| {
                DateTime::from_timestamp(s, 0).ok_or_else(|| {
                    GridProcessorError::invalid_metadata(format!("time value {} out of range", s))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let latitudes = Self::read_f64_axis(store, LAT_ARRAY)?;
        let longitudes = Self::read_f64_axis(store, LON_ARRAY)?;

        let axes = GridAxes {
            times,
            latitudes,
            longitudes,
        };
        axes.validate()
            .map_err(|e| GridProcessorError::invalid_metadata(e.to_string()))?;
        Ok(axes)
    }

    fn read_f64_axis(store: &Arc<FilesystemStore>, name: &str) -> Result<Vec<f64>> {
        let array = Array::open(store.clone(), &format!("/{}", name))
            .map_err(|e| GridProcessorError::open_failed(format!("{} axis: {}", name, e)))?;
        array
            .retrieve_array_subset_elements(&array.subset_all())
            .map_err(|e| GridProcessorError::read_failed(e.to_string()))
    }

    fn variable_info(array: &Array<FilesystemStore>) -> VariableInfo {
        let attrs = array.attributes();
        let text = |key: &str| {
            attrs
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string()
        };
        VariableInfo {
            title: text("long_name"),
            units: text("units"),
            description: text("description"),
            standard_name: text("standard_name"),
        }
    }

    /// Cell range covered by a chunk, clipped at the array edge.
    fn chunk_bounds(&self, coord: ChunkCoord) -> ([usize; 3], [usize; 3]) {
        let (nt, ny, nx) = self.axes.shape();
        let dims = [nt, ny, nx];
        let idx = [coord.0, coord.1, coord.2];
        let mut start = [0usize; 3];
        let mut len = [0usize; 3];
        for d in 0..3 {
            start[d] = idx[d] * self.chunk_shape[d];
            len[d] = self.chunk_shape[d].min(dims[d] - start[d]);
        }
        (start, len)
    }

    /// Read and decompress a single chunk (synchronous).
    fn read_chunk_sync(
        array: &Array<FilesystemStore>,
        start: [usize; 3],
        len: [usize; 3],
    ) -> Result<Vec<f32>> {
        let subset = ArraySubset::new_with_start_shape(
            start.iter().map(|&v| v as u64).collect(),
            len.iter().map(|&v| v as u64).collect(),
        )
        .map_err(|e| GridProcessorError::read_failed(e.to_string()))?;

        array
            .retrieve_array_subset_elements(&subset)
            .map_err(|e| GridProcessorError::read_failed(e.to_string()))
    }

    /// Read a chunk through the cache, decoding on the blocking pool on a miss.
    async fn read_chunk(&self, variable: &VariableArray, coord: ChunkCoord) -> Result<ChunkData> {
        let cache_key = (variable.path_hash, coord.0, coord.1, coord.2);

        {
            let mut cache = self.chunk_cache.write().await;
            if let Some(data) = cache.get(&cache_key) {
                return Ok(data);
            }
        }

        let (start, len) = self.chunk_bounds(coord);
        let array = Arc::clone(&variable.array);
        let data = tokio::task::spawn_blocking(move || Self::read_chunk_sync(&array, start, len))
            .await
            .map_err(|e| GridProcessorError::read_failed(format!("chunk task failed: {}", e)))??;
        let data: ChunkData = Arc::new(data);

        {
            let mut cache = self.chunk_cache.write().await;
            cache.insert(cache_key, Arc::clone(&data));
        }

        Ok(data)
    }
}

#[async_trait]
impl GridReader for ZarrStoreReader {
    fn axes(&self) -> &GridAxes {
        &self.axes
    }

    fn variables(&self) -> &BTreeMap<String, VariableInfo> {
        &self.variables
    }

    async fn read_cells(&self, variable: &str, cells: &[CellIndex]) -> Result<Vec<f32>> {
        let var = self
            .arrays
            .get(variable)
            .ok_or_else(|| GridProcessorError::UnknownVariable(variable.to_string()))?;

        let shape = self.axes.shape();
        let [ct, cy, cx] = self.chunk_shape;

        // 1. Group requested cells by chunk
        let mut by_chunk: BTreeMap<ChunkCoord, Vec<usize>> = BTreeMap::new();
        for (i, &(t, y, x)) in cells.iter().enumerate() {
            if t >= shape.0 || y >= shape.1 || x >= shape.2 {
                return Err(GridProcessorError::OutOfBounds { t, y, x, shape });
            }
            by_chunk.entry((t / ct, y / cy, x / cx)).or_default().push(i);
        }

        debug!(
            path = %self.root.display(),
            variable = %variable,
            cells = cells.len(),
            chunks = by_chunk.len(),
            "Reading cells"
        );

        // 2. Fetch chunks concurrently
        let chunks: Vec<(ChunkCoord, ChunkData)> = futures::stream::iter(by_chunk.keys().copied())
            .map(|coord| async move { self.read_chunk(var, coord).await.map(|data| (coord, data)) })
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await?;

        // 3. Copy values out
        let mut output = vec![f32::NAN; cells.len()];
        for (coord, data) in chunks {
            let (start, len) = self.chunk_bounds(coord);
            for &i in &by_chunk[&coord] {
                let (t, y, x) = cells[i];
                let local = ((t - start[0]) * len[1] + (y - start[1])) * len[2] + (x - start[2]);
                output[i] = data.get(local).copied().unwrap_or(f32::NAN);
            }
        }

        Ok(output)
    }

    async fn cache_stats(&self) -> CacheStats {
        self.chunk_cache.read().await.stats()
    }
}

impl Drop for ZarrStoreReader {
    fn drop(&mut self) {
        // Best effort: a busy cache keeps the entries until LRU pushes them out
        if let Ok(mut cache) = self.chunk_cache.try_write() {
            let evicted: usize = self
                .arrays
                .values()
                .map(|a| cache.invalidate_array(a.path_hash))
                .sum();
            if evicted > 0 {
                debug!(path = %self.root.display(), evicted, "Evicted cached chunks of closed store");
            }
        }
    }
}
