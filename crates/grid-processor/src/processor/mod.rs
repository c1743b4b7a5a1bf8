//! Grid reader trait and implementations.

mod zarr;

pub use zarr::ZarrStoreReader;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{CacheStats, GridAxes, VariableInfo};

/// Index of one cell as (time, lat, lon).
pub type CellIndex = (usize, usize, usize);

/// Read access to a committed store.
///
/// Implementations only fetch the chunks that contain the requested cells
/// and may serve repeated reads from a shared chunk cache.
#[async_trait]
pub trait GridReader: Send + Sync {
    /// Coordinate axes of the store.
    fn axes(&self) -> &GridAxes;

    /// Variables in the store with their metadata.
    fn variables(&self) -> &BTreeMap<String, VariableInfo>;

    /// Read the values of `variable` at `cells`, in the same order.
    ///
    /// Missing values come back as `NaN`. Chunks are fetched concurrently;
    /// dropping the returned future abandons the remaining reads.
    async fn read_cells(&self, variable: &str, cells: &[CellIndex]) -> Result<Vec<f32>>;

    /// Get cache statistics for monitoring.
    async fn cache_stats(&self) -> CacheStats;
}
