//! Chunked grid storage for gridded forecast data.
//!
//! This crate owns the canonical in-memory [`Grid`], its persisted form as a
//! Zarr V3 store, and the read path used by queries:
//!
//! - **Writing**: [`ChunkedStoreWriter`] stages a compressed, chunked store
//!   and only exposes it through [`StagedStore::commit`]
//! - **Partial reads**: [`ZarrStoreReader`] fetches only the chunks that hold
//!   the requested cells
//! - **Caching**: decompressed chunks are shared through an LRU [`ChunkCache`]
//! - **Extents**: [`compute_extent`] derives the bbox and instants of a grid
//!
//! # Architecture
//!
//! ```text
//! Query cells [(t, y, x), ...]
//!      │
//!      ▼
//! GridReader::read_cells(variable, cells)
//!      │
//!      ├─► Group cells by chunk (integer division)
//!      │
//!      ├─► For each chunk, concurrently:
//!      │         ├─► Cache hit: shared decoded chunk
//!      │         └─► Cache miss: decode on the blocking pool, then cache
//!      │
//!      └─► Copy values into request order
//! ```
//!
//! # Example
//!
//! ```ignore
//! use grid_processor::{ChunkedStoreWriter, GridProcessorConfig, StoreAttributes};
//!
//! let writer = ChunkedStoreWriter::new(GridProcessorConfig::default());
//! let staged = writer.write(&grid, &staging_dir, &StoreAttributes::default())?;
//! staged.commit(&version_dir)?;
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod extent;
pub mod processor;
pub mod types;
pub mod writer;

// Re-export commonly used types at crate root
pub use cache::{ChunkCache, ChunkKey};
pub use config::{GridProcessorConfig, ZarrCompression};
pub use error::{GridProcessorError, Result};
pub use extent::{compute_extent, extent_from_axes, longitude_range, DatasetExtent, TemporalExtent};
pub use processor::{CellIndex, GridReader, ZarrStoreReader};
pub use types::{
    axis_order, longitude_distance, wrap_longitude, AxisOrder, BoundingBox, CacheStats, Grid,
    GridAxes, GridVariable, VariableInfo,
};
pub use writer::{ChunkedStoreWriter, StagedStore, StoreAttributes, StoreSummary, STORE_DIR_NAME};
