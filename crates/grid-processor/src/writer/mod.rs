//! Chunked store writer.
//!
//! Used during ingestion to persist a canonical grid in Zarr V3 format.

mod zarr_writer;

pub use zarr_writer::{
    ChunkedStoreWriter, StagedStore, StoreAttributes, StoreSummary, LAT_ARRAY, LON_ARRAY,
    STORE_DIR_NAME, TIME_ARRAY,
};
