//! Cache implementations for grid processing.

mod chunk_cache;

pub use chunk_cache::{hash_path, ChunkCache, ChunkData, ChunkKey};
