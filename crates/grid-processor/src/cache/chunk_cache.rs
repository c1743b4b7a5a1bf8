//! LRU cache for decompressed store chunks.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::types::CacheStats;

/// Cache key for chunks: (array_path_hash, chunk_t, chunk_y, chunk_x).
pub type ChunkKey = (u64, usize, usize, usize);

/// Decompressed chunk values shared between the cache and in-flight readers.
pub type ChunkData = Arc<Vec<f32>>;

/// LRU cache for decompressed chunks with memory-bounded eviction.
pub struct ChunkCache {
    cache: LruCache<ChunkKey, ChunkData>,
    memory_limit: usize,
    current_memory: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

fn chunk_bytes(data: &ChunkData) -> usize {
    data.len() * std::mem::size_of::<f32>()
}

impl ChunkCache {
    /// Create a new chunk cache with the given memory limit in bytes.
    pub fn new(memory_limit: usize) -> Self {
        // Entry cap assumes ~1MB per chunk; memory_limit is the real bound
        let chunk_size_estimate = 512 * 512 * 4;
        let max_entries = (memory_limit / chunk_size_estimate).max(16);

        Self {
            cache: LruCache::new(NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN)),
            memory_limit,
            current_memory: 0,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Try to get a chunk from the cache.
    pub fn get(&mut self, key: &ChunkKey) -> Option<ChunkData> {
        if let Some(data) = self.cache.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            Some(Arc::clone(data))
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    /// Check if a key exists in the cache without updating LRU order.
    pub fn contains(&self, key: &ChunkKey) -> bool {
        self.cache.contains(key)
    }

    /// Insert a chunk, evicting least recently used entries to make room.
    pub fn insert(&mut self, key: ChunkKey, data: ChunkData) {
        let data_size = chunk_bytes(&data);

        while self.current_memory + data_size > self.memory_limit && !self.cache.is_empty() {
            if let Some((_, evicted)) = self.cache.pop_lru() {
                self.current_memory = self.current_memory.saturating_sub(chunk_bytes(&evicted));
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }

        if data_size <= self.memory_limit {
            // The LRU entry cap may push one out on its own
            if let Some((_, old)) = self.cache.push(key, data) {
                self.current_memory = self.current_memory.saturating_sub(chunk_bytes(&old));
            }
            self.current_memory += data_size;
        }
    }

    /// Drop every chunk that belongs to one array.
    ///
    /// Returns the number of entries removed.
    pub fn invalidate_array(&mut self, path_hash: u64) -> usize {
        let keys: Vec<ChunkKey> = self
            .cache
            .iter()
            .filter(|(k, _)| k.0 == path_hash)
            .map(|(k, _)| *k)
            .collect();

        for key in &keys {
            if let Some(data) = self.cache.pop(key) {
                self.current_memory = self.current_memory.saturating_sub(chunk_bytes(&data));
            }
        }
        keys.len()
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.cache.len(),
            memory_bytes: self.current_memory as u64,
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Clear all entries from the cache.
    pub fn clear(&mut self) {
        self.cache.clear();
        self.current_memory = 0;
    }

    /// Get the current memory usage in bytes.
    pub fn memory_usage(&self) -> usize {
        self.current_memory
    }

    /// Get the number of entries in the cache.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

/// Hash an array path into the first component of a [`ChunkKey`].
pub fn hash_path(path: &str) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(values: Vec<f32>) -> ChunkData {
        Arc::new(values)
    }

    #[test]
    fn test_cache_insert_and_get() {
        let mut cache = ChunkCache::new(1024 * 1024);

        let key = (123, 0, 0, 0);
        let data = chunk(vec![1.0, 2.0, 3.0, 4.0]);

        assert!(cache.get(&key).is_none());
        cache.insert(key, data.clone());
        assert_eq!(cache.get(&key), Some(data));
    }

    #[test]
    fn test_cache_lru_eviction() {
        // 64 bytes = 16 f32s max
        let mut cache = ChunkCache::new(64);

        for i in 0..10 {
            cache.insert((0, 0, i, 0), chunk(vec![i as f32; 4]));
        }

        assert!(cache.get(&(0, 0, 0, 0)).is_none());
        assert!(cache.get(&(0, 0, 9, 0)).is_some());
        assert!(cache.memory_usage() <= 64);
        assert!(cache.stats().evictions > 0);
    }

    #[test]
    fn test_cache_stats() {
        let mut cache = ChunkCache::new(1024 * 1024);

        cache.insert((0, 0, 0, 0), chunk(vec![1.0, 2.0, 3.0, 4.0]));
        cache.get(&(0, 0, 0, 0));
        cache.get(&(0, 0, 1, 0));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.memory_bytes, 16);
    }

    #[test]
    fn test_invalidate_array() {
        let mut cache = ChunkCache::new(1024 * 1024);
        let a = hash_path("/data/waves/20240101T000000Z/store.zarr/htsgwsfc");
        let b = hash_path("/data/waves/20240102T000000Z/store.zarr/htsgwsfc");

        cache.insert((a, 0, 0, 0), chunk(vec![1.0; 4]));
        cache.insert((a, 0, 0, 1), chunk(vec![1.0; 4]));
        cache.insert((b, 0, 0, 0), chunk(vec![2.0; 4]));

        assert_eq!(cache.invalidate_array(a), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.memory_usage(), 16);
        assert!(cache.contains(&(b, 0, 0, 0)));
    }

    #[test]
    fn test_cache_clear() {
        let mut cache = ChunkCache::new(1024 * 1024);
        cache.insert((0, 0, 0, 0), chunk(vec![1.0, 2.0, 3.0, 4.0]));

        assert!(!cache.is_empty());
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.memory_usage(), 0);
    }

    #[test]
    fn test_hash_path() {
        let hash1 = hash_path("waves/20240101T000000Z/store.zarr/htsgwsfc");
        let hash2 = hash_path("waves/20240101T000000Z/store.zarr/htsgwsfc");
        let hash3 = hash_path("waves/20240101T000000Z/store.zarr/perpwsfc");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
    }
}
