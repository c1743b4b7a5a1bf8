//! Configuration for the grid processor.

use serde::{Deserialize, Serialize};

/// Configuration for chunked store layout and the read-side chunk cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridProcessorConfig {
    /// Memory budget for the chunk cache in megabytes.
    pub chunk_cache_size_mb: usize,

    /// Upper bound for the chunk length along the time axis.
    pub time_chunk: usize,

    /// Upper bound for the chunk length along the latitude axis.
    pub lat_chunk: usize,

    /// Upper bound for the chunk length along the longitude axis.
    pub lon_chunk: usize,

    /// Compression codec for Zarr arrays.
    pub zarr_compression: ZarrCompression,

    /// Compression level (1-9).
    pub zarr_compression_level: u8,

    /// Enable byte shuffle filter for better compression.
    pub zarr_shuffle: bool,

    /// Maximum number of chunk reads in flight for one request.
    pub read_concurrency: usize,
}

impl Default for GridProcessorConfig {
    fn default() -> Self {
        Self {
            chunk_cache_size_mb: 256,
            time_chunk: 48,
            lat_chunk: 200,
            lon_chunk: 400,
            zarr_compression: ZarrCompression::BloscZstd,
            zarr_compression_level: 3,
            zarr_shuffle: true,
            read_concurrency: 8,
        }
    }
}

impl GridProcessorConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override fields from environment variables where set.
    pub fn apply_env(&mut self) {
        if let Ok(val) = std::env::var("CHUNK_CACHE_SIZE_MB") {
            if let Ok(size) = val.parse() {
                self.chunk_cache_size_mb = size;
            }
        }

        if let Ok(val) = std::env::var("ZARR_CHUNK_TIME") {
            if let Ok(size) = val.parse() {
                self.time_chunk = size;
            }
        }

        if let Ok(val) = std::env::var("ZARR_CHUNK_LAT") {
            if let Ok(size) = val.parse() {
                self.lat_chunk = size;
            }
        }

        if let Ok(val) = std::env::var("ZARR_CHUNK_LON") {
            if let Ok(size) = val.parse() {
                self.lon_chunk = size;
            }
        }

        if let Ok(val) = std::env::var("ZARR_COMPRESSION") {
            self.zarr_compression = ZarrCompression::from_str(&val);
        }

        if let Ok(val) = std::env::var("ZARR_COMPRESSION_LEVEL") {
            if let Ok(level) = val.parse() {
                self.zarr_compression_level = level;
            }
        }

        if let Ok(val) = std::env::var("ZARR_SHUFFLE") {
            self.zarr_shuffle = val.to_lowercase() == "true" || val == "1";
        }

        if let Ok(val) = std::env::var("ZARR_READ_CONCURRENCY") {
            if let Ok(n) = val.parse() {
                self.read_concurrency = n;
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_cache_size_mb == 0 {
            return Err("chunk_cache_size_mb must be > 0".to_string());
        }

        if self.time_chunk == 0 || self.lat_chunk == 0 || self.lon_chunk == 0 {
            return Err("chunk dimensions must be > 0".to_string());
        }

        if self.zarr_compression_level == 0 || self.zarr_compression_level > 9 {
            return Err("zarr_compression_level must be 1-9".to_string());
        }

        if self.read_concurrency == 0 {
            return Err("read_concurrency must be > 0".to_string());
        }

        Ok(())
    }

    /// Get the chunk cache size in bytes.
    pub fn chunk_cache_size_bytes(&self) -> usize {
        self.chunk_cache_size_mb * 1024 * 1024
    }

    /// Chunk shape for an array of the given (time, lat, lon) extent.
    ///
    /// Each dimension is `min(configured, actual)`, and never zero.
    pub fn chunk_shape(&self, nt: usize, ny: usize, nx: usize) -> [usize; 3] {
        [
            self.time_chunk.min(nt).max(1),
            self.lat_chunk.min(ny).max(1),
            self.lon_chunk.min(nx).max(1),
        ]
    }
}

/// Compression codec for Zarr arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ZarrCompression {
    /// No compression.
    None,
    /// Blosc with LZ4.
    BloscLz4,
    /// Blosc with Zstd.
    #[default]
    BloscZstd,
}

impl ZarrCompression {
    /// Parse from string (case-insensitive). Unknown names fall back to Zstd.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "none" => Self::None,
            "lz4" | "blosc_lz4" => Self::BloscLz4,
            _ => Self::BloscZstd,
        }
    }

    /// Get the codec name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::BloscLz4 => "blosc_lz4",
            Self::BloscZstd => "blosc_zstd",
        }
    }
}

impl std::fmt::Display for ZarrCompression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GridProcessorConfig::default();
        assert_eq!(config.time_chunk, 48);
        assert_eq!(config.lat_chunk, 200);
        assert_eq!(config.lon_chunk, 400);
        assert_eq!(config.zarr_compression, ZarrCompression::BloscZstd);
        assert_eq!(config.zarr_compression_level, 3);
        assert!(config.zarr_shuffle);
    }

    #[test]
    fn test_config_validation() {
        let mut config = GridProcessorConfig::default();
        assert!(config.validate().is_ok());

        config.chunk_cache_size_mb = 0;
        assert!(config.validate().is_err());

        config = GridProcessorConfig::default();
        config.lat_chunk = 0;
        assert!(config.validate().is_err());

        config = GridProcessorConfig::default();
        config.zarr_compression_level = 0;
        assert!(config.validate().is_err());

        config.zarr_compression_level = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_chunk_shape_clamps_to_array() {
        let config = GridProcessorConfig::default();
        assert_eq!(config.chunk_shape(81, 331, 301), [48, 200, 301]);
        assert_eq!(config.chunk_shape(1, 1, 1), [1, 1, 1]);
        assert_eq!(config.chunk_shape(0, 5, 5), [1, 5, 5]);
    }

    #[test]
    fn test_zarr_compression_from_str() {
        assert_eq!(ZarrCompression::from_str("none"), ZarrCompression::None);
        assert_eq!(ZarrCompression::from_str("lz4"), ZarrCompression::BloscLz4);
        assert_eq!(
            ZarrCompression::from_str("BLOSC_ZSTD"),
            ZarrCompression::BloscZstd
        );
        assert_eq!(
            ZarrCompression::from_str("invalid"),
            ZarrCompression::BloscZstd
        );
    }

    #[test]
    fn test_config_from_partial_yaml_fields() {
        let config: GridProcessorConfig =
            serde_json::from_str(r#"{"lat_chunk": 100, "zarr_compression": "blosc_lz4"}"#)
                .unwrap();
        assert_eq!(config.lat_chunk, 100);
        assert_eq!(config.lon_chunk, 400);
        assert_eq!(config.zarr_compression, ZarrCompression::BloscLz4);
    }
}
