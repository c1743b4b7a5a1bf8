//! Wave forecast ingestion.
//!
//! Turns the newest upstream forecast into the active version of a dataset.
//!
//! # Architecture
//!
//! - [`ForecastSource`] fetches a [`RawGrid`] (local file or HTTP)
//! - [`normalize`] produces the canonical grid: (time, lat, lon) order,
//!   signed longitudes, `NaN` for missing data
//! - [`ReloadPipeline`] writes the chunked store, registers the version,
//!   promotes it and prunes old versions
//!
//! Failures anywhere before promotion leave the active version untouched.

pub mod config;
pub mod error;
pub mod normalize;
pub mod pipeline;
pub mod raw;
pub mod source;
pub mod tables;

// Re-exports
pub use config::{IngestionConfig, NormalizeOptions, Region, RetryConfig};
pub use error::{IngestionError, Result};
pub use normalize::normalize;
pub use pipeline::{fetch_with_retry, ReloadOutcome, ReloadPipeline};
pub use raw::{Axis, CoordValue, LonConvention, RawGrid, RawVariable};
pub use source::{
    latest_cycle, FetchError, FileSource, ForecastSource, HttpSource, HttpSourceConfig,
    SourceConfig,
};
pub use tables::{ValidRange, WaveVariable};
