//! Ingestion configuration.
//!
//! Which variables to keep, an optional spatial/temporal subset, the retry
//! policy for fetching and the retention of old versions.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::tables::default_variables;

/// Geographic subset, in signed degrees.
///
/// `lon_min > lon_max` selects a region across the antimeridian.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl Region {
    pub fn contains_lat(&self, lat: f64) -> bool {
        lat >= self.lat_min && lat <= self.lat_max
    }

    pub fn contains_lon(&self, lon: f64) -> bool {
        if self.lon_min <= self.lon_max {
            lon >= self.lon_min && lon <= self.lon_max
        } else {
            lon >= self.lon_min || lon <= self.lon_max
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(-90.0..=90.0).contains(&self.lat_min) || !(-90.0..=90.0).contains(&self.lat_max) {
            return Err("region latitudes must be within [-90, 90]".to_string());
        }
        if self.lat_min > self.lat_max {
            return Err("region lat_min must not exceed lat_max".to_string());
        }
        if !(-180.0..=180.0).contains(&self.lon_min) || !(-180.0..=180.0).contains(&self.lon_max) {
            return Err("region longitudes must be within [-180, 180]".to_string());
        }
        Ok(())
    }
}

/// Parses `lat_min,lat_max,lon_min,lon_max`.
impl FromStr for Region {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<f64> = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|_| format!("invalid region '{}': expected lat_min,lat_max,lon_min,lon_max", s))?;
        let [lat_min, lat_max, lon_min, lon_max] = parts[..] else {
            return Err(format!(
                "invalid region '{}': expected lat_min,lat_max,lon_min,lon_max",
                s
            ));
        };
        let region = Self {
            lat_min,
            lat_max,
            lon_min,
            lon_max,
        };
        region.validate()?;
        Ok(region)
    }
}

/// Exponential backoff for transient fetch failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial retry delay in milliseconds (doubles each retry)
    pub initial_delay_ms: u64,
    /// Maximum retry delay in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay_ms: 2_000,
            max_delay_ms: 120_000,
        }
    }
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Options handed to the normalizer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizeOptions {
    /// Variables to keep. Empty keeps every variable of the raw grid.
    pub variables: Vec<String>,
    pub region: Option<Region>,
    pub max_time_steps: Option<usize>,
}

/// Configuration of one ingested dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Registry dataset id
    pub dataset_id: String,
    /// Title written into the store when the source has none
    pub title: String,
    pub variables: Vec<String>,
    pub region: Option<Region>,
    pub max_time_steps: Option<usize>,
    pub retry: RetryConfig,
    /// Deadline for a whole reload, in seconds
    pub deadline_secs: u64,
    /// Versions retained after a successful reload (the active one included)
    pub keep_versions: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            dataset_id: "gfs-wave".to_string(),
            title: "GFS Wave Forecast".to_string(),
            variables: default_variables(),
            region: None,
            max_time_steps: None,
            retry: RetryConfig::default(),
            deadline_secs: 1800,
            keep_versions: 3,
        }
    }
}

impl IngestionConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    pub fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            variables: self.variables.clone(),
            region: self.region,
            max_time_steps: self.max_time_steps,
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.dataset_id.is_empty() {
            return Err("dataset_id must not be empty".to_string());
        }
        if self.keep_versions == 0 {
            return Err("keep_versions must be at least 1".to_string());
        }
        if self.deadline_secs == 0 {
            return Err("deadline_secs must be > 0".to_string());
        }
        if self.max_time_steps == Some(0) {
            return Err("max_time_steps must be > 0 when set".to_string());
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err("retry.initial_delay_ms must not exceed retry.max_delay_ms".to_string());
        }
        if let Some(region) = &self.region {
            region.validate()?;
        }
        Ok(())
    }
}
