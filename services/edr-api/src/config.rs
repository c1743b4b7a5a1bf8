//! Service configuration.
//!
//! Loaded from an optional YAML file, then overridden from the environment:
//!
//! ```yaml
//! listen: 0.0.0.0:8083
//! base_url: http://localhost:8083/edr
//! data_dir: /data/waves
//! reload_interval_secs: 21600
//! source:
//!   kind: http
//!   url_template: https://example.org/gfswave/{date}/{run}.json
//! ingestion:
//!   dataset_id: gfs-wave
//!   keep_versions: 3
//! limits:
//!   max_cells: 250000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use grid_processor::GridProcessorConfig;
use ingestion::{HttpSourceConfig, IngestionConfig, SourceConfig};
use serde::{Deserialize, Serialize};

use crate::engine::default_time_tolerance;

/// Top-level configuration of the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listen address.
    pub listen: String,

    /// Public base URL for building links (without trailing slash).
    pub base_url: String,

    /// Root directory of the dataset registry.
    pub data_dir: PathBuf,

    /// Run a reload every this many seconds. Disabled when unset.
    pub reload_interval_secs: Option<u64>,

    /// Where forecasts come from. Reloads are unavailable without one.
    pub source: Option<SourceConfig>,

    /// Chunk layout, compression and chunk cache.
    pub grid: GridProcessorConfig,

    /// The ingested dataset.
    pub ingestion: IngestionConfig,

    /// Query limits.
    pub limits: LimitsConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8083".to_string(),
            base_url: "http://localhost:8083/edr".to_string(),
            data_dir: PathBuf::from("data"),
            reload_interval_secs: None,
            source: None,
            grid: GridProcessorConfig::default(),
            ingestion: IngestionConfig::default(),
            limits: LimitsConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load from `path` (if given), apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config: {}", path.display()))?;
                Self::from_yaml(&text)
                    .with_context(|| format!("Failed to parse config: {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Override fields from environment variables where set.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
        self.grid.apply_env();
    }

    /// Override fields from `lookup`, which maps variable names to values.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("EDR_BASE_URL") {
            self.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(dir) = lookup("EDR_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(secs) = lookup("EDR_RELOAD_INTERVAL_SECS").and_then(|v| v.parse().ok()) {
            self.reload_interval_secs = (secs > 0).then_some(secs);
        }
        if let Some(cells) = lookup("EDR_MAX_CELLS").and_then(|v| v.parse().ok()) {
            self.limits.max_cells = cells;
        }
        if let Some(dataset) = lookup("EDR_DATASET_ID") {
            self.ingestion.dataset_id = dataset;
        }
        if let Some(path) = lookup("EDR_SOURCE_PATH") {
            self.source = Some(SourceConfig::File {
                path: PathBuf::from(path),
            });
        } else if let Some(template) = lookup("EDR_SOURCE_URL") {
            self.source = Some(SourceConfig::Http(HttpSourceConfig::new(template)));
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.grid
            .validate()
            .map_err(|e| anyhow!("invalid grid config: {}", e))?;
        self.ingestion
            .validate()
            .map_err(|e| anyhow!("invalid ingestion config: {}", e))?;
        if self.limits.max_cells == 0 {
            bail!("limits.max_cells must be > 0");
        }
        if self.reload_interval_secs == Some(0) {
            bail!("reload_interval_secs must be > 0 when set");
        }
        if self.reload_interval_secs.is_some() && self.source.is_none() {
            bail!("reload_interval_secs is set but no source is configured");
        }
        Ok(())
    }

    pub fn reload_interval(&self) -> Option<Duration> {
        self.reload_interval_secs.map(Duration::from_secs)
    }
}

/// Query limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum cells times instants in one area query.
    pub max_cells: usize,

    /// How far a requested instant may be from a forecast step. Defaults to
    /// half the smallest step of the queried version.
    pub time_tolerance_secs: Option<u64>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_cells: 250_000,
            time_tolerance_secs: None,
        }
    }
}

impl LimitsConfig {
    /// Time tolerance for a version with the given time axis.
    pub fn time_tolerance(&self, times: &[DateTime<Utc>]) -> chrono::Duration {
        match self.time_tolerance_secs {
            Some(secs) => chrono::Duration::seconds(secs as i64),
            None => default_time_tolerance(times),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_is_valid() {
        let config = ServiceConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.reload_interval().is_none());
        assert_eq!(config.limits.max_cells, 250_000);
    }

    #[test]
    fn test_yaml_config() {
        let config = ServiceConfig::from_yaml(
            r#"
base_url: http://waves.example/edr
data_dir: /var/lib/waves
reload_interval_secs: 3600
source:
  kind: file
  path: /incoming
ingestion:
  dataset_id: nww3
  keep_versions: 2
limits:
  max_cells: 1000
  time_tolerance_secs: 600
"#,
        )
        .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/waves"));
        assert_eq!(config.reload_interval(), Some(Duration::from_secs(3600)));
        assert_eq!(config.ingestion.dataset_id, "nww3");
        assert_eq!(config.ingestion.keep_versions, 2);
        assert_eq!(config.limits.time_tolerance(&[]), chrono::Duration::minutes(10));
        assert!(matches!(config.source, Some(SourceConfig::File { .. })));
        // Unspecified sections keep their defaults
        assert_eq!(config.listen, "0.0.0.0:8083");
        assert_eq!(config.grid.time_chunk, 48);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("EDR_BASE_URL", "https://api.example/edr/"),
            ("EDR_MAX_CELLS", "42"),
            ("EDR_RELOAD_INTERVAL_SECS", "600"),
            ("EDR_SOURCE_URL", "https://example.org/{date}/{run}.json"),
        ]
        .into_iter()
        .collect();

        let mut config = ServiceConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.base_url, "https://api.example/edr");
        assert_eq!(config.limits.max_cells, 42);
        assert_eq!(config.reload_interval_secs, Some(600));
        assert!(matches!(config.source, Some(SourceConfig::Http(_))));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_configs() {
        let mut config = ServiceConfig::default();
        config.reload_interval_secs = Some(60);
        assert!(config.validate().is_err(), "interval without a source");

        let mut config = ServiceConfig::default();
        config.limits.max_cells = 0;
        assert!(config.validate().is_err());

        let mut config = ServiceConfig::default();
        config.ingestion.keep_versions = 0;
        assert!(config.validate().is_err());

        assert!(ServiceConfig::from_yaml("limits: [1, 2]").is_err());
    }
}
