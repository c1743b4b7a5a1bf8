//! Version manifests.
//!
//! Every committed version directory carries a `manifest.json` next to its
//! store. Discovery metadata (extent, variables, instants) is served from the
//! manifest alone, without opening the store.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use grid_processor::{DatasetExtent, StoreSummary, VariableInfo};
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, Result};

/// File name of the manifest inside a version directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Immutable description of one dataset version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub dataset_id: String,
    pub version_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub title: Option<String>,
    /// Forecast cycle the data was produced from, when known.
    #[serde(default)]
    pub reference_time: Option<DateTime<Utc>>,
    pub extent: DatasetExtent,
    pub variables: BTreeMap<String, VariableInfo>,
    /// Chunk shape as (time, lat, lon).
    pub chunk_shape: [usize; 3],
    pub compression: String,
    #[serde(default)]
    pub compression_level: u8,
    #[serde(default)]
    pub bytes: u64,
    /// Where the raw forecast came from (URL or file path).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Manifest {
    /// Build a manifest from a freshly written store.
    pub fn from_store(
        dataset_id: &str,
        version_id: &str,
        extent: DatasetExtent,
        variables: BTreeMap<String, VariableInfo>,
        summary: &StoreSummary,
    ) -> Self {
        Self {
            dataset_id: dataset_id.to_string(),
            version_id: version_id.to_string(),
            created_at: Utc::now(),
            title: None,
            reference_time: None,
            extent,
            variables,
            chunk_shape: summary.chunk_shape,
            compression: summary.compression.clone(),
            compression_level: summary.compression_level,
            bytes: summary.bytes_written,
            source: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_reference_time(mut self, reference_time: Option<DateTime<Utc>>) -> Self {
        self.reference_time = reference_time;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Read `manifest.json` from a version directory.
    pub fn read(version_dir: &Path) -> Result<Self> {
        let path = version_dir.join(MANIFEST_FILE);
        let bytes = fs::read(&path).map_err(|e| {
            RegistryError::Manifest(format!("cannot read {}: {}", path.display(), e))
        })?;
        let manifest: Manifest = serde_json::from_slice(&bytes)
            .map_err(|e| RegistryError::Manifest(format!("{}: {}", path.display(), e)))?;
        Ok(manifest)
    }

    /// Write `manifest.json` into a directory, durably.
    ///
    /// The file is written under a temporary name, synced, then renamed.
    pub fn write(&self, dir: &Path) -> Result<()> {
        let tmp = dir.join(format!("{}.tmp", MANIFEST_FILE));
        let json = serde_json::to_vec_pretty(self)?;
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, dir.join(MANIFEST_FILE))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use grid_processor::{BoundingBox, TemporalExtent};

    fn sample() -> Manifest {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut variables = BTreeMap::new();
        variables.insert(
            "htsgwsfc".to_string(),
            VariableInfo {
                title: "Significant Wave Height".to_string(),
                units: "m".to_string(),
                ..Default::default()
            },
        );
        Manifest {
            dataset_id: "waves".to_string(),
            version_id: "20240101T060000Z".to_string(),
            created_at: t0,
            title: Some("Wave test".to_string()),
            reference_time: Some(t0),
            extent: DatasetExtent {
                bbox: BoundingBox::new(170.0, -10.0, -170.0, 10.0),
                temporal: TemporalExtent {
                    start: t0,
                    end: t0,
                    instants: vec![t0],
                },
            },
            variables,
            chunk_shape: [1, 21, 41],
            compression: "blosc_zstd".to_string(),
            compression_level: 3,
            bytes: 1234,
            source: None,
        }
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = sample();
        manifest.write(dir.path()).unwrap();

        assert!(dir.path().join(MANIFEST_FILE).exists());
        assert!(!dir.path().join("manifest.json.tmp").exists());
        assert_eq!(Manifest::read(dir.path()).unwrap(), manifest);
    }

    #[test]
    fn test_read_missing_or_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Manifest::read(dir.path()),
            Err(RegistryError::Manifest(_))
        ));

        fs::write(dir.path().join(MANIFEST_FILE), b"{not json").unwrap();
        assert!(matches!(
            Manifest::read(dir.path()),
            Err(RegistryError::Manifest(_))
        ));
    }
}
