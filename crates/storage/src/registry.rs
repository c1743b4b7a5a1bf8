//! Dataset registry: version history and the active pointer per dataset.
//!
//! On-disk layout:
//!
//! ```text
//! <root>/<dataset_id>/<version_id>/store.zarr
//! <root>/<dataset_id>/<version_id>/manifest.json
//! <root>/<dataset_id>/.staging/<scratch>/
//! ```
//!
//! Readers take a short read lock to pin the active version and then work
//! without holding any lock. Promotion swaps one `Arc` under a short write lock.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use grid_processor::ChunkCache;
use serde::Serialize;
use tokio::sync::RwLock as AsyncRwLock;
use tracing::{debug, info, warn};

use crate::error::{RegistryError, Result};
use crate::version::{
    compare_version_ids, is_valid_id, parse_version_id, version_id_for, DatasetVersion,
    VersionHandle, VersionSlot,
};

/// Directory under each dataset that holds in-progress writes.
pub const STAGING_DIR: &str = ".staging";

#[derive(Default)]
struct DatasetEntry {
    /// Oldest first.
    versions: Vec<Arc<VersionSlot>>,
    active: Option<Arc<VersionSlot>>,
}

impl DatasetEntry {
    fn find(&self, version_id: &str) -> Option<&Arc<VersionSlot>> {
        self.versions
            .iter()
            .find(|s| s.version().version_id() == version_id)
    }
}

/// Outcome of [`DatasetRegistry::prune`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PruneReport {
    /// Versions whose storage was deleted immediately.
    pub removed: Vec<String>,
    /// Versions unlisted now but deleted when their last handle drops.
    pub deferred: Vec<String>,
}

/// One row of a dataset's version history.
#[derive(Debug, Clone)]
pub struct VersionListing {
    pub version: Arc<DatasetVersion>,
    pub active: bool,
    /// Number of handles currently pinning the version.
    pub in_flight: usize,
}

/// Registry of dataset versions rooted at one directory.
pub struct DatasetRegistry {
    root: PathBuf,
    datasets: RwLock<BTreeMap<String, DatasetEntry>>,
    chunk_cache: Arc<AsyncRwLock<ChunkCache>>,
    read_concurrency: usize,
}

impl DatasetRegistry {
    /// Create an empty registry, creating `root` if needed.
    pub fn new(
        root: impl Into<PathBuf>,
        chunk_cache: Arc<AsyncRwLock<ChunkCache>>,
        read_concurrency: usize,
    ) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            datasets: RwLock::new(BTreeMap::new()),
            chunk_cache,
            read_concurrency,
        })
    }

    /// Rebuild the registry from the directories under `root`.
    ///
    /// Every valid version is registered and the newest one per dataset
    /// becomes active. Leftover staging directories are removed and
    /// incomplete version directories are skipped with a warning.
    pub fn open(
        root: impl Into<PathBuf>,
        chunk_cache: Arc<AsyncRwLock<ChunkCache>>,
        read_concurrency: usize,
    ) -> Result<Self> {
        let registry = Self::new(root, chunk_cache, read_concurrency)?;

        for dataset_dir in fs::read_dir(&registry.root)? {
            let dataset_dir = dataset_dir?;
            if !dataset_dir.file_type()?.is_dir() {
                continue;
            }
            let dataset_id = dataset_dir.file_name().to_string_lossy().to_string();
            if !is_valid_id(&dataset_id) {
                debug!(dir = %dataset_dir.path().display(), "Skipping non-dataset directory");
                continue;
            }
            registry.load_dataset(&dataset_id, &dataset_dir.path())?;
        }

        Ok(registry)
    }

    fn load_dataset(&self, dataset_id: &str, dir: &Path) -> Result<()> {
        let staging = dir.join(STAGING_DIR);
        if staging.exists() {
            match fs::remove_dir_all(&staging) {
                Ok(()) => info!(dataset = %dataset_id, "Removed leftover staging directory"),
                Err(e) => warn!(dataset = %dataset_id, error = %e, "Failed to clear staging directory"),
            }
        }

        let mut version_ids = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if entry.file_type()?.is_dir() && parse_version_id(&name).is_some() {
                version_ids.push(name);
            }
        }
        version_ids.sort_by(|a, b| compare_version_ids(a, b));

        let mut newest = None;
        for version_id in version_ids {
            let version_dir = dir.join(&version_id);
            match DatasetVersion::load(&version_dir) {
                Ok(version) if version.dataset_id() == dataset_id => {
                    self.register(dataset_id, version)?;
                    newest = Some(version_id);
                }
                Ok(version) => warn!(
                    dataset = %dataset_id,
                    version = %version_id,
                    manifest_dataset = %version.dataset_id(),
                    "Skipping version whose manifest names another dataset"
                ),
                Err(e) => warn!(
                    dataset = %dataset_id,
                    version = %version_id,
                    error = %e,
                    "Skipping invalid version directory"
                ),
            }
        }

        if let Some(version_id) = newest {
            self.promote(dataset_id, &version_id)?;
        }
        Ok(())
    }

    /// Root directory of the registry.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of one version.
    pub fn version_dir(&self, dataset_id: &str, version_id: &str) -> PathBuf {
        self.root.join(dataset_id).join(version_id)
    }

    /// Fresh scratch directory for staging a new version. Not created.
    pub fn stage_dir(&self, dataset_id: &str) -> Result<PathBuf> {
        if !is_valid_id(dataset_id) {
            return Err(RegistryError::InvalidId(dataset_id.to_string()));
        }
        Ok(self
            .root
            .join(dataset_id)
            .join(STAGING_DIR)
            .join(uuid::Uuid::new_v4().simple().to_string()))
    }

    /// Version id for a version created at `now`, unique within the dataset.
    ///
    /// A collision with a registered version or an existing directory adds
    /// a `-N` suffix.
    pub fn next_version_id(&self, dataset_id: &str, now: DateTime<Utc>) -> String {
        let base = version_id_for(now);
        let datasets = self.read_datasets();
        let taken = |id: &str| {
            datasets
                .get(dataset_id)
                .map_or(false, |e| e.find(id).is_some())
                || self.version_dir(dataset_id, id).exists()
        };

        if !taken(&base) {
            return base;
        }
        (1u32..)
            .map(|n| format!("{}-{}", base, n))
            .find(|id| !taken(id))
            .unwrap_or(base)
    }

    /// Append a fully written version to a dataset's history.
    ///
    /// Does not activate it.
    pub fn register(&self, dataset_id: &str, version: DatasetVersion) -> Result<Arc<DatasetVersion>> {
        if !is_valid_id(dataset_id) {
            return Err(RegistryError::InvalidId(dataset_id.to_string()));
        }
        if version.dataset_id() != dataset_id {
            return Err(RegistryError::invalid_version(format!(
                "version '{}' belongs to dataset '{}', not '{}'",
                version.version_id(),
                version.dataset_id(),
                dataset_id
            )));
        }
        // The directory may have been removed since the version was loaded
        let version = DatasetVersion::load(version.dir())?;

        let mut datasets = self.write_datasets();
        let entry = datasets.entry(dataset_id.to_string()).or_default();
        if entry.find(version.version_id()).is_some() {
            return Err(RegistryError::AlreadyExists {
                dataset: dataset_id.to_string(),
                version: version.version_id().to_string(),
            });
        }

        let slot = VersionSlot::new(version);
        let registered = Arc::clone(slot.version());
        let pos = entry
            .versions
            .partition_point(|s| {
                compare_version_ids(s.version().version_id(), registered.version_id()).is_lt()
            });
        entry.versions.insert(pos, slot);

        info!(
            dataset = %dataset_id,
            version = %registered.version_id(),
            versions = entry.versions.len(),
            "Registered version"
        );
        Ok(registered)
    }

    /// Make a registered version the active one.
    ///
    /// Queries that already hold a handle keep reading the previous version.
    pub fn promote(&self, dataset_id: &str, version_id: &str) -> Result<Arc<DatasetVersion>> {
        let mut datasets = self.write_datasets();
        let entry = datasets
            .get_mut(dataset_id)
            .ok_or_else(|| RegistryError::dataset_not_found(dataset_id))?;
        let slot = entry
            .find(version_id)
            .filter(|s| !s.is_pruned())
            .cloned()
            .ok_or_else(|| RegistryError::version_not_found(dataset_id, version_id))?;

        let previous = entry
            .active
            .replace(Arc::clone(&slot))
            .map(|s| s.version().version_id().to_string());

        info!(
            dataset = %dataset_id,
            version = %version_id,
            previous = ?previous,
            "Promoted version"
        );
        Ok(Arc::clone(slot.version()))
    }

    /// The active version of a dataset.
    pub fn get_active(&self, dataset_id: &str) -> Result<Arc<DatasetVersion>> {
        let datasets = self.read_datasets();
        datasets
            .get(dataset_id)
            .and_then(|e| e.active.as_ref())
            .map(|s| Arc::clone(s.version()))
            .ok_or_else(|| RegistryError::dataset_not_found(dataset_id))
    }

    /// Pin the active version for the duration of a query.
    pub fn acquire(&self, dataset_id: &str) -> Result<VersionHandle> {
        const ATTEMPTS: usize = 3;

        let mut last = String::new();
        for _ in 0..ATTEMPTS {
            let slot = {
                let datasets = self.read_datasets();
                datasets
                    .get(dataset_id)
                    .and_then(|e| e.active.clone())
                    .ok_or_else(|| RegistryError::dataset_not_found(dataset_id))?
            };
            // A promote followed by a prune can retire the slot between the
            // lock release and the increment; the next active one is fine
            if let Some(handle) = slot.acquire(Arc::clone(&self.chunk_cache), self.read_concurrency)
            {
                return Ok(handle);
            }
            last = slot.version().version_id().to_string();
        }
        Err(RegistryError::version_not_found(dataset_id, &last))
    }

    /// Pin a specific retained version.
    pub fn acquire_version(&self, dataset_id: &str, version_id: &str) -> Result<VersionHandle> {
        let slot = {
            let datasets = self.read_datasets();
            let entry = datasets
                .get(dataset_id)
                .ok_or_else(|| RegistryError::dataset_not_found(dataset_id))?;
            entry
                .find(version_id)
                .cloned()
                .ok_or_else(|| RegistryError::version_not_found(dataset_id, version_id))?
        };
        slot.acquire(Arc::clone(&self.chunk_cache), self.read_concurrency)
            .ok_or_else(|| RegistryError::version_not_found(dataset_id, version_id))
    }

    /// Version history of a dataset, oldest first.
    pub fn list(&self, dataset_id: &str) -> Result<Vec<VersionListing>> {
        let datasets = self.read_datasets();
        let entry = datasets
            .get(dataset_id)
            .ok_or_else(|| RegistryError::dataset_not_found(dataset_id))?;
        let active = entry.active.as_ref();

        Ok(entry
            .versions
            .iter()
            .map(|slot| VersionListing {
                version: Arc::clone(slot.version()),
                active: active.map_or(false, |a| Arc::ptr_eq(a, slot)),
                in_flight: slot.in_flight(),
            })
            .collect())
    }

    /// Ids of all known datasets.
    pub fn datasets(&self) -> Vec<String> {
        self.read_datasets().keys().cloned().collect()
    }

    /// Retire all but the `keep` most recent versions.
    ///
    /// The active version is never pruned. Versions still pinned by a handle
    /// are unlisted now and deleted when the last handle drops.
    pub fn prune(&self, dataset_id: &str, keep: usize) -> Result<PruneReport> {
        let retired = {
            let mut datasets = self.write_datasets();
            let entry = datasets
                .get_mut(dataset_id)
                .ok_or_else(|| RegistryError::dataset_not_found(dataset_id))?;

            let cutoff = entry.versions.len().saturating_sub(keep);
            let active = entry.active.clone();
            let mut retired = Vec::new();
            let mut kept = Vec::with_capacity(entry.versions.len());
            for (i, slot) in entry.versions.drain(..).enumerate() {
                let is_active = active.as_ref().map_or(false, |a| Arc::ptr_eq(a, &slot));
                if i < cutoff && !is_active {
                    retired.push(slot);
                } else {
                    kept.push(slot);
                }
            }
            entry.versions = kept;
            retired
        };

        // Deletion happens outside the lock
        let mut report = PruneReport::default();
        for slot in retired {
            let version_id = slot.version().version_id().to_string();
            if slot.prune() {
                report.removed.push(version_id);
            } else {
                info!(
                    dataset = %dataset_id,
                    version = %version_id,
                    in_flight = slot.in_flight(),
                    "Deferred deletion of pinned version"
                );
                report.deferred.push(version_id);
            }
        }

        if !report.removed.is_empty() || !report.deferred.is_empty() {
            info!(
                dataset = %dataset_id,
                keep,
                removed = report.removed.len(),
                deferred = report.deferred.len(),
                "Pruned versions"
            );
        }
        Ok(report)
    }

    fn read_datasets(&self) -> RwLockReadGuard<'_, BTreeMap<String, DatasetEntry>> {
        // A panic while holding the lock cannot leave the map half-updated
        self.datasets.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_datasets(&self) -> RwLockWriteGuard<'_, BTreeMap<String, DatasetEntry>> {
        self.datasets.write().unwrap_or_else(|e| e.into_inner())
    }
}
