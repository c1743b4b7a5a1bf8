//! Dataset versions and the reference-counted handles that pin them.

use std::cmp::Ordering as CmpOrdering;
use std::fs;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use grid_processor::{ChunkCache, DatasetExtent, ZarrStoreReader, STORE_DIR_NAME};
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, warn};

use crate::error::{RegistryError, Result};
use crate::manifest::{Manifest, MANIFEST_FILE};

const VERSION_TIME_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Format a version id from a creation instant, e.g. `20240101T060000Z`.
pub fn version_id_for(created_at: DateTime<Utc>) -> String {
    created_at.format(VERSION_TIME_FORMAT).to_string()
}

/// Split a version id into its timestamp and collision suffix.
///
/// Returns `None` unless the id is `YYYYMMDDTHHMMSSZ` optionally followed by
/// `-N` with `N >= 1`.
pub fn parse_version_id(id: &str) -> Option<(DateTime<Utc>, u32)> {
    let (stamp, suffix) = match id.split_once('-') {
        Some((stamp, n)) => {
            if n.is_empty() || !n.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let n: u32 = n.parse().ok()?;
            if n == 0 {
                return None;
            }
            (stamp, n)
        }
        None => (id, 0),
    };
    if stamp.len() != 16 {
        return None;
    }
    let naive = NaiveDateTime::parse_from_str(stamp, VERSION_TIME_FORMAT).ok()?;
    Some((naive.and_utc(), suffix))
}

/// Ordering of version ids by creation time, then suffix.
///
/// Unparseable ids sort before valid ones, by string.
pub fn compare_version_ids(a: &str, b: &str) -> CmpOrdering {
    match (parse_version_id(a), parse_version_id(b)) {
        (Some(ka), Some(kb)) => ka.cmp(&kb),
        (None, Some(_)) => CmpOrdering::Less,
        (Some(_), None) => CmpOrdering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Dataset and version ids become directory names; keep them boring.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && !id.starts_with('.')
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.')
}

/// An immutable, committed snapshot of a dataset.
#[derive(Debug, Clone)]
pub struct DatasetVersion {
    dir: PathBuf,
    manifest: Manifest,
}

impl DatasetVersion {
    /// Load a committed version directory.
    ///
    /// Fails with `InvalidVersion` when the manifest or the store is missing,
    /// or the manifest does not name this directory.
    pub fn load(dir: &Path) -> Result<Self> {
        if !dir.join(MANIFEST_FILE).is_file() {
            return Err(RegistryError::invalid_version(format!(
                "{} has no {}",
                dir.display(),
                MANIFEST_FILE
            )));
        }
        if !dir.join(STORE_DIR_NAME).is_dir() {
            return Err(RegistryError::invalid_version(format!(
                "{} has no {}",
                dir.display(),
                STORE_DIR_NAME
            )));
        }

        let manifest = Manifest::read(dir)
            .map_err(|e| RegistryError::invalid_version(e.to_string()))?;

        let dir_name = dir.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if manifest.version_id != dir_name {
            return Err(RegistryError::invalid_version(format!(
                "manifest names version '{}' but lives in '{}'",
                manifest.version_id, dir_name
            )));
        }
        if parse_version_id(&manifest.version_id).is_none() {
            return Err(RegistryError::invalid_version(format!(
                "malformed version id '{}'",
                manifest.version_id
            )));
        }
        if manifest.extent.temporal.instants.is_empty() || manifest.variables.is_empty() {
            return Err(RegistryError::invalid_version(format!(
                "manifest of '{}' has no instants or no variables",
                manifest.version_id
            )));
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            manifest,
        })
    }

    pub fn dataset_id(&self) -> &str {
        &self.manifest.dataset_id
    }

    pub fn version_id(&self) -> &str {
        &self.manifest.version_id
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn extent(&self) -> &DatasetExtent {
        &self.manifest.extent
    }

    /// Version directory holding the store and the manifest.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn store_path(&self) -> PathBuf {
        self.dir.join(STORE_DIR_NAME)
    }
}

/// Registry-internal state of one version.
///
/// `refs` counts live [`VersionHandle`]s. Once `pruned` is set no new handle
/// can be taken and the storage is deleted by whoever sees the count at zero.
pub(crate) struct VersionSlot {
    version: Arc<DatasetVersion>,
    refs: AtomicUsize,
    pruned: AtomicBool,
    deleted: AtomicBool,
    reader: OnceCell<Arc<ZarrStoreReader>>,
}

impl VersionSlot {
    pub(crate) fn new(version: DatasetVersion) -> Arc<Self> {
        Arc::new(Self {
            version: Arc::new(version),
            refs: AtomicUsize::new(0),
            pruned: AtomicBool::new(false),
            deleted: AtomicBool::new(false),
            reader: OnceCell::new(),
        })
    }

    pub(crate) fn version(&self) -> &Arc<DatasetVersion> {
        &self.version
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.refs.load(Ordering::SeqCst)
    }

    pub(crate) fn is_pruned(&self) -> bool {
        self.pruned.load(Ordering::SeqCst)
    }

    /// Take a handle unless the version has been pruned.
    ///
    /// The counter is bumped before the flag is checked, and prune sets the
    /// flag before it reads the counter, so one side always sees the other.
    pub(crate) fn acquire(
        self: &Arc<Self>,
        chunk_cache: Arc<RwLock<ChunkCache>>,
        read_concurrency: usize,
    ) -> Option<VersionHandle> {
        self.refs.fetch_add(1, Ordering::SeqCst);
        let handle = VersionHandle {
            slot: Arc::clone(self),
            chunk_cache,
            read_concurrency,
        };
        if self.is_pruned() {
            // Dropping runs the normal release path, which may delete
            drop(handle);
            return None;
        }
        Some(handle)
    }

    /// Mark as pruned. Returns true when storage was deleted right away.
    pub(crate) fn prune(&self) -> bool {
        self.pruned.store(true, Ordering::SeqCst);
        if self.refs.load(Ordering::SeqCst) == 0 {
            self.delete_storage();
            true
        } else {
            false
        }
    }

    fn release(&self) {
        let previous = self.refs.fetch_sub(1, Ordering::SeqCst);
        if previous == 1 && self.is_pruned() {
            debug!(
                dataset = %self.version.dataset_id(),
                version = %self.version.version_id(),
                "Last handle released on pruned version"
            );
            self.delete_storage();
        }
    }

    /// Remove the version directory. Runs at most once.
    fn delete_storage(&self) {
        if self
            .deleted
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        match fs::remove_dir_all(self.version.dir()) {
            Ok(()) => info!(
                dataset = %self.version.dataset_id(),
                version = %self.version.version_id(),
                "Deleted pruned version"
            ),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                dataset = %self.version.dataset_id(),
                version = %self.version.version_id(),
                error = %e,
                "Failed to delete pruned version"
            ),
        }
    }
}

/// A pinned reference to a dataset version.
///
/// While any handle exists the version's storage stays on disk, even after it
/// has been pruned. Dropping the handle releases the pin on every exit path.
pub struct VersionHandle {
    slot: Arc<VersionSlot>,
    chunk_cache: Arc<RwLock<ChunkCache>>,
    read_concurrency: usize,
}

impl VersionHandle {
    pub fn version(&self) -> &Arc<DatasetVersion> {
        &self.slot.version
    }

    /// Reader for the version's store, opened on first use and shared by all
    /// handles of the same version.
    pub async fn reader(&self) -> Result<Arc<ZarrStoreReader>> {
        let reader = self
            .slot
            .reader
            .get_or_try_init(|| async {
                let path = self.slot.version.store_path();
                let cache = Arc::clone(&self.chunk_cache);
                let concurrency = self.read_concurrency;
                let reader = tokio::task::spawn_blocking(move || {
                    ZarrStoreReader::open(&path, cache, concurrency)
                })
                .await
                .map_err(|e| RegistryError::Io(std::io::Error::other(e.to_string())))??;
                Ok::<_, RegistryError>(Arc::new(reader))
            })
            .await?;
        Ok(Arc::clone(reader))
    }
}

impl Deref for VersionHandle {
    type Target = DatasetVersion;

    fn deref(&self) -> &Self::Target {
        &self.slot.version
    }
}

impl Drop for VersionHandle {
    fn drop(&mut self) {
        self.slot.release();
    }
}

impl std::fmt::Debug for VersionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionHandle")
            .field("dataset", &self.slot.version.dataset_id())
            .field("version", &self.slot.version.version_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_version_id_format() {
        let t = Utc.with_ymd_and_hms(2024, 3, 9, 6, 5, 4).unwrap();
        assert_eq!(version_id_for(t), "20240309T060504Z");
        assert_eq!(parse_version_id("20240309T060504Z"), Some((t, 0)));
        assert_eq!(parse_version_id("20240309T060504Z-3"), Some((t, 3)));
    }

    #[test]
    fn test_invalid_version_ids() {
        for id in [
            "",
            "latest",
            "20240309T060504",
            "20240309T060504Z-",
            "20240309T060504Z-0",
            "20240309T060504Z-x",
            "20241309T060504Z",
            ".staging",
        ] {
            assert!(parse_version_id(id).is_none(), "{id} should be rejected");
        }
    }

    #[test]
    fn test_version_ordering_uses_numeric_suffix() {
        let mut ids = vec![
            "20240101T000000Z-10",
            "20240102T000000Z",
            "20240101T000000Z-2",
            "20240101T000000Z",
        ];
        ids.sort_by(|a, b| compare_version_ids(a, b));
        assert_eq!(
            ids,
            vec![
                "20240101T000000Z",
                "20240101T000000Z-2",
                "20240101T000000Z-10",
                "20240102T000000Z",
            ]
        );
    }

    #[test]
    fn test_valid_ids() {
        assert!(is_valid_id("waves"));
        assert!(is_valid_id("gfs-wave_pacific.0p25"));
        assert!(!is_valid_id(""));
        assert!(!is_valid_id(".staging"));
        assert!(!is_valid_id("../etc"));
        assert!(!is_valid_id("a/b"));
    }

    #[test]
    fn test_load_rejects_incomplete_directory() {
        let dir = tempfile::tempdir().unwrap();
        let version_dir = dir.path().join("20240101T000000Z");
        fs::create_dir_all(version_dir.join(STORE_DIR_NAME)).unwrap();

        let err = DatasetVersion::load(&version_dir).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidVersion(_)));
    }
}
