//! The reload pipeline: fetch, normalize, write, register, promote, prune.
//!
//! ```text
//! ForecastSource::fetch ──(retry on transient)──► RawGrid
//!      │
//!      ▼
//! normalize (blocking pool) ──► Grid ──► compute_extent
//!      │
//!      ├─► same reference time and extent as the active version? ──► Unchanged
//!      │
//!      ▼
//! ChunkedStoreWriter::write ──► manifest ──► fsync   (blocking pool)
//!      │
//!      ▼
//! StagedStore::commit ──► register ──► promote ──► prune
//! ```
//!
//! The active version only changes at `promote`. Any failure before that,
//! including hitting the deadline or dropping the reload future, leaves it
//! untouched; the staged store is deleted when dropped. The blocking pool
//! never commits, so an abandoned write cannot leave a version directory
//! behind.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use grid_processor::{
    compute_extent, ChunkedStoreWriter, DatasetExtent, Grid, StagedStore, StoreAttributes,
};
use serde::Serialize;
use storage::{DatasetRegistry, DatasetVersion, Manifest, RegistryError};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{IngestionConfig, RetryConfig};
use crate::error::{IngestionError, Result};
use crate::normalize::normalize;
use crate::raw::RawGrid;
use crate::source::{FetchError, ForecastSource};

/// Result of a successful reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReloadOutcome {
    /// A new version was written and is now active.
    Promoted { version_id: String },
    /// Upstream had nothing new; the active version stays.
    Unchanged { version_id: String },
}

impl ReloadOutcome {
    pub fn version_id(&self) -> &str {
        match self {
            Self::Promoted { version_id } | Self::Unchanged { version_id } => version_id,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Promoted { .. } => "promoted",
            Self::Unchanged { .. } => "unchanged",
        }
    }
}

/// Runs reloads of one dataset. At most one reload runs at a time.
pub struct ReloadPipeline {
    source: Arc<dyn ForecastSource>,
    registry: Arc<DatasetRegistry>,
    writer: ChunkedStoreWriter,
    config: IngestionConfig,
    running: Mutex<()>,
}

impl ReloadPipeline {
    pub fn new(
        source: Arc<dyn ForecastSource>,
        registry: Arc<DatasetRegistry>,
        writer: ChunkedStoreWriter,
        config: IngestionConfig,
    ) -> Self {
        Self {
            source,
            registry,
            writer,
            config,
            running: Mutex::new(()),
        }
    }

    pub fn dataset_id(&self) -> &str {
        &self.config.dataset_id
    }

    pub fn config(&self) -> &IngestionConfig {
        &self.config
    }

    /// Fetch the newest forecast and make it the active version.
    ///
    /// Concurrent callers queue behind the running reload.
    #[instrument(skip(self), fields(dataset = %self.config.dataset_id))]
    pub async fn reload_latest(&self) -> Result<ReloadOutcome> {
        let _running = self.running.lock().await;
        let started = Instant::now();
        let deadline = self.config.deadline();

        let result = match tokio::time::timeout(deadline, self.run()).await {
            Ok(result) => result,
            Err(_) => Err(IngestionError::Timeout(deadline)),
        };

        let elapsed = started.elapsed().as_secs_f64();
        metrics::histogram!("ingestion_duration_seconds").record(elapsed);
        match &result {
            Ok(outcome) => {
                metrics::counter!("ingestion_runs_total", "outcome" => outcome.label()).increment(1);
                info!(
                    outcome = outcome.label(),
                    version = %outcome.version_id(),
                    elapsed_secs = elapsed,
                    "Reload finished"
                );
            }
            Err(e) => {
                metrics::counter!("ingestion_runs_total", "outcome" => "failed", "error" => e.kind())
                    .increment(1);
                error!(error = %e, elapsed_secs = elapsed, "Reload failed; active version unchanged");
            }
        }
        result
    }

    async fn run(&self) -> Result<ReloadOutcome> {
        let dataset_id = self.config.dataset_id.clone();

        let raw = fetch_with_retry(self.source.as_ref(), &self.config.retry).await?;
        let reference_time = raw.reference_time();
        let title = raw
            .title()
            .map(str::to_string)
            .unwrap_or_else(|| self.config.title.clone());

        let options = self.config.normalize_options();
        let grid = tokio::task::spawn_blocking(move || normalize(&raw, &options)).await??;
        let extent = compute_extent(&grid);
        info!(
            shape = ?grid.shape(),
            variables = grid.variables().len(),
            reference_time = ?reference_time,
            "Normalized forecast"
        );

        if let Ok(active) = self.registry.get_active(&dataset_id) {
            let manifest = active.manifest();
            if reference_time.is_some()
                && manifest.reference_time == reference_time
                && manifest.extent == extent
                && manifest.variables.keys().eq(grid.variables().keys())
            {
                info!(version = %active.version_id(), "Upstream unchanged; keeping active version");
                return Ok(ReloadOutcome::Unchanged {
                    version_id: active.version_id().to_string(),
                });
            }
        }

        let version_id = self.registry.next_version_id(&dataset_id, Utc::now());
        let staging = self.registry.stage_dir(&dataset_id)?;
        let job = WriteJob {
            writer: self.writer.clone(),
            grid,
            staging,
            attributes: StoreAttributes {
                dataset_id: dataset_id.clone(),
                title,
                reference_time,
            },
            version_id: version_id.clone(),
            extent,
            source: self.source.describe(),
        };
        // If this future is dropped here, the finished job's StagedStore is
        // dropped with the JoinHandle output and the staging dir goes with it.
        let staged = tokio::task::spawn_blocking(move || job.run()).await??;

        // No await from commit to promote: a committed directory is always
        // either registered or removed before this function yields.
        self.publish(&dataset_id, &version_id, staged)?;

        match self.registry.prune(&dataset_id, self.config.keep_versions) {
            Ok(report) => {
                let pruned = (report.removed.len() + report.deferred.len()) as u64;
                metrics::counter!("registry_versions_pruned_total").increment(pruned);
                debug!(removed = ?report.removed, deferred = ?report.deferred, "Pruned old versions");
            }
            // The new version is live; a failed cleanup is retried next run
            Err(e) => warn!(error = %e, "Prune after promote failed"),
        }

        Ok(ReloadOutcome::Promoted { version_id })
    }

    /// Commit the staged store, register it and make it active.
    fn publish(&self, dataset_id: &str, version_id: &str, staged: StagedStore) -> Result<()> {
        let final_dir = self.registry.version_dir(dataset_id, version_id);
        let version_dir = staged.commit(&final_dir)?;

        let registered = DatasetVersion::load(&version_dir)
            .and_then(|version| self.registry.register(dataset_id, version));
        if let Err(e) = registered {
            discard_version_dir(&version_dir, &e);
            return Err(e.into());
        }
        self.registry.promote(dataset_id, version_id)?;
        Ok(())
    }
}

/// Everything the blocking writer needs, moved onto the blocking pool.
struct WriteJob {
    writer: ChunkedStoreWriter,
    grid: Grid,
    staging: PathBuf,
    attributes: StoreAttributes,
    version_id: String,
    extent: DatasetExtent,
    source: String,
}

impl WriteJob {
    /// Write store and manifest into staging and fsync them. Never commits.
    fn run(self) -> Result<StagedStore> {
        let mut staged = self
            .writer
            .write(&self.grid, &self.staging, &self.attributes)?;

        let variables = self
            .grid
            .variables()
            .iter()
            .map(|(name, v)| (name.clone(), v.info.clone()))
            .collect();
        Manifest::from_store(
            &self.attributes.dataset_id,
            &self.version_id,
            self.extent,
            variables,
            staged.summary(),
        )
        .with_title(self.attributes.title.clone())
        .with_reference_time(self.attributes.reference_time)
        .with_source(self.source)
        .write(staged.dir())?;

        staged.sync()?;
        Ok(staged)
    }
}

fn discard_version_dir(dir: &Path, cause: &RegistryError) {
    warn!(dir = %dir.display(), error = %cause, "Removing committed version that failed to register");
    if let Err(e) = std::fs::remove_dir_all(dir) {
        warn!(dir = %dir.display(), error = %e, "Failed to remove version directory");
    }
}

/// Fetch, retrying transient failures with exponential backoff.
pub async fn fetch_with_retry(
    source: &dyn ForecastSource,
    retry: &RetryConfig,
) -> std::result::Result<RawGrid, FetchError> {
    let mut attempt = 0;
    let mut delay = retry.initial_delay();

    loop {
        match source.fetch().await {
            Ok(raw) => return Ok(raw),
            Err(e @ FetchError::Permanent(_)) => return Err(e),
            Err(e) => {
                attempt += 1;
                if attempt > retry.max_retries {
                    warn!(error = %e, attempts = attempt, "Giving up on fetch");
                    return Err(e);
                }

                warn!(
                    error = %e,
                    retry = attempt,
                    max_retries = retry.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Fetch failed, retrying"
                );
                metrics::counter!("ingestion_fetch_retries_total").increment(1);
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, retry.max_delay());
            }
        }
    }
}
