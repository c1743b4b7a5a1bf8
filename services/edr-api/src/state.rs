//! Application state for the EDR API.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::RwLock;

use grid_processor::{ChunkCache, ChunkedStoreWriter};
use ingestion::ReloadPipeline;
use metrics_exporter_prometheus::PrometheusHandle;
use storage::DatasetRegistry;
use tracing::info;

use crate::config::ServiceConfig;
use crate::engine::QueryEngine;

/// Shared application state.
pub struct AppState {
    /// Resolves position, area and instance queries.
    pub engine: QueryEngine,

    /// Every version of every dataset.
    pub registry: Arc<DatasetRegistry>,

    /// Reloads the configured dataset. `None` without a configured source.
    pub pipeline: Option<Arc<ReloadPipeline>>,

    /// Base URL for building links.
    pub base_url: String,

    /// Dataset the pipeline writes; the default for admin operations.
    pub default_dataset: String,

    /// Versions kept by a prune that does not say otherwise.
    pub keep_versions: usize,

    /// Renders `/metrics`. `None` when no recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Open the registry under the configured data directory and build the
    /// reload pipeline when a source is configured.
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let cache = Arc::new(RwLock::new(ChunkCache::new(
            config.grid.chunk_cache_size_bytes(),
        )));
        let registry = DatasetRegistry::open(
            &config.data_dir,
            cache,
            config.grid.read_concurrency,
        )
        .with_context(|| format!("Failed to open registry at {}", config.data_dir.display()))?;
        let registry = Arc::new(registry);

        let pipeline = match &config.source {
            Some(source) => {
                let source = source.build().context("Failed to build forecast source")?;
                Some(Arc::new(ReloadPipeline::new(
                    source,
                    Arc::clone(&registry),
                    ChunkedStoreWriter::new(config.grid.clone()),
                    config.ingestion.clone(),
                )))
            }
            None => None,
        };

        let datasets = registry.datasets();
        info!(
            data_dir = %config.data_dir.display(),
            datasets = ?datasets,
            reload_enabled = pipeline.is_some(),
            "Registry opened"
        );

        Ok(Self::from_parts(registry, pipeline, config))
    }

    /// Assemble state around an existing registry.
    pub fn from_parts(
        registry: Arc<DatasetRegistry>,
        pipeline: Option<Arc<ReloadPipeline>>,
        config: &ServiceConfig,
    ) -> Self {
        Self {
            engine: QueryEngine::new(Arc::clone(&registry), config.limits.clone()),
            registry,
            pipeline,
            base_url: config.base_url.clone(),
            default_dataset: config.ingestion.dataset_id.clone(),
            keep_versions: config.ingestion.keep_versions,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
