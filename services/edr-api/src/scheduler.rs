//! Periodic reloads.

use std::sync::Arc;
use std::time::Duration;

use ingestion::ReloadPipeline;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Runs a reload every `interval` until shutdown.
pub struct ReloadScheduler {
    pipeline: Arc<ReloadPipeline>,
    interval: Duration,
}

impl ReloadScheduler {
    pub fn new(pipeline: Arc<ReloadPipeline>, interval: Duration) -> Self {
        Self { pipeline, interval }
    }

    /// Reload immediately, then once per interval. A failed reload is logged
    /// and retried at the next tick; the active version is left as it was.
    pub async fn run_forever(&self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            dataset = %self.pipeline.dataset_id(),
            interval_secs = self.interval.as_secs(),
            "Reload scheduler started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // The first tick completes immediately
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {}
            }

            // A reload in flight is abandoned on shutdown; nothing is promoted
            tokio::select! {
                result = self.pipeline.reload_latest() => {
                    if let Err(e) = result {
                        error!(
                            dataset = %self.pipeline.dataset_id(),
                            error = %e,
                            "Scheduled reload failed"
                        );
                    }
                }
                _ = shutdown.recv() => break,
            }
        }

        info!("Shutting down reload scheduler");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ingestion::{FetchError, ForecastSource, IngestionConfig, RawGrid};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use test_utils::{temp_registry, DATASET_ID};

    struct CountingSource {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ForecastSource for CountingSource {
        async fn fetch(&self) -> Result<RawGrid, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::Permanent("nothing yet".to_string()))
        }

        fn describe(&self) -> String {
            "counting".to_string()
        }
    }

    #[tokio::test]
    async fn test_scheduler_reloads_until_shutdown() {
        let (_dir, registry) = temp_registry();
        let calls = Arc::new(AtomicUsize::new(0));
        let source = Arc::new(CountingSource {
            calls: Arc::clone(&calls),
        });
        let config = IngestionConfig {
            dataset_id: DATASET_ID.to_string(),
            ..Default::default()
        };
        let pipeline = Arc::new(ReloadPipeline::new(
            source,
            registry,
            grid_processor::ChunkedStoreWriter::new(Default::default()),
            config,
        ));

        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let scheduler = ReloadScheduler::new(pipeline, Duration::from_millis(10));
        let task = tokio::spawn({
            let shutdown = shutdown_tx.subscribe();
            async move { scheduler.run_forever(shutdown).await }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();

        assert!(calls.load(Ordering::SeqCst) >= 2);
    }
}
