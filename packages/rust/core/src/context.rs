//! Wiring: build each collaborator once and hand out the two entry points.

use std::path::Path;
use std::sync::Arc;

use rowpipe_gateways::{Notifier, ObjectSource, notifier_from_config, object_source_from_config};
use rowpipe_shared::{AppConfig, EnrichmentConfig, Result, StoreConfig};
use rowpipe_storage::{MemoryStore, Storage, StoreGateway};
use tracing::{debug, instrument};

use crate::api::RecordService;
use crate::batch::BatchIngestor;
use crate::clock::{Clock, SystemClock};
use crate::enricher::Enricher;

/// Store endpoint that selects the in-process store.
pub const MEMORY_STORE: &str = "memory";

/// Open the configured store. `readonly` applies to local files only; tooling
/// that only reads uses it to skip migrations and refuse writes.
pub async fn open_store(config: &StoreConfig, readonly: bool) -> Result<Arc<dyn StoreGateway>> {
    if config.endpoint == MEMORY_STORE {
        debug!("using in-memory store");
        return Ok(Arc::new(MemoryStore::new()));
    }
    if readonly && !config.is_remote() {
        return Ok(Arc::new(
            Storage::open_readonly(Path::new(&config.endpoint)).await?,
        ));
    }
    Ok(Arc::new(Storage::connect(config).await?))
}

/// Everything an entry point needs, built once per process.
pub struct Pipeline {
    pub store: Arc<dyn StoreGateway>,
    pub batch: BatchIngestor,
    pub records: Arc<RecordService>,
}

impl Pipeline {
    /// Open the store and build the adapters named in `config`.
    #[instrument(skip_all)]
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let store = open_store(&config.store, false).await?;
        let source = object_source_from_config(&config.object_source)?;
        let notifier = notifier_from_config(&config.notifier)?;
        debug!(remote_store = config.store.is_remote(), "pipeline configured");

        Ok(Self::assemble(
            &config.enrichment,
            store,
            source,
            notifier,
            Arc::new(SystemClock::new()),
        ))
    }

    /// Assemble from already-built collaborators.
    pub fn assemble(
        enrichment: &EnrichmentConfig,
        store: Arc<dyn StoreGateway>,
        source: Arc<dyn ObjectSource>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let enricher = Arc::new(Enricher::new(clock, enrichment));
        let batch = BatchIngestor::new(
            source,
            store.clone(),
            notifier.clone(),
            enricher.clone(),
            enrichment.delimiter,
        );
        let records = Arc::new(RecordService::new(store.clone(), notifier, enricher));

        Self {
            store,
            batch,
            records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowpipe_shared::Locator;

    #[tokio::test]
    async fn memory_endpoint_selects_in_process_store() {
        let config = StoreConfig {
            endpoint: MEMORY_STORE.into(),
            ..StoreConfig::default()
        };
        let store = open_store(&config, false).await.unwrap();
        assert!(store.scan(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn from_config_with_local_collaborators() {
        let dir = std::env::temp_dir().join(format!("rowpipe-ctx-{}", uuid::Uuid::now_v7()));
        let objects = dir.join("objects");
        std::fs::create_dir_all(objects.join("uploads")).unwrap();
        std::fs::write(
            objects.join("uploads").join("items.csv"),
            "id,nome,preco\n1,Widget,2.5\n,Orphan,1\n",
        )
        .unwrap();

        let mut config = AppConfig::default();
        config.store = StoreConfig {
            endpoint: dir.join("rowpipe.db").to_string_lossy().into_owned(),
            ..StoreConfig::default()
        };
        config.object_source.root = objects.to_string_lossy().into_owned();

        let pipeline = Pipeline::from_config(&config).await.unwrap();
        let outcome = pipeline
            .batch
            .run(
                &Locator::new("uploads", "items.csv"),
                &crate::batch::SilentProgress,
            )
            .await
            .unwrap();
        assert_eq!(outcome.succeeded, 1);
        assert_eq!(outcome.rejected, 1);

        let stored = pipeline.store.query("1").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].price, 2.5);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
