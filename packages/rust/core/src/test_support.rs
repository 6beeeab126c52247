//! Test doubles for the pipeline's external collaborators.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rowpipe_gateways::{Notification, Notifier, ObjectSource};
use rowpipe_shared::{
    CanonicalRecord, EnrichmentConfig, Locator, RecordKey, RecordPatch, Result, RowpipeError,
};
use rowpipe_storage::{MemoryStore, StoreGateway};

use crate::clock::FixedClock;
use crate::context::Pipeline;

/// Object source backed by a map. Locators listed in `broken` fail as unavailable.
#[derive(Default)]
pub(crate) struct MapSource {
    objects: HashMap<Locator, Vec<u8>>,
    broken: HashSet<Locator>,
}

impl MapSource {
    pub(crate) fn with(mut self, locator: &Locator, bytes: impl Into<Vec<u8>>) -> Self {
        self.objects.insert(locator.clone(), bytes.into());
        self
    }

    pub(crate) fn broken(mut self, locator: &Locator) -> Self {
        self.broken.insert(locator.clone());
        self
    }
}

#[async_trait]
impl ObjectSource for MapSource {
    async fn read(&self, locator: &Locator) -> Result<Vec<u8>> {
        if self.broken.contains(locator) {
            return Err(RowpipeError::source_unavailable(locator, "connection reset"));
        }
        self.objects
            .get(locator)
            .cloned()
            .ok_or_else(|| RowpipeError::SourceNotFound(locator.to_string()))
    }
}

/// Wraps a [`MemoryStore`] and fails `put` for the listed ids.
pub(crate) struct FlakyStore {
    pub(crate) inner: MemoryStore,
    failing_ids: HashSet<String>,
    pub(crate) attempts: Mutex<Vec<String>>,
}

impl FlakyStore {
    pub(crate) fn failing(ids: &[&str]) -> Self {
        Self {
            inner: MemoryStore::new(),
            failing_ids: ids.iter().map(|s| s.to_string()).collect(),
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn attempted(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl StoreGateway for FlakyStore {
    async fn put(&self, record: &CanonicalRecord) -> Result<()> {
        self.attempts.lock().unwrap().push(record.id.clone());
        if self.failing_ids.contains(&record.id) {
            return Err(RowpipeError::PersistenceFailed(format!(
                "{}: throttled",
                record.key()
            )));
        }
        self.inner.put(record).await
    }

    async fn get(&self, key: &RecordKey) -> Result<Option<CanonicalRecord>> {
        self.inner.get(key).await
    }

    async fn scan(&self, limit: usize) -> Result<Vec<CanonicalRecord>> {
        self.inner.scan(limit).await
    }

    async fn query(&self, id: &str) -> Result<Vec<CanonicalRecord>> {
        self.inner.query(id).await
    }

    async fn update(
        &self,
        key: &RecordKey,
        patch: &RecordPatch,
    ) -> Result<Option<CanonicalRecord>> {
        self.inner.update(key, patch).await
    }
}

/// Records every notification; optionally fails after recording.
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    pub(crate) sent: Mutex<Vec<Notification>>,
    fail: bool,
}

impl RecordingNotifier {
    pub(crate) fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub(crate) fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn publish(&self, notification: &Notification) -> Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        if self.fail {
            return Err(RowpipeError::NotificationFailed("topic unreachable".into()));
        }
        Ok(())
    }
}

/// Assemble a pipeline over the given doubles with a fixed clock.
pub(crate) fn pipeline(
    store: Arc<dyn StoreGateway>,
    source: Arc<dyn ObjectSource>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<FixedClock>,
) -> Pipeline {
    Pipeline::assemble(&EnrichmentConfig::default(), store, source, notifier, clock)
}
