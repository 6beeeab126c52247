//! In-process [`StoreGateway`] used by tests and dry runs.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use rowpipe_shared::{CanonicalRecord, RecordKey, RecordPatch, Result, RowpipeError};
use tokio::sync::Mutex;

use crate::{StoreGateway, stock_column};

/// Ordered map keyed by `(id, timestamp)`, same ordering as the SQL store.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<RecordKey, CanonicalRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl StoreGateway for MemoryStore {
    async fn put(&self, record: &CanonicalRecord) -> Result<()> {
        let mut records = self.records.lock().await;
        let key = record.key();
        if records.contains_key(&key) {
            return Err(RowpipeError::PersistenceFailed(format!(
                "{key}: record already exists"
            )));
        }
        stock_column(record.stock, &key)?;
        records.insert(key, record.clone());
        Ok(())
    }

    async fn get(&self, key: &RecordKey) -> Result<Option<CanonicalRecord>> {
        Ok(self.records.lock().await.get(key).cloned())
    }

    async fn scan(&self, limit: usize) -> Result<Vec<CanonicalRecord>> {
        Ok(self
            .records
            .lock()
            .await
            .values()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn query(&self, id: &str) -> Result<Vec<CanonicalRecord>> {
        Ok(self
            .records
            .lock()
            .await
            .values()
            .filter(|r| r.id == id)
            .cloned()
            .collect())
    }

    async fn update(
        &self,
        key: &RecordKey,
        patch: &RecordPatch,
    ) -> Result<Option<CanonicalRecord>> {
        if patch.is_empty() {
            return Err(RowpipeError::validation("patch has no fields to update"));
        }
        if let Some(stock) = patch.stock {
            stock_column(stock, key)?;
        }
        let mut records = self.records.lock().await;
        Ok(records.get_mut(key).map(|record| {
            patch.apply(record, Utc::now());
            record.clone()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowpipe_shared::{PROCESSOR_VERSION, Source};

    fn record(id: &str, timestamp: i64) -> CanonicalRecord {
        CanonicalRecord {
            id: id.into(),
            timestamp,
            name: "Widget".into(),
            category: "API".into(),
            price: 0.0,
            stock: 0,
            source: Source::Api("cli".into()),
            processed_at: Utc::now(),
            processor_version: PROCESSOR_VERSION.into(),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn put_rejects_existing_key() {
        let store = MemoryStore::new();
        store.put(&record("a", 1)).await.unwrap();
        assert!(store.put(&record("a", 1)).await.is_err());
        store.put(&record("a", 2)).await.unwrap();
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn stock_limit_matches_sql_store() {
        let store = MemoryStore::new();
        let huge = CanonicalRecord {
            stock: crate::MAX_STOCK + 1,
            ..record("a", 1)
        };
        let err = store.put(&huge).await.unwrap_err();
        assert_eq!(err.kind(), "persistence_failed");
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn scan_orders_by_key() {
        let store = MemoryStore::new();
        store.put(&record("b", 1)).await.unwrap();
        store.put(&record("a", 9)).await.unwrap();
        store.put(&record("a", 3)).await.unwrap();

        let keys: Vec<_> = store
            .scan(10)
            .await
            .unwrap()
            .into_iter()
            .map(|r| (r.id, r.timestamp))
            .collect();
        assert_eq!(keys, vec![("a".into(), 3), ("a".into(), 9), ("b".into(), 1)]);
        assert_eq!(store.query("a").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn update_missing_key_returns_none() {
        let store = MemoryStore::new();
        let patch = RecordPatch::parse([("stock", "5")]).unwrap();
        let key = RecordKey {
            id: "a".into(),
            timestamp: 1,
        };
        assert!(store.update(&key, &patch).await.unwrap().is_none());

        store.put(&record("a", 1)).await.unwrap();
        let updated = store.update(&key, &patch).await.unwrap().unwrap();
        assert_eq!(updated.stock, 5);
    }
}
