//! In-memory backend for tests and dry runs.

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use tokio::sync::RwLock;

use super::{HashStore, Record};
use crate::error::StoreResult;

/// In-memory hash store. Contents are lost when dropped.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<FxHashMap<String, Record>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with records.
    pub fn with_records(records: impl IntoIterator<Item = (String, Record)>) -> Self {
        Self {
            records: RwLock::new(records.into_iter().collect()),
        }
    }
}

#[async_trait]
impl HashStore for MemoryStore {
    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let records = self.records.read().await;
        Ok(records.get(key).and_then(|r| r.get(field)).cloned())
    }

    async fn hgetall(&self, key: &str) -> StoreResult<Record> {
        let records = self.records.read().await;
        Ok(records.get(key).cloned().unwrap_or_default())
    }

    async fn update(
        &self,
        key: &str,
        edit: &mut (dyn for<'r> FnMut(&'r mut Record) + Send),
    ) -> StoreResult<()> {
        let mut records = self.records.write().await;
        edit(records.entry(key.to_string()).or_default());
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let records = self.records.read().await;
        let mut keys: Vec<String> = records
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}
