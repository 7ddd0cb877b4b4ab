//! Hash-structured key-value backends.

mod json_store;
mod memory;

pub use json_store::JsonStore;
pub use memory::MemoryStore;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::StoreResult;

/// A flat record: field name → string value.
pub type Record = BTreeMap<String, String>;

/// Trait for hash-structured key-value storage.
///
/// Records are addressed by key (`transmons:q06`); each record is a flat map of
/// string fields. Edits through [`HashStore::update`] are applied under the
/// backend's write lock, so a read-modify-write inside one edit is atomic.
#[async_trait]
pub trait HashStore: Send + Sync {
    /// Read one field.
    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>>;

    /// Read a whole record. Missing records are empty.
    async fn hgetall(&self, key: &str) -> StoreResult<Record>;

    /// Apply `edit` to the record at `key`, creating it if needed.
    async fn update(
        &self,
        key: &str,
        edit: &mut (dyn for<'r> FnMut(&'r mut Record) + Send),
    ) -> StoreResult<()>;

    /// List keys starting with `prefix`, sorted.
    async fn keys(&self, prefix: &str) -> StoreResult<Vec<String>>;

    /// Write one field.
    async fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        self.update(key, &mut |record| {
            record.insert(field.to_string(), value.to_string());
        })
        .await
    }

    /// Check whether a field exists.
    async fn hexists(&self, key: &str, field: &str) -> StoreResult<bool> {
        Ok(self.hget(key, field).await?.is_some())
    }
}
