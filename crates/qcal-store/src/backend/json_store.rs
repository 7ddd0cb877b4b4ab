//! JSON file-based backend.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use tokio::fs;
use tokio::sync::RwLock;

use super::{HashStore, Record};
use crate::error::{StoreError, StoreResult};

/// JSON file-based hash store.
///
/// Keeps every record in memory and rewrites the whole file after each
/// update. Suitable for a single-operator calibration setup, not for
/// concurrent writers in separate processes.
pub struct JsonStore {
    /// Backing file.
    path: PathBuf,

    /// In-memory copy of the file.
    records: RwLock<FxHashMap<String, Record>>,
}

impl JsonStore {
    /// Open the store at `path`, creating an empty one if the file is absent.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let records = match fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => FxHashMap::default(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => FxHashMap::default(),
            Err(e) => return Err(StoreError::IoError(e)),
        };
        tracing::debug!("Opened parameter store {:?} ({} records)", path, records.len());

        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrite the backing file through a temporary sibling and a rename.
    async fn flush(&self, records: &FxHashMap<String, Record>) -> StoreResult<()> {
        // Sorted output keeps the file diffable.
        let sorted: std::collections::BTreeMap<_, _> = records.iter().collect();
        let json = serde_json::to_string_pretty(&sorted)?;
        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        fs::write(&staging, json).await?;
        fs::rename(&staging, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl HashStore for JsonStore {
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
        let previous = records.get(key).cloned();
        edit(records.entry(key.to_string()).or_default());

        if let Err(e) = self.flush(&records).await {
            match previous {
                Some(record) => records.insert(key.to_string(), record),
                None => records.remove(key),
            };
            return Err(e);
        }
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
