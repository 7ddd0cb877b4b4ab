//! Typed parameter access on top of a [`HashStore`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use qcal_core::PhysicalElement;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backend::{HashStore, MemoryStore};
use crate::error::{StoreError, StoreResult};
use crate::keys::{BACKUP_SUFFIX, NodeStatus, UNCALIBRATED, backup_field, record_key, status_key};
use crate::mirror::MirrorSink;

/// A parameter as seen by the calibration chain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum ParameterValue {
    /// A calibrated numeric value.
    Calibrated(f64),
    /// The field holds the uncalibrated sentinel.
    Uncalibrated,
    /// The field does not exist yet.
    NotFound,
}

impl ParameterValue {
    /// Interpret a raw stored string.
    pub fn parse(key: &str, field: &str, raw: Option<&str>) -> StoreResult<Self> {
        match raw {
            None => Ok(ParameterValue::NotFound),
            Some(UNCALIBRATED) => Ok(ParameterValue::Uncalibrated),
            Some(raw) => raw
                .trim()
                .parse::<f64>()
                .map(|v| {
                    if v.is_finite() {
                        ParameterValue::Calibrated(v)
                    } else {
                        ParameterValue::Uncalibrated
                    }
                })
                .map_err(|_| StoreError::InvalidValue {
                    key: key.to_string(),
                    field: field.to_string(),
                    value: raw.to_string(),
                }),
        }
    }

    /// The numeric value, if calibrated.
    pub fn value(&self) -> Option<f64> {
        match self {
            ParameterValue::Calibrated(v) => Some(*v),
            _ => None,
        }
    }

    /// Whether the value can be used to build an experiment.
    pub fn is_calibrated(&self) -> bool {
        matches!(self, ParameterValue::Calibrated(_))
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Calibrated(v) => write!(f, "{v}"),
            ParameterValue::Uncalibrated => f.write_str(UNCALIBRATED),
            ParameterValue::NotFound => f.write_str("<missing>"),
        }
    }
}

/// What [`ParameterStore::backup`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    /// The previous value was copied to the backup field and the primary
    /// field was set to the sentinel.
    BackedUp {
        /// The value now held by the backup field.
        previous: String,
    },
    /// The primary field already held the sentinel and a backup exists; the
    /// backup was left untouched.
    AlreadyBackedUp,
    /// The field does not exist, so there is nothing to preserve.
    NothingToBackUp,
}

/// Handle to the calibration parameter store.
///
/// Cheap to clone; every stage receives one explicitly. Writes are mirrored
/// into the optional [`MirrorSink`].
#[derive(Clone)]
pub struct ParameterStore {
    backend: Arc<dyn HashStore>,
    mirror: Option<Arc<dyn MirrorSink>>,
}

impl ParameterStore {
    /// Wrap a backend.
    pub fn new(backend: Arc<dyn HashStore>) -> Self {
        Self {
            backend,
            mirror: None,
        }
    }

    /// A store backed by a fresh [`MemoryStore`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Attach a mirror sink.
    #[must_use]
    pub fn with_mirror(mut self, mirror: Arc<dyn MirrorSink>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    /// Raw read. A missing field is `None`.
    pub async fn get(&self, element: &PhysicalElement, field: &str) -> StoreResult<Option<String>> {
        self.backend.hget(&record_key(element), field).await
    }

    /// Typed read.
    pub async fn parameter(
        &self,
        element: &PhysicalElement,
        field: &str,
    ) -> StoreResult<ParameterValue> {
        let key = record_key(element);
        let raw = self.backend.hget(&key, field).await?;
        ParameterValue::parse(&key, field, raw.as_deref())
    }

    /// Whether the field exists.
    pub async fn exists(&self, element: &PhysicalElement, field: &str) -> StoreResult<bool> {
        self.backend.hexists(&record_key(element), field).await
    }

    /// Write a raw value.
    pub async fn set(&self, element: &PhysicalElement, field: &str, value: &str) -> StoreResult<()> {
        self.backend.hset(&record_key(element), field, value).await?;
        self.mirror_write(element, field, value).await;
        Ok(())
    }

    /// Write a numeric value. Non-finite values are stored as the sentinel.
    pub async fn set_value(
        &self,
        element: &PhysicalElement,
        field: &str,
        value: f64,
    ) -> StoreResult<()> {
        if value.is_finite() {
            self.set(element, field, &value.to_string()).await
        } else {
            self.set(element, field, UNCALIBRATED).await
        }
    }

    /// Preserve the current value of `field` before it is recalibrated.
    ///
    /// Copies the value to `<field>_backup` and writes the sentinel to `field`
    /// in one atomic edit. Calling it again before a new value is set leaves
    /// the backup untouched.
    pub async fn backup(&self, element: &PhysicalElement, field: &str) -> StoreResult<BackupOutcome> {
        let key = record_key(element);
        let shadow = backup_field(field);
        let mut outcome = BackupOutcome::NothingToBackUp;

        self.backend
            .update(&key, &mut |record| {
                outcome = match record.get(field).cloned() {
                    None => BackupOutcome::NothingToBackUp,
                    Some(current) if current == UNCALIBRATED && record.contains_key(&shadow) => {
                        BackupOutcome::AlreadyBackedUp
                    }
                    Some(current) => {
                        record.insert(shadow.clone(), current.clone());
                        record.insert(field.to_string(), UNCALIBRATED.to_string());
                        BackupOutcome::BackedUp { previous: current }
                    }
                };
            })
            .await?;

        if let BackupOutcome::BackedUp { previous } = &outcome {
            debug!("Backed up {}/{} = {}", key, field, previous);
            self.mirror_write(element, &shadow, previous).await;
            self.mirror_write(element, field, UNCALIBRATED).await;
        }
        Ok(outcome)
    }

    /// Copy `<field>_backup` back into `field`.
    ///
    /// Returns `false` when no backup exists. The backup field is kept.
    pub async fn restore_backup(&self, element: &PhysicalElement, field: &str) -> StoreResult<bool> {
        let key = record_key(element);
        let shadow = backup_field(field);
        let mut restored = None;

        self.backend
            .update(&key, &mut |record| {
                if let Some(previous) = record.get(&shadow).cloned() {
                    record.insert(field.to_string(), previous.clone());
                    restored = Some(previous);
                }
            })
            .await?;

        match restored {
            Some(value) => {
                debug!("Restored {}/{} = {}", key, field, value);
                self.mirror_write(element, field, &value).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// All parameter fields of an element, backups excluded.
    pub async fn fields(&self, element: &PhysicalElement) -> StoreResult<BTreeMap<String, String>> {
        let mut record = self.backend.hgetall(&record_key(element)).await?;
        record.retain(|field, _| !field.ends_with(BACKUP_SUFFIX));
        Ok(record)
    }

    /// Set the calibration status of `node` on `element`.
    pub async fn set_status(
        &self,
        element: &PhysicalElement,
        node: &str,
        status: NodeStatus,
    ) -> StoreResult<()> {
        self.backend
            .hset(&status_key(element), node, status.as_str())
            .await?;
        self.mirror_write(element, &format!("status:{node}"), status.as_str())
            .await;
        Ok(())
    }

    /// Calibration status of `node` on `element`; absent means not calibrated.
    pub async fn status(&self, element: &PhysicalElement, node: &str) -> StoreResult<NodeStatus> {
        match self.backend.hget(&status_key(element), node).await? {
            Some(raw) => raw.parse(),
            None => Ok(NodeStatus::NotCalibrated),
        }
    }

    /// Mark `node` as not calibrated on every element.
    pub async fn reset_node(&self, elements: &[PhysicalElement], node: &str) -> StoreResult<()> {
        for element in elements {
            self.set_status(element, node, NodeStatus::NotCalibrated)
                .await?;
        }
        debug!("Reset '{}' on {} elements", node, elements.len());
        Ok(())
    }

    /// Every recorded node status of an element.
    pub async fn statuses(
        &self,
        element: &PhysicalElement,
    ) -> StoreResult<BTreeMap<String, NodeStatus>> {
        let record = self.backend.hgetall(&status_key(element)).await?;
        record
            .into_iter()
            .map(|(node, raw)| raw.parse().map(|status| (node, status)))
            .collect()
    }

    async fn mirror_write(&self, element: &PhysicalElement, field: &str, value: &str) {
        if let Some(mirror) = &self.mirror {
            if let Err(e) = mirror.record(element, field, value).await {
                warn!("Failed to mirror {}/{}: {}", element, field, e);
            }
        }
    }
}
