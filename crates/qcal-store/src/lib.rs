//! qcal parameter store
//!
//! Typed, reversible access to the hash-structured store that holds every
//! calibrated device parameter.
//!
//! # Layout
//!
//! | Record key | Contents |
//! |------------|----------|
//! | `transmons:<qubit>` | qubit parameters, e.g. `clock_freqs:f01` |
//! | `couplers:<coupler>` | coupler parameters |
//! | `cs:<element>` | calibration status per node (`calibrated` / `not_calibrated`) |
//!
//! A parameter awaiting recalibration holds the literal `"nan"`. Before a node
//! overwrites a field it calls [`ParameterStore::backup`], which keeps the old
//! value in `<field>_backup`. Backups are only removed by hand.
//!
//! # Example
//!
//! ```rust
//! use qcal_core::PhysicalElement;
//! use qcal_store::{BackupOutcome, ParameterStore, ParameterValue};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> qcal_store::StoreResult<()> {
//! let store = ParameterStore::in_memory();
//! let q00 = PhysicalElement::qubit("q00");
//!
//! store.set(&q00, "clock_freqs:f01", "4.1e9").await?;
//! store.backup(&q00, "clock_freqs:f01").await?;
//!
//! assert_eq!(store.parameter(&q00, "clock_freqs:f01").await?, ParameterValue::Uncalibrated);
//! assert_eq!(store.backup(&q00, "clock_freqs:f01").await?, BackupOutcome::AlreadyBackedUp);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod error;
pub mod keys;
pub mod mirror;
pub mod store;

pub use backend::{HashStore, JsonStore, MemoryStore, Record};
pub use error::{StoreError, StoreResult};
pub use keys::{NodeStatus, UNCALIBRATED, backup_field, record_key, status_key};
pub use mirror::{MemoryMirror, MirrorEntry, MirrorSink, SqliteMirror};
pub use store::{BackupOutcome, ParameterStore, ParameterValue};
