//! Secondary structured storage that mirrors every parameter write.
//!
//! Browsing tools read parameter histories from the mirror instead of the live
//! store. A mirror is strictly best effort: the [`ParameterStore`] logs mirror
//! failures and carries on.
//!
//! [`ParameterStore`]: crate::ParameterStore

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use qcal_core::PhysicalElement;
use rusqlite::Connection;

use crate::error::{StoreError, StoreResult};

/// One mirrored write.
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorEntry {
    /// Element the field belongs to.
    pub element: String,
    /// Field name.
    pub field: String,
    /// Written value.
    pub value: String,
    /// Time of the write.
    pub recorded_at: DateTime<Utc>,
}

/// Trait for write mirrors.
#[async_trait]
pub trait MirrorSink: Send + Sync {
    /// Record that `field` of `element` now holds `value`.
    async fn record(&self, element: &PhysicalElement, field: &str, value: &str)
    -> StoreResult<()>;
}

/// SQLite-backed mirror.
///
/// Keeps the latest value per (element, field) in `parameters` and appends
/// every write to `parameter_history`.
pub struct SqliteMirror {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMirror {
    /// Open (or create) a mirror database at the given path.
    pub fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let mirror = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        mirror.init_schema()?;
        Ok(mirror)
    }

    /// Create an in-memory mirror.
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let mirror = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        mirror.init_schema()?;
        Ok(mirror)
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS parameters (
                element TEXT NOT NULL,
                field TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (element, field)
            );

            CREATE TABLE IF NOT EXISTS parameter_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                element TEXT NOT NULL,
                field TEXT NOT NULL,
                value TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_history_element_field
                ON parameter_history(element, field);
            "#,
        )?;
        Ok(())
    }

    /// Latest mirrored value of a field.
    pub fn latest(&self, element: &PhysicalElement, field: &str) -> StoreResult<Option<String>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT value FROM parameters WHERE element = ?1 AND field = ?2")?;
        let mut rows = stmt.query(rusqlite::params![element.id(), field])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }

    /// Every mirrored write of a field, oldest first.
    pub fn history(&self, element: &PhysicalElement, field: &str) -> StoreResult<Vec<MirrorEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT element, field, value, recorded_at FROM parameter_history \
             WHERE element = ?1 AND field = ?2 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(rusqlite::params![element.id(), field], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (element, field, value, recorded_at) = row?;
            let recorded_at = DateTime::parse_from_rfc3339(&recorded_at)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| StoreError::DatabaseError(e.to_string()))?;
            entries.push(MirrorEntry {
                element,
                field,
                value,
                recorded_at,
            });
        }
        Ok(entries)
    }
}

#[async_trait]
impl MirrorSink for SqliteMirror {
    async fn record(
        &self,
        element: &PhysicalElement,
        field: &str,
        value: &str,
    ) -> StoreResult<()> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            r#"
            INSERT OR REPLACE INTO parameters (element, field, value, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            rusqlite::params![element.id(), field, value, now],
        )?;
        conn.execute(
            "INSERT INTO parameter_history (element, field, value, recorded_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![element.id(), field, value, now],
        )?;
        Ok(())
    }
}

/// Mirror that keeps entries in memory.
#[derive(Default)]
pub struct MemoryMirror {
    entries: Mutex<Vec<MirrorEntry>>,
}

impl MemoryMirror {
    /// Create an empty mirror.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all entries, oldest first.
    pub fn entries(&self) -> Vec<MirrorEntry> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl MirrorSink for MemoryMirror {
    async fn record(
        &self,
        element: &PhysicalElement,
        field: &str,
        value: &str,
    ) -> StoreResult<()> {
        self.entries
            .lock()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?
            .push(MirrorEntry {
                element: element.id().to_string(),
                field: field.to_string(),
                value: value.to_string(),
                recorded_at: Utc::now(),
            });
        Ok(())
    }
}
