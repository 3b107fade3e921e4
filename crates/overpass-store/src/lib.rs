//! # Store
//!
//! Transactional persistence for overpass.
//!
//! One SQLite file (default `data/workspaces.db`) holds every table:
//! workspaces and their blob sidecar, orders, plans, plan items,
//! acquisitions, conflicts, and the commit audit log. Workspaces own
//! everything beneath them (cascade on delete); plans own their items;
//! acquisitions reference their originating plan but outlive it.
//!
//! Writes are serialized through the single [`Store`] handle; the
//! connection is never shared between threads. Every mutating operation
//! runs inside a transaction: either all rows commit or none do. The
//! commit operation in [`schedule`] is the one place acquisitions are
//! born and plans become immutable.
//!
//! Schema versions (`workspace 1.0`, `schedule 2.3`) are rows in
//! `schema_info` so the validation harness can inspect them.

pub mod schedule;
pub mod schema;
pub mod workspace;

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;

pub use schedule::{CommitOutcome, CommitRequest};
pub use schema::{SCHEDULE_SCHEMA_VERSION, WORKSPACE_SCHEMA_VERSION};

use overpass_types::CoreError;

/// Errors surfaced by the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("plan {0} is already committed")]
    AlreadyCommitted(String),

    #[error("invalid stored value: {0}")]
    InvalidValue(String),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("blob serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("blob compression error: {0}")]
    Compression(#[from] std::io::Error),
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, id } => CoreError::NotFound { kind, id },
            StoreError::AlreadyCommitted(plan_id) => CoreError::PlanAlreadyCommitted(plan_id),
            other => CoreError::Persistence(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// The single persistence handle. Construct once during process init.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the database file and ensure the schema exists.
    pub fn open(db_path: &Path) -> StoreResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        Self::from_connection(conn)
    }

    /// In-memory database, used by tests and dry-run previews.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        let store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Schema version for a component ("workspace" or "schedule").
    pub fn schema_version(&self, component: &str) -> StoreResult<String> {
        let version: Option<String> = self
            .conn
            .query_row(
                "SELECT version FROM schema_info WHERE component = ?1",
                [component],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        version.ok_or_else(|| StoreError::NotFound {
            kind: "schema component",
            id: component.to_string(),
        })
    }
}

/// Mint a short prefixed row id, e.g. `acq_1f2e3d4c5b6a`.
pub(crate) fn new_id(prefix: &str) -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}", &hex[..12])
}

/// Timestamps are stored as RFC 3339 with millisecond precision so that
/// lexicographic ordering in SQL matches chronological ordering.
pub(crate) fn ts_to_sql(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn ts_from_sql(s: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::InvalidValue(format!("bad timestamp '{s}': {e}")))
}

pub(crate) fn opt_ts_from_sql(s: Option<String>) -> StoreResult<Option<DateTime<Utc>>> {
    s.map(|v| ts_from_sql(&v)).transpose()
}

/// Serde helper for columns holding enum wire values.
pub(crate) fn enum_to_sql<T: serde::Serialize>(value: &T) -> StoreResult<String> {
    let json = serde_json::to_string(value)?;
    Ok(json.trim_matches('"').to_string())
}

pub(crate) fn enum_from_sql<T: serde::de::DeserializeOwned>(s: &str) -> StoreResult<T> {
    Ok(serde_json::from_str(&format!("\"{s}\""))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_versions_are_inspectable() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.schema_version("workspace").unwrap(), "1.0");
        assert_eq!(store.schema_version("schedule").unwrap(), "2.3");
        assert!(store.schema_version("unknown").is_err());
    }

    #[test]
    fn open_creates_parent_directories() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("data").join("workspaces.db");
        let _store = Store::open(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn ids_are_prefixed_and_unique() {
        let a = new_id("acq");
        let b = new_id("acq");
        assert!(a.starts_with("acq_"));
        assert_eq!(a.len(), "acq_".len() + 12);
        assert_ne!(a, b);
    }

    #[test]
    fn timestamp_roundtrip() {
        let t: DateTime<Utc> = "2025-01-15T12:34:56.789Z".parse().unwrap();
        let s = ts_to_sql(t);
        assert_eq!(ts_from_sql(&s).unwrap(), t);
    }

    #[test]
    fn enum_sql_roundtrip() {
        use overpass_types::LockLevel;
        let s = enum_to_sql(&LockLevel::Hard).unwrap();
        assert_eq!(s, "hard");
        let back: LockLevel = enum_from_sql(&s).unwrap();
        assert_eq!(back, LockLevel::Hard);
    }
}
