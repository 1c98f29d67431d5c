use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use tern_common::{Error, Result, Version};
use tern_config::validate_identifier;
use tracing::debug;

use crate::migrations::Migration;

/// A persisted "version V was applied" fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub version_id: Version,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// Read/write view over the bookkeeping table. Implementations query the
/// database on every call; nothing is cached between calls.
pub trait VersionStore {
    /// Create the bookkeeping table if it is absent. Safe to repeat.
    fn ensure_schema(&self, conn: &Connection) -> Result<()>;

    /// Every applied record, ordered by version ascending.
    fn applied_records(&self, conn: &Connection) -> Result<Vec<MigrationRecord>>;

    /// Highest applied version, or `None` if nothing has been applied.
    fn current_version(&self, conn: &Connection) -> Result<Option<Version>>;

    /// Insert exactly one record for `migration`. Pass the transaction that
    /// ran the migration so both commit together.
    fn record_applied(&self, conn: &Connection, migration: &Migration) -> Result<()>;
}

/// SQLite-backed version store.
#[derive(Debug, Clone)]
pub struct SqliteVersionStore {
    table: String,
}

impl SqliteVersionStore {
    pub fn new(table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        validate_identifier(&table)?;
        Ok(Self { table })
    }

    fn table_exists(&self, conn: &Connection) -> Result<bool> {
        conn.query_row(
            "SELECT count(*) > 0 FROM sqlite_master WHERE type='table' AND name=?1",
            params![self.table],
            |row| row.get(0),
        )
        .map_err(|e| Error::RecordQuery(format!("failed to check version table: {e}")))
    }
}

impl VersionStore for SqliteVersionStore {
    fn ensure_schema(&self, conn: &Connection) -> Result<()> {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                version_id INTEGER NOT NULL UNIQUE,
                name TEXT NOT NULL DEFAULT '',
                applied_at TEXT NOT NULL
            );",
            self.table
        ))
        .map_err(|e| Error::SchemaEnsure(format!("{}: {e}", self.table)))?;

        debug!("version table {} ready", self.table);
        Ok(())
    }

    fn applied_records(&self, conn: &Connection) -> Result<Vec<MigrationRecord>> {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT version_id, name, applied_at FROM \"{}\" ORDER BY version_id ASC",
                self.table
            ))
            .map_err(|e| Error::RecordQuery(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map([], |row| {
                Ok(MigrationRecord {
                    version_id: row.get(0)?,
                    name: row.get(1)?,
                    applied_at: parse_datetime(row.get::<_, String>(2)?),
                })
            })
            .map_err(|e| Error::RecordQuery(format!("failed to query records: {e}")))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::RecordQuery(format!("failed to read record row: {e}")))
    }

    fn current_version(&self, conn: &Connection) -> Result<Option<Version>> {
        if !self.table_exists(conn)? {
            return Ok(None);
        }

        conn.query_row(
            &format!("SELECT MAX(version_id) FROM \"{}\"", self.table),
            [],
            |row| row.get(0),
        )
        .map_err(|e| Error::RecordQuery(format!("failed to read current version: {e}")))
    }

    fn record_applied(&self, conn: &Connection, migration: &Migration) -> Result<()> {
        conn.execute(
            &format!(
                "INSERT INTO \"{}\" (version_id, name, applied_at) VALUES (?1, ?2, ?3)",
                self.table
            ),
            params![migration.version, migration.name, Utc::now().to_rfc3339()],
        )
        .map_err(|e| {
            Error::Database(format!(
                "failed to record version {}: {e}",
                migration.version
            ))
        })?;
        Ok(())
    }
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            // Rows written by hand often use SQLite's datetime('now') format
            chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S")
                .map(|naive| naive.and_utc())
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteVersionStore {
        SqliteVersionStore::new("tern_schema_version").unwrap()
    }

    #[test]
    fn ensure_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        let store = store();
        store.ensure_schema(&conn).unwrap();
        store.ensure_schema(&conn).unwrap();
        assert!(store.table_exists(&conn).unwrap());
    }

    #[test]
    fn current_version_is_none_before_schema_exists() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(store().current_version(&conn).unwrap(), None);
    }

    #[test]
    fn current_version_is_none_on_empty_table() {
        let conn = Connection::open_in_memory().unwrap();
        let store = store();
        store.ensure_schema(&conn).unwrap();
        assert_eq!(store.current_version(&conn).unwrap(), None);
    }

    #[test]
    fn records_round_trip_in_version_order() {
        let conn = Connection::open_in_memory().unwrap();
        let store = store();
        store.ensure_schema(&conn).unwrap();

        store
            .record_applied(&conn, &Migration::sql(20, "second", ""))
            .unwrap();
        store
            .record_applied(&conn, &Migration::sql(0, "zero", ""))
            .unwrap();

        let records = store.applied_records(&conn).unwrap();
        let versions: Vec<_> = records.iter().map(|r| r.version_id).collect();
        assert_eq!(versions, vec![0, 20]);
        assert_eq!(records[0].name, "zero");
        assert_eq!(store.current_version(&conn).unwrap(), Some(20));
    }

    #[test]
    fn version_zero_counts_as_applied() {
        let conn = Connection::open_in_memory().unwrap();
        let store = store();
        store.ensure_schema(&conn).unwrap();
        store
            .record_applied(&conn, &Migration::sql(0, "zero", ""))
            .unwrap();
        assert_eq!(store.current_version(&conn).unwrap(), Some(0));
    }

    #[test]
    fn applied_records_without_table_is_a_query_error() {
        let conn = Connection::open_in_memory().unwrap();
        let err = store().applied_records(&conn).unwrap_err();
        assert!(matches!(err, Error::RecordQuery(_)));
    }

    #[test]
    fn custom_table_names_are_isolated() {
        let conn = Connection::open_in_memory().unwrap();
        let a = SqliteVersionStore::new("app_versions").unwrap();
        let b = SqliteVersionStore::new("plugin_versions").unwrap();
        a.ensure_schema(&conn).unwrap();
        b.ensure_schema(&conn).unwrap();

        a.record_applied(&conn, &Migration::sql(1, "a", "")).unwrap();

        assert_eq!(a.current_version(&conn).unwrap(), Some(1));
        assert_eq!(b.current_version(&conn).unwrap(), None);
    }

    #[test]
    fn rejects_unsafe_table_name() {
        assert!(SqliteVersionStore::new("x\"; DROP TABLE y; --").is_err());
    }

    #[test]
    fn parses_sqlite_datetime_format() {
        let dt = parse_datetime("2024-01-01 12:30:00".to_string());
        assert_eq!(dt.to_rfc3339(), "2024-01-01T12:30:00+00:00");
    }
}
