use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use tern_common::{Result, Version, VersionRange};
use tern_config::TernConfig;
use tracing::{debug, info};

use crate::set::MigrationSet;
use crate::source::{DirSource, MigrationSource};
use crate::version_store::{MigrationRecord, SqliteVersionStore, VersionStore};

/// Outcome of an `up` / `up_to` run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// Versions applied by this run, in application order.
    pub applied: Vec<Version>,
    /// Migrations in range that were already recorded.
    pub skipped: usize,
    /// Current version re-read from the store after the run.
    pub current: Option<Version>,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Outcome of `up_by_one`. Having nothing to apply is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Applied { version: Version },
    NoPending { current: Option<Version> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MigrationState {
    Applied { applied_at: DateTime<Utc> },
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEntry {
    pub version: Version,
    pub name: String,
    #[serde(flatten)]
    pub state: MigrationState,
}

/// Known migrations against recorded history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub entries: Vec<StatusEntry>,
    /// Records whose migration no longer exists in the source.
    pub orphaned: Vec<MigrationRecord>,
    pub current: Option<Version>,
}

impl MigrationStatus {
    pub fn pending_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.state == MigrationState::Pending)
            .count()
    }
}

/// Applies migrations from a source and keeps the bookkeeping table current.
///
/// Migrations run one at a time in ascending version order. The first failure
/// stops the run; everything recorded before it stays applied, and a later
/// run resumes from there. At most one migrator may work on a database at a
/// time.
pub struct Migrator {
    source: Box<dyn MigrationSource>,
    store: Box<dyn VersionStore>,
}

impl Migrator {
    pub fn new(
        source: impl MigrationSource + 'static,
        store: impl VersionStore + 'static,
    ) -> Self {
        Self {
            source: Box::new(source),
            store: Box::new(store),
        }
    }

    /// Directory source and SQLite store as described by `config`.
    pub fn from_config(config: &TernConfig) -> Result<Self> {
        Ok(Self::new(
            DirSource::new(&config.migrations_dir),
            SqliteVersionStore::new(&config.table)?,
        ))
    }

    /// Apply every pending migration.
    pub fn up(&self, conn: &mut Connection) -> Result<MigrationReport> {
        self.apply_range(conn, VersionRange::all())
    }

    /// Apply every pending migration with a version `<= target`.
    pub fn up_to(&self, conn: &mut Connection, target: Version) -> Result<MigrationReport> {
        self.apply_range(conn, VersionRange::up_to(target))
    }

    fn apply_range(&self, conn: &mut Connection, range: VersionRange) -> Result<MigrationReport> {
        let migrations = self.source.collect(range)?;
        self.store.ensure_schema(conn)?;

        // One snapshot per run: this migrator is assumed to be the only writer.
        let applied: HashSet<Version> = self
            .store
            .applied_records(conn)?
            .into_iter()
            .map(|r| r.version_id)
            .collect();

        let mut report = MigrationReport {
            applied: Vec::new(),
            skipped: 0,
            current: None,
        };

        for migration in &migrations {
            if applied.contains(&migration.version) {
                debug!("skipping applied migration {}", migration.version);
                report.skipped += 1;
                continue;
            }
            migration.apply_up(conn, self.store.as_ref())?;
            report.applied.push(migration.version);
        }

        report.current = self.store.current_version(conn)?;
        if report.is_noop() {
            info!(
                "no migrations to run. current version: {}",
                display_version(report.current)
            );
        } else {
            info!(
                "applied {} migration(s). current version: {}",
                report.applied.len(),
                display_version(report.current)
            );
        }
        Ok(report)
    }

    /// Apply only the migration immediately after the current version.
    pub fn up_by_one(&self, conn: &mut Connection) -> Result<StepOutcome> {
        let migrations = self.source.collect(VersionRange::all())?;
        self.store.ensure_schema(conn)?;

        let current = self.store.current_version(conn)?;
        let Some(next) = migrations.next(current) else {
            info!(
                "no migrations to run. current version: {}",
                display_version(current)
            );
            return Ok(StepOutcome::NoPending { current });
        };

        next.apply_up(conn, self.store.as_ref())?;
        Ok(StepOutcome::Applied {
            version: next.version,
        })
    }

    /// Report which migrations are applied, pending, or recorded without a
    /// matching migration. Makes no schema changes beyond the bookkeeping table.
    pub fn status(&self, conn: &Connection) -> Result<MigrationStatus> {
        let migrations = self.source.collect(VersionRange::all())?;
        self.store.ensure_schema(conn)?;
        let records = self.store.applied_records(conn)?;
        let current = self.store.current_version(conn)?;

        Ok(build_status(&migrations, records, current))
    }

    pub fn version(&self, conn: &Connection) -> Result<Option<Version>> {
        self.store.current_version(conn)
    }
}

fn build_status(
    migrations: &MigrationSet,
    records: Vec<MigrationRecord>,
    current: Option<Version>,
) -> MigrationStatus {
    let mut by_version: HashMap<Version, MigrationRecord> =
        records.into_iter().map(|r| (r.version_id, r)).collect();

    let entries = migrations
        .iter()
        .map(|m| StatusEntry {
            version: m.version,
            name: m.name.clone(),
            state: match by_version.remove(&m.version) {
                Some(record) => MigrationState::Applied {
                    applied_at: record.applied_at,
                },
                None => MigrationState::Pending,
            },
        })
        .collect();

    let mut orphaned: Vec<_> = by_version.into_values().collect();
    orphaned.sort_by_key(|r| r.version_id);

    MigrationStatus {
        entries,
        orphaned,
        current,
    }
}

pub fn display_version(version: Option<Version>) -> String {
    version.map_or_else(|| "none".to_string(), |v| v.to_string())
}
