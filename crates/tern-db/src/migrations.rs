use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use rusqlite::Connection;
use tern_common::{Error, Result, Version};
use tracing::{info, warn};

use crate::version_store::VersionStore;

/// Rust code run as a migration step. Receives the open transaction (or the
/// bare connection for non-transactional migrations).
pub type MigrationFn = Arc<dyn Fn(&Connection) -> rusqlite::Result<()> + Send + Sync>;

/// What a migration step executes.
#[derive(Clone)]
pub enum MigrationAction {
    Sql(String),
    Code(MigrationFn),
}

impl MigrationAction {
    fn run(&self, conn: &Connection) -> rusqlite::Result<()> {
        match self {
            MigrationAction::Sql(sql) => conn.execute_batch(sql),
            MigrationAction::Code(f) => f(conn),
        }
    }
}

impl fmt::Debug for MigrationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationAction::Sql(sql) => f.debug_tuple("Sql").field(sql).finish(),
            MigrationAction::Code(_) => f.write_str("Code(..)"),
        }
    }
}

/// Where a migration was defined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOrigin {
    File(PathBuf),
    Registered,
}

/// One versioned schema change.
///
/// Migrations are applied in ascending `version` order and tracked in the
/// bookkeeping table owned by a [`VersionStore`].
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: Version,
    pub name: String,
    pub origin: MigrationOrigin,
    pub up: MigrationAction,
    pub down: Option<MigrationAction>,
    /// When false the up action runs outside a transaction and is recorded
    /// afterwards, so a crash in between leaves it applied but unrecorded.
    pub transactional: bool,
}

impl Migration {
    pub fn sql(version: Version, name: impl Into<String>, up: impl Into<String>) -> Self {
        Self {
            version,
            name: name.into(),
            origin: MigrationOrigin::Registered,
            up: MigrationAction::Sql(up.into()),
            down: None,
            transactional: true,
        }
    }

    pub fn code<F>(version: Version, name: impl Into<String>, up: F) -> Self
    where
        F: Fn(&Connection) -> rusqlite::Result<()> + Send + Sync + 'static,
    {
        Self {
            version,
            name: name.into(),
            origin: MigrationOrigin::Registered,
            up: MigrationAction::Code(Arc::new(up)),
            down: None,
            transactional: true,
        }
    }

    pub fn with_down(mut self, down: MigrationAction) -> Self {
        self.down = Some(down);
        self
    }

    pub fn without_transaction(mut self) -> Self {
        self.transactional = false;
        self
    }

    /// Human-readable origin, used in duplicate-version reports.
    pub fn label(&self) -> String {
        match &self.origin {
            MigrationOrigin::File(path) => path.display().to_string(),
            MigrationOrigin::Registered => format!("registered:{}_{}", self.version, self.name),
        }
    }

    /// Run the up action and record it through `store`.
    ///
    /// Transactional migrations run the action and the record insert inside
    /// one transaction: either both land or neither does.
    pub fn apply_up(&self, conn: &mut Connection, store: &dyn VersionStore) -> Result<()> {
        info!("applying migration {} ({})", self.version, self.name);

        if self.transactional {
            let tx = conn
                .transaction()
                .map_err(|e| self.failure(format!("failed to begin transaction: {e}")))?;
            self.up.run(&tx).map_err(|e| self.failure(e.to_string()))?;
            store
                .record_applied(&tx, self)
                .map_err(|e| self.failure(e.to_string()))?;
            tx.commit()
                .map_err(|e| self.failure(format!("failed to commit: {e}")))?;
        } else {
            warn!(
                "migration {} runs outside a transaction; a crash before it is recorded will leave it applied but unrecorded",
                self.version
            );
            self.up.run(conn).map_err(|e| self.failure(e.to_string()))?;
            store
                .record_applied(conn, self)
                .map_err(|e| self.failure(e.to_string()))?;
        }

        Ok(())
    }

    fn failure(&self, reason: String) -> Error {
        Error::MigrationExecution {
            version: self.version,
            name: self.name.clone(),
            reason,
        }
    }
}
