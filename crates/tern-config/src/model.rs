use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tern_common::Result;

use crate::validation::validate_identifier;

pub const DEFAULT_DATABASE: &str = "tern.db";
pub const DEFAULT_MIGRATIONS_DIR: &str = "migrations";
pub const DEFAULT_TABLE: &str = "tern_schema_version";
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Settings shared by every `tern` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TernConfig {
    /// Path of the SQLite database to migrate.
    pub database: PathBuf,
    /// Directory holding `<version>_<name>.sql` files.
    pub migrations_dir: PathBuf,
    /// Name of the bookkeeping table.
    pub table: String,
    /// How long a blocked statement waits on a locked database.
    pub busy_timeout_ms: u64,
}

impl Default for TernConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from(DEFAULT_DATABASE),
            migrations_dir: PathBuf::from(DEFAULT_MIGRATIONS_DIR),
            table: DEFAULT_TABLE.to_string(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl TernConfig {
    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.table)?;
        if self.database.as_os_str().is_empty() {
            return Err(tern_common::Error::Config(
                "database path cannot be empty".into(),
            ));
        }
        if self.migrations_dir.as_os_str().is_empty() {
            return Err(tern_common::Error::Config(
                "migrations_dir cannot be empty".into(),
            ));
        }
        Ok(())
    }
}
