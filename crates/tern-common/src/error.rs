use std::path::PathBuf;

use thiserror::Error;

use crate::version::Version;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to read migrations at {}: {source}", path.display())]
    SourceRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid migration {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("duplicate migration version {version}: {first} and {second}")]
    DuplicateVersion {
        version: Version,
        first: String,
        second: String,
    },

    #[error("failed to ensure version table: {0}")]
    SchemaEnsure(String),

    #[error("failed to query migration history: {0}")]
    RecordQuery(String),

    #[error("migration {version} ({name}) failed: {reason}")]
    MigrationExecution {
        version: Version,
        name: String,
        reason: String,
    },

    #[error("database error: {0}")]
    Database(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Failures raised while discovering migrations, before any database work.
    pub fn is_source_error(&self) -> bool {
        matches!(
            self,
            Error::SourceRead { .. } | Error::Parse { .. } | Error::DuplicateVersion { .. }
        )
    }
}
