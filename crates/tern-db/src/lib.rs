pub mod connection;
pub mod migrations;
pub mod runner;
pub mod set;
pub mod source;
pub mod version_store;

pub use connection::open_database;
pub use migrations::{Migration, MigrationAction, MigrationFn, MigrationOrigin};
pub use runner::{
    MigrationReport, MigrationState, MigrationStatus, Migrator, StatusEntry, StepOutcome,
};
pub use rusqlite::Connection;
pub use set::MigrationSet;
pub use source::{DirSource, MigrationSource, StaticSource, VersionScheme, create_migration};
pub use version_store::{MigrationRecord, SqliteVersionStore, VersionStore};
