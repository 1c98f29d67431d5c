mod status;
mod wizard;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tern_config::{ConfigLoader, TernConfig};
use tern_db::runner::display_version;
use tern_db::{
    Connection, MigrationReport, Migrator, StepOutcome, VersionScheme, create_migration,
    open_database,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tern", version, about = "Versioned schema migrations for SQLite")]
struct Cli {
    /// Config file (defaults to tern.yml / tern.yaml / tern.toml in the current directory)
    #[arg(long, global = true, env = "TERN_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database to migrate
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Directory containing migration files
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Bookkeeping table name
    #[arg(long, global = true)]
    table: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply all pending migrations
    Up,
    /// Apply pending migrations up to and including VERSION
    UpTo {
        #[arg(allow_negative_numbers = true)]
        version: i64,
    },
    /// Apply the next pending migration only
    UpByOne,
    /// Show applied and pending migrations
    Status {
        /// Print the status as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the current database version
    Version,
    /// Create a new migration file
    Create {
        name: String,
        /// Number the file after the highest existing version instead of a timestamp
        #[arg(long)]
        sequential: bool,
    },
    /// Write a tern.yml interactively
    Init,
}

fn main() -> Result<()> {
    // A missing .env is normal.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    let config = load_config(&cli)?;

    match cli.command {
        Command::Up => {
            let migrator = Migrator::from_config(&config)?;
            let mut conn = open(&config)?;
            let report = migrator.up(&mut conn)?;
            println!("{}", summarize(&report));
        }
        Command::UpTo { version } => {
            let migrator = Migrator::from_config(&config)?;
            let mut conn = open(&config)?;
            let report = migrator
                .up_to(&mut conn, version)
                .with_context(|| format!("failed to migrate up to version {version}"))?;
            println!("{}", summarize(&report));
        }
        Command::UpByOne => {
            let migrator = Migrator::from_config(&config)?;
            let mut conn = open(&config)?;
            match migrator.up_by_one(&mut conn)? {
                StepOutcome::Applied { version } => println!("applied migration {version}"),
                StepOutcome::NoPending { current } => println!(
                    "no migrations to run. current version: {}",
                    display_version(current)
                ),
            }
        }
        Command::Status { json } => {
            let migrator = Migrator::from_config(&config)?;
            let conn = open(&config)?;
            let status = migrator.status(&conn)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                status::print_status(&status, &config);
            }
        }
        Command::Version => {
            let migrator = Migrator::from_config(&config)?;
            let conn = open(&config)?;
            println!("version {}", display_version(migrator.version(&conn)?));
        }
        Command::Create { ref name, sequential } => {
            let scheme = if sequential {
                VersionScheme::Sequential
            } else {
                VersionScheme::Timestamp(chrono::Utc::now())
            };
            let path = create_migration(&config.migrations_dir, name, scheme)?;
            println!("created {}", path.display());
        }
        Command::Init => wizard::run_wizard(&std::env::current_dir()?, &config)?,
    }

    Ok(())
}

fn summarize(report: &MigrationReport) -> String {
    let current = display_version(report.current);
    if report.is_noop() {
        format!("no migrations to run. current version: {current}")
    } else {
        format!(
            "applied {} migration(s). current version: {current}",
            report.applied.len()
        )
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.with_target(false).init();
    }
}

/// File/env config with command-line flags layered on top.
fn load_config(cli: &Cli) -> Result<TernConfig> {
    let loader = match &cli.config {
        Some(path) => ConfigLoader::from_path(path),
        None => ConfigLoader::new(),
    };
    let mut config = loader.load().context("failed to load configuration")?;

    if let Some(database) = &cli.database {
        config.database = database.clone();
    }
    if let Some(dir) = &cli.dir {
        config.migrations_dir = dir.clone();
    }
    if let Some(table) = &cli.table {
        config.table = table.clone();
    }
    config.validate().context("invalid configuration")?;

    info!(
        "database={} migrations={} table={}",
        config.database.display(),
        config.migrations_dir.display(),
        config.table
    );
    Ok(config)
}

fn open(config: &TernConfig) -> Result<Connection> {
    open_database(
        &config.database,
        Duration::from_millis(config.busy_timeout_ms),
    )
    .with_context(|| format!("failed to open {}", config.database.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_up_to_with_negative_version() {
        let cli = Cli::try_parse_from(["tern", "up-to", "-3"]).unwrap();
        assert!(matches!(cli.command, Command::UpTo { version: -3 }));
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from(["tern", "status", "--json", "--table", "versions", "-v"])
            .unwrap();
        assert!(matches!(cli.command, Command::Status { json: true }));
        assert_eq!(cli.table.as_deref(), Some("versions"));
        assert!(cli.verbose);
    }

    #[test]
    fn empty_run_is_reported_as_a_noop() {
        let noop = MigrationReport {
            applied: Vec::new(),
            skipped: 3,
            current: Some(3),
        };
        assert_eq!(summarize(&noop), "no migrations to run. current version: 3");

        let ran = MigrationReport {
            applied: vec![4, 5],
            skipped: 3,
            current: Some(5),
        };
        assert_eq!(summarize(&ran), "applied 2 migration(s). current version: 5");
    }

    #[test]
    fn create_requires_a_name() {
        assert!(Cli::try_parse_from(["tern", "create"]).is_err());
        let cli = Cli::try_parse_from(["tern", "create", "add users", "--sequential"]).unwrap();
        assert!(matches!(cli.command, Command::Create { sequential: true, .. }));
    }
}
