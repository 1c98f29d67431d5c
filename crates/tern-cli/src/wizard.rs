use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dialoguer::{Confirm, Input};
use tern_config::{TernConfig, validate_identifier};
use tracing::info;

/// Interactively write `tern.yml` into `project_dir`, seeded from `current`.
pub fn run_wizard(project_dir: &Path, current: &TernConfig) -> Result<()> {
    let config_path = project_dir.join("tern.yml");

    if !std::io::stdin().is_terminal() {
        println!("Non-interactive environment detected.");
        println!("To configure tern, create: {}", config_path.display());
        println!();
        println!("Minimal tern.yml example:");
        println!("---");
        print!("{}", serde_yaml::to_string(&TernConfig::default())?);
        return Ok(());
    }

    println!();
    println!("  tern setup");
    println!("  ----------");
    println!();

    if config_path.exists() {
        let overwrite = Confirm::new()
            .with_prompt(format!("{} exists. Overwrite it?", config_path.display()))
            .default(false)
            .interact()
            .context("overwrite confirmation cancelled")?;
        if !overwrite {
            println!("  Keeping existing config.");
            return Ok(());
        }
    }

    let database: String = Input::new()
        .with_prompt("SQLite database path")
        .default(current.database.display().to_string())
        .interact_text()
        .context("database input cancelled")?;

    let migrations_dir: String = Input::new()
        .with_prompt("Migrations directory")
        .default(current.migrations_dir.display().to_string())
        .interact_text()
        .context("migrations directory input cancelled")?;

    let table: String = Input::new()
        .with_prompt("Version table name")
        .default(current.table.clone())
        .validate_with(|input: &String| validate_identifier(input).map_err(|e| e.to_string()))
        .interact_text()
        .context("table input cancelled")?;

    let config = TernConfig {
        database: PathBuf::from(database.trim()),
        migrations_dir: PathBuf::from(migrations_dir.trim()),
        table,
        busy_timeout_ms: current.busy_timeout_ms,
    };
    config.validate()?;

    let yaml = serde_yaml::to_string(&config).context("failed to serialize config")?;
    std::fs::write(&config_path, &yaml)
        .context(format!("failed to write {}", config_path.display()))?;

    let dir = project_dir.join(&config.migrations_dir);
    std::fs::create_dir_all(&dir).context(format!("failed to create {}", dir.display()))?;

    info!("config written to {}", config_path.display());
    println!();
    println!("  Config written to {}", config_path.display());
    println!("  Run `tern create <name>` to add your first migration.");
    println!();

    Ok(())
}
