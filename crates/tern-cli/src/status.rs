use tern_config::TernConfig;
use tern_db::runner::display_version;
use tern_db::{MigrationState, MigrationStatus};

const APPLIED_AT_WIDTH: usize = 25;

/// Print the status table: one row per known migration, then any history
/// rows whose migration is gone.
pub fn print_status(status: &MigrationStatus, config: &TernConfig) {
    for line in render_status(status, config) {
        println!("{line}");
    }
}

fn render_status(status: &MigrationStatus, config: &TernConfig) -> Vec<String> {
    let row = |l: &str, r: &str| format!("    {:<APPLIED_AT_WIDTH$}-- {}", l, r);

    let mut lines = vec![
        format!("    database:   {}", config.database.display()),
        format!("    migrations: {}", config.migrations_dir.display()),
        String::new(),
        format!("    {:<APPLIED_AT_WIDTH$}   Migration", "Applied At"),
        format!("    {}", "=".repeat(APPLIED_AT_WIDTH + 30)),
    ];

    if status.entries.is_empty() {
        lines.push("    (no migrations found)".to_string());
    }
    for entry in &status.entries {
        let applied = match &entry.state {
            MigrationState::Applied { applied_at } => {
                applied_at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
            }
            MigrationState::Pending => "Pending".to_string(),
        };
        lines.push(row(&applied, &label(entry.version, &entry.name)));
    }

    if !status.orphaned.is_empty() {
        lines.push(String::new());
        lines.push("    Applied but missing from the migrations directory:".to_string());
        for record in &status.orphaned {
            lines.push(row(
                &record.applied_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
                &label(record.version_id, &record.name),
            ));
        }
    }

    lines.push(String::new());
    lines.push(format!(
        "    current version: {} ({} pending)",
        display_version(status.current),
        status.pending_count()
    ));
    lines
}

fn label(version: i64, name: &str) -> String {
    if name.is_empty() {
        version.to_string()
    } else {
        format!("{version}_{name}")
    }
}
