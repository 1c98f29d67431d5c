use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tern_common::{Error, Result, Version, VersionRange};
use tracing::{debug, info, warn};

use crate::migrations::{Migration, MigrationAction, MigrationOrigin};
use crate::set::MigrationSet;

const UP_MARKER: &str = "tern:up";
const DOWN_MARKER: &str = "tern:down";
const NO_TRANSACTION: &str = "tern:no-transaction";

/// Produces the ordered migrations that fall inside a version range.
pub trait MigrationSource {
    fn collect(&self, range: VersionRange) -> Result<MigrationSet>;
}

/// Migrations read from `<version>_<name>.sql` files in one directory, plus
/// any Rust migrations registered on the source itself.
#[derive(Debug, Clone)]
pub struct DirSource {
    dir: PathBuf,
    registered: Vec<Migration>,
}

impl DirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            registered: Vec::new(),
        }
    }

    /// Add a Rust migration alongside the directory's SQL files.
    pub fn register<F>(mut self, version: Version, name: impl Into<String>, up: F) -> Self
    where
        F: Fn(&Connection) -> rusqlite::Result<()> + Send + Sync + 'static,
    {
        self.registered.push(Migration::code(version, name, up));
        self
    }

    /// Add a fully built migration (for example one carrying a down action).
    pub fn register_migration(mut self, migration: Migration) -> Self {
        self.registered.push(migration);
        self
    }

    fn load_dir(&self) -> Result<Vec<Migration>> {
        let read_err = |source: std::io::Error| Error::SourceRead {
            path: self.dir.clone(),
            source,
        };

        let mut migrations = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(read_err)? {
            let path = entry.map_err(read_err)?.path();
            if !is_sql_file(&path) {
                continue;
            }
            migrations.push(parse_migration_file(&path)?);
        }

        debug!(
            "found {} sql migrations in {}",
            migrations.len(),
            self.dir.display()
        );
        Ok(migrations)
    }
}

impl MigrationSource for DirSource {
    fn collect(&self, range: VersionRange) -> Result<MigrationSet> {
        if range.is_inverted() {
            return Err(Error::Config(format!("empty version range {range}")));
        }

        let mut migrations = self.load_dir()?;
        migrations.extend(self.registered.iter().cloned());

        // Duplicates are checked across the whole directory, not just the range.
        Ok(MigrationSet::new(migrations)?.filter(range))
    }
}

/// Migrations compiled into the binary.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    migrations: Vec<Migration>,
}

impl StaticSource {
    pub fn new(migrations: Vec<Migration>) -> Self {
        Self { migrations }
    }
}

impl MigrationSource for StaticSource {
    fn collect(&self, range: VersionRange) -> Result<MigrationSet> {
        if range.is_inverted() {
            return Err(Error::Config(format!("empty version range {range}")));
        }
        Ok(MigrationSet::new(self.migrations.clone())?.filter(range))
    }
}

fn is_sql_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("sql"))
}

/// Split a file stem like `20240101120000_add_users` into version and name.
fn parse_file_stem(stem: &str) -> Option<(Version, String)> {
    let (version, name) = match stem.split_once('_') {
        Some((version, name)) => (version, name),
        None => (stem, ""),
    };
    let version = version.parse::<Version>().ok()?;
    Some((version, name.to_string()))
}

#[derive(Debug, Default, PartialEq, Eq)]
struct SqlSections {
    up: Option<String>,
    down: Option<String>,
    transactional: bool,
}

/// Marker text of a `-- tern:...` comment line, lower-cased.
fn directive(line: &str) -> Option<String> {
    line.trim()
        .strip_prefix("--")
        .map(|rest| rest.trim().to_ascii_lowercase())
        .filter(|rest| rest.starts_with("tern:"))
}

fn split_sections(content: &str) -> SqlSections {
    enum Section {
        Preamble,
        Up,
        Down,
    }

    let mut up: Option<Vec<&str>> = None;
    let mut down: Option<Vec<&str>> = None;
    let mut transactional = true;
    let mut section = Section::Preamble;

    for line in content.lines() {
        match directive(line).as_deref() {
            Some(UP_MARKER) => {
                section = Section::Up;
                up.get_or_insert_with(Vec::new);
                continue;
            }
            Some(DOWN_MARKER) => {
                section = Section::Down;
                down.get_or_insert_with(Vec::new);
                continue;
            }
            Some(NO_TRANSACTION) => {
                transactional = false;
                continue;
            }
            _ => {}
        }

        match section {
            Section::Preamble => {}
            Section::Up => up.get_or_insert_with(Vec::new).push(line),
            Section::Down => down.get_or_insert_with(Vec::new).push(line),
        }
    }

    SqlSections {
        up: up.map(|lines| lines.join("\n").trim().to_string()),
        down: down.map(|lines| lines.join("\n").trim().to_string()),
        transactional,
    }
}

fn parse_migration_file(path: &Path) -> Result<Migration> {
    let parse_err = |reason: String| Error::Parse {
        path: path.to_path_buf(),
        reason,
    };

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| parse_err("file name is not valid UTF-8".into()))?;
    let (version, name) = parse_file_stem(stem).ok_or_else(|| {
        parse_err("file name must start with a numeric version, e.g. 1_create_users.sql".into())
    })?;

    let content = fs::read_to_string(path).map_err(|source| Error::SourceRead {
        path: path.to_path_buf(),
        source,
    })?;

    let sections = split_sections(&content);
    let up = sections
        .up
        .ok_or_else(|| parse_err(format!("missing `-- {UP_MARKER}` section")))?;

    Ok(Migration {
        version,
        name,
        origin: MigrationOrigin::File(path.to_path_buf()),
        up: MigrationAction::Sql(up),
        down: sections.down.map(MigrationAction::Sql),
        transactional: sections.transactional,
    })
}

/// How `create_migration` numbers a new file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionScheme {
    /// `YYYYMMDDHHMMSS` of the given instant, or one past the highest
    /// existing version if that is already taken or newer.
    Timestamp(DateTime<Utc>),
    /// One past the highest version already in the directory (1 when empty).
    Sequential,
}

/// Write a new, empty migration template into `dir` and return its path.
pub fn create_migration(dir: &Path, name: &str, scheme: VersionScheme) -> Result<PathBuf> {
    let slug = slugify(name);
    if slug.is_empty() {
        return Err(Error::Config(format!(
            "migration name `{name}` has no usable characters"
        )));
    }

    fs::create_dir_all(dir).map_err(|source| Error::SourceRead {
        path: dir.to_path_buf(),
        source,
    })?;

    let highest = DirSource::new(dir)
        .collect(VersionRange::all())?
        .last()
        .map(|m| m.version);
    let next = || match highest {
        Some(v) => v
            .checked_add(1)
            .ok_or_else(|| Error::Config(format!("no version left after {v}"))),
        None => Ok(1),
    };

    let version = match scheme {
        VersionScheme::Timestamp(now) => {
            let stamp = now
                .format("%Y%m%d%H%M%S")
                .to_string()
                .parse::<Version>()
                .map_err(|e| Error::Other(format!("invalid timestamp version: {e}")))?;
            match highest {
                Some(v) if stamp <= v => {
                    let bumped = next()?;
                    warn!("timestamp version {stamp} is not after {v}, using {bumped}");
                    bumped
                }
                _ => stamp,
            }
        }
        VersionScheme::Sequential => next()?,
    };

    let path = dir.join(format!("{version}_{slug}.sql"));
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(|source| Error::SourceRead {
            path: path.clone(),
            source,
        })?;
    file.write_all(template(&slug).as_bytes())?;

    info!("created migration {}", path.display());
    Ok(path)
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_matches('_').to_string()
}

fn template(name: &str) -> String {
    format!("-- Migration: {name}\n\n-- {UP_MARKER}\n\n\n-- {DOWN_MARKER}\n\n")
}
