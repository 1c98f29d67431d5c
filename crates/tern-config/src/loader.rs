use std::path::{Path, PathBuf};

use tern_common::{Error, Result};
use tracing::{debug, info};

use crate::model::TernConfig;

/// File names probed, in order, when no explicit config path is given.
const CANDIDATES: &[&str] = &["tern.yml", "tern.yaml", "tern.toml"];

pub const ENV_DATABASE: &str = "TERN_DATABASE";
pub const ENV_MIGRATIONS_DIR: &str = "TERN_MIGRATIONS_DIR";
pub const ENV_TABLE: &str = "TERN_TABLE";

/// Resolves a `TernConfig` from an optional file plus environment overrides.
pub struct ConfigLoader {
    explicit: Option<PathBuf>,
    search_dir: PathBuf,
}

impl ConfigLoader {
    /// Probe the current directory for a config file.
    pub fn new() -> Self {
        Self {
            explicit: None,
            search_dir: PathBuf::from("."),
        }
    }

    /// Load exactly this file; a missing file is an error.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            explicit: Some(path.into()),
            search_dir: PathBuf::from("."),
        }
    }

    /// Probe `dir` instead of the current directory.
    pub fn search_in(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_dir = dir.into();
        self
    }

    /// The file that `load` would read, if any.
    pub fn resolve_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.explicit {
            return Some(path.clone());
        }
        CANDIDATES
            .iter()
            .map(|name| self.search_dir.join(name))
            .find(|p| p.is_file())
    }

    pub fn load(&self) -> Result<TernConfig> {
        self.load_with_env(|key| std::env::var(key).ok())
    }

    /// Like `load`, with environment lookups routed through `env`.
    pub fn load_with_env(&self, env: impl Fn(&str) -> Option<String>) -> Result<TernConfig> {
        let mut config = match self.resolve_path() {
            Some(path) => {
                let config = read_config_file(&path)?;
                info!("loaded config from {}", path.display());
                config
            }
            None => {
                debug!("no config file found, using defaults");
                TernConfig::default()
            }
        };

        apply_env_overrides(&mut config, env);
        config.validate()?;
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn read_config_file(path: &Path) -> Result<TernConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("failed to read {}: {e}", path.display()))
    })?;

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        "yml" | "yaml" => serde_yaml::from_str(&contents)
            .map_err(|e| Error::Config(format!("YAML parse error in {}: {e}", path.display()))),
        "toml" => toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("TOML parse error in {}: {e}", path.display()))),
        other => Err(Error::Config(format!(
            "unsupported config extension: {other}"
        ))),
    }
}

fn apply_env_overrides(config: &mut TernConfig, env: impl Fn(&str) -> Option<String>) {
    if let Some(database) = env(ENV_DATABASE).filter(|v| !v.is_empty()) {
        debug!("{ENV_DATABASE} overrides database path");
        config.database = PathBuf::from(database);
    }
    if let Some(dir) = env(ENV_MIGRATIONS_DIR).filter(|v| !v.is_empty()) {
        debug!("{ENV_MIGRATIONS_DIR} overrides migrations directory");
        config.migrations_dir = PathBuf::from(dir);
    }
    if let Some(table) = env(ENV_TABLE).filter(|v| !v.is_empty()) {
        debug!("{ENV_TABLE} overrides version table");
        config.table = table;
    }
}
