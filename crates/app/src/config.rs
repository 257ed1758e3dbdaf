//! Application configuration
//!
//! Layered: defaults, then `config.toml`, then `POKER_*` environment
//! variables. CLI flags are applied last by `main`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use directories::ProjectDirs;
use serde::Deserialize;
use tracing::debug;

use poker_net::DEFAULT_PORT;

const CONFIG_FILE: &str = "config.toml";
const DATABASE_FILE: &str = "poker.db";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Server to connect to when hosting or joining, `host[:port]`
    pub server: String,
    /// Port `serve` listens on
    pub port: u16,
    /// SQLite file used by `serve`
    pub database: PathBuf,
    /// Name used when `--name` is not given
    pub player_name: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: format!("127.0.0.1:{}", DEFAULT_PORT),
            port: DEFAULT_PORT,
            database: default_database_path(),
            player_name: None,
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "onyx", "poker")
}

fn default_database_path() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().join(DATABASE_FILE))
        .unwrap_or_else(|| PathBuf::from(DATABASE_FILE))
}

/// Platform config file location, if the platform has one
pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

impl AppConfig {
    /// Load from `path` (or the platform default) and apply environment overrides
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config = Self::from_toml(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Override fields from `POKER_*` variables
    pub fn apply_env<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("POKER_SERVER") {
            self.server = v;
        }
        if let Some(v) = lookup("POKER_PORT") {
            self.port = v
                .parse()
                .with_context(|| format!("POKER_PORT is not a port: '{}'", v))?;
        }
        if let Some(v) = lookup("POKER_DATABASE") {
            self.database = PathBuf::from(v);
        }
        if let Some(v) = lookup("POKER_PLAYER") {
            self.player_name = Some(v);
        }
        Ok(())
    }

    /// Make sure the database directory exists
    pub fn prepare_database(&self) -> anyhow::Result<&Path> {
        if let Some(parent) = self.database.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        Ok(&self.database)
    }
}
