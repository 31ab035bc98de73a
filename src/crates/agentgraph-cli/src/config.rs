//! CLI configuration
//!
//! Layers, later ones win:
//! 1. Default values
//! 2. User-level config: `~/.agentgraph/agentgraph.toml`
//! 3. Project-level config: `./.agentgraph/agentgraph.toml`
//! 4. Environment: `AGENTGRAPH_DATABASE`, `AGENTGRAPH_LOG_LEVEL`,
//!    `AGENTGRAPH_HISTORY_LIMIT`
//!
//! Files are merged key by key, so a project file that only sets
//! `[logging]` keeps the user's `[database]` section.
//!
//! ```toml
//! [database]
//! path = "agentgraph.db"   # relative paths live under ~/.agentgraph
//!
//! [logging]
//! level = "info"
//!
//! [history]
//! limit = 20
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use toml::{Table, Value};
use tracing::debug;

use crate::env::{get_env, get_env_parse, ENV_DATABASE, ENV_HISTORY_LIMIT, ENV_LOG_LEVEL};
use crate::error::{CliError, Result};

const CONFIG_DIR: &str = ".agentgraph";
const CONFIG_FILE: &str = "agentgraph.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentGraphConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file, absolute or relative to `~/.agentgraph`
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "agentgraph.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `trace`, `debug`, `info`, `warn` or `error`, or a full filter directive
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Checkpoints listed by `history` when `--limit` is not given
    pub limit: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { limit: 20 }
    }
}

impl AgentGraphConfig {
    /// Resolved database file
    pub fn database_path(&self) -> PathBuf {
        let path = PathBuf::from(&self.database.path);
        if path.is_absolute() {
            return path;
        }
        match dirs::home_dir() {
            Some(home) => home.join(CONFIG_DIR).join(path),
            None => path,
        }
    }

    /// Overlay environment variables
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(path) = get_env(ENV_DATABASE)? {
            self.database.path = path;
        }
        if let Some(level) = get_env(ENV_LOG_LEVEL)? {
            self.logging.level = level;
        }
        if let Some(limit) = get_env_parse::<usize>(ENV_HISTORY_LIMIT)? {
            self.history.limit = limit;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.path.trim().is_empty() {
            return Err(CliError::Config("database.path must not be empty".to_string()));
        }
        if self.history.limit == 0 {
            return Err(CliError::Config("history.limit must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Loads [`AgentGraphConfig`] from the user and project locations
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    user_config_path: Option<PathBuf>,
    project_config_path: PathBuf,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            user_config_path: dirs::home_dir().map(|home| home.join(CONFIG_DIR).join(CONFIG_FILE)),
            project_config_path: PathBuf::from(CONFIG_DIR).join(CONFIG_FILE),
        }
    }

    /// Loader reading the given files instead of the standard locations
    pub fn with_paths(user: Option<PathBuf>, project: PathBuf) -> Self {
        Self {
            user_config_path: user,
            project_config_path: project,
        }
    }

    pub fn user_config_path(&self) -> Option<&Path> {
        self.user_config_path.as_deref()
    }

    pub fn project_config_path(&self) -> &Path {
        &self.project_config_path
    }

    /// Merge defaults, both files and the environment. Missing files are
    /// skipped; unreadable or malformed ones are errors.
    pub fn load(&self) -> Result<AgentGraphConfig> {
        let mut merged = Table::new();
        for path in self.user_config_path.iter().chain(std::iter::once(&self.project_config_path)) {
            match read_table(path)? {
                Some(table) => {
                    debug!(path = %path.display(), "Loaded config layer");
                    merge_tables(&mut merged, table);
                }
                None => debug!(path = %path.display(), "Config file not found"),
            }
        }

        let mut config: AgentGraphConfig = Value::Table(merged)
            .try_into()
            .map_err(|e: toml::de::Error| CliError::Config(format!("Invalid configuration: {}", e)))?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn read_table(path: &Path) -> Result<Option<Table>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| CliError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    let table = content
        .parse::<Table>()
        .map_err(|e| CliError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
    Ok(Some(table))
}

/// Recursive key-wise merge; scalars and arrays from `overlay` replace
fn merge_tables(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(Value::Table(existing)), Value::Table(incoming)) => merge_tables(existing, incoming),
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
