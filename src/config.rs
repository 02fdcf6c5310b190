//! Run configuration
//!
//! Settings come from, in increasing precedence: built-in defaults, a YAML
//! file, `CORPUS_GRAPH_*` environment variables, and command-line flags
//! (applied by the binary). Credentials are never stored here; the
//! extractor reads its key from the variable named in
//! `extraction.api_key_env`, which may be set through the env file.

use crate::extraction::ChatExtractorConfig;
use crate::logging;
use crate::merge::MergeOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Overrides the database path
pub const DB_ENV: &str = "CORPUS_GRAPH_DB";
/// Overrides the log level
pub const LOG_ENV: &str = "CORPUS_GRAPH_LOG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Cannot load env file {}: {source}", path.display())]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite file; `None` uses [`default_db_path`]
    pub database: Option<PathBuf>,
    /// Sections CSV
    pub sections: PathBuf,
    /// Pages CSV
    pub pages: PathBuf,
    /// Dotenv file loaded before the extractor is built; missing is fine
    pub env_file: Option<PathBuf>,
    pub log_level: String,
    pub merge: MergeOptions,
    pub extraction: ChatExtractorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: None,
            sections: PathBuf::from("sections.csv"),
            pages: PathBuf::from("pages.csv"),
            env_file: Some(PathBuf::from(".env")),
            log_level: "info".to_string(),
            merge: MergeOptions::default(),
            extraction: ChatExtractorConfig::default(),
        }
    }
}

impl Config {
    /// Read a YAML file; absent fields keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `CORPUS_GRAPH_DB` and `CORPUS_GRAPH_LOG` from the process
    /// environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(db) = lookup(DB_ENV).filter(|v| !v.is_empty()) {
            self.database = Some(PathBuf::from(db));
        }
        if let Some(level) = lookup(LOG_ENV).filter(|v| !v.is_empty()) {
            self.log_level = level;
        }
    }

    /// Load the env file into the process environment, without overriding
    /// variables that are already set. Returns whether a file was loaded.
    pub fn load_env_file(&self) -> Result<bool, ConfigError> {
        let Some(path) = &self.env_file else {
            return Ok(false);
        };
        match dotenvy::from_path(path) {
            Ok(()) => Ok(true),
            Err(dotenvy::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(ConfigError::EnvFile {
                path: path.clone(),
                source,
            }),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.merge.validate().map_err(ConfigError::Invalid)?;
        logging::parse_level(&self.log_level)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.extraction.api_key_env.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "extraction.api_key_env must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.database.clone().unwrap_or_else(default_db_path)
    }
}

/// `<data dir>/corpus-graph/corpus-graph.db`, e.g.
/// `~/.local/share/corpus-graph/corpus-graph.db` on Linux
pub fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    data_dir.join("corpus-graph").join("corpus-graph.db")
}
