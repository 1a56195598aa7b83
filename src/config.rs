use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::InvalidPmidPolicy;
use crate::persist::DEFAULT_CHUNK_SIZE;
use crate::validation::InputValidator;

/// Default naming convention of MEDLINE baseline and update files.
pub const DEFAULT_FILE_PATTERN: &str = r"^pubmed\d{2}n\d{4}\.xml(\.gz)?$";

/// Environment variable prefix, e.g. `PUBMED_PARSER__INGEST__CHUNK_SIZE`.
pub const ENV_PREFIX: &str = "PUBMED_PARSER";

/// Application configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub ingest: IngestConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file, optionally prefixed with `sqlite:`
    pub path: String,
    pub pool_size: u32,
    pub busy_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Worker threads, `0` for one per CPU
    pub concurrency: usize,
    pub chunk_size: usize,
    pub invalid_pmid_policy: InvalidPmidPolicy,
    /// Regex a file name must match to be picked up from a directory
    pub file_pattern: String,
    /// Files kept in test mode
    pub test_mode_file_limit: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_path: Option<String>,
    pub format: String, // "json" or "text"
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                path: "data/pubmed.db".to_string(),
                pool_size: 4,
                busy_timeout_secs: 30,
            },
            ingest: IngestConfig {
                concurrency: 0,
                chunk_size: DEFAULT_CHUNK_SIZE,
                invalid_pmid_policy: InvalidPmidPolicy::Drop,
                file_pattern: DEFAULT_FILE_PATTERN.to_string(),
                test_mode_file_limit: 2,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: None,
                format: "text".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources with precedence
    ///
    /// Defaults, then `config/default`, `config/local` and `pubmed` files in any
    /// format the `config` crate knows, then `extra` if given, then the
    /// environment.
    pub fn load(extra: Option<&Path>) -> Result<Self> {
        let defaults = Config::try_from(&Self::default()).context("Failed to serialize defaults")?;

        let mut builder = Config::builder()
            .add_source(defaults)
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(File::with_name("pubmed").required(false));
        if let Some(path) = extra {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to load configuration")?;

        let app_config: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.database.path.trim().is_empty() {
            return Err(anyhow::anyhow!("database.path must not be empty"));
        }
        if self.database.pool_size == 0 {
            return Err(anyhow::anyhow!("pool_size must be greater than 0"));
        }
        if self.database.busy_timeout_secs == 0 {
            return Err(anyhow::anyhow!("busy_timeout_secs must be greater than 0"));
        }

        InputValidator::validate_concurrency(self.ingest.concurrency)?;
        InputValidator::validate_chunk_size(self.ingest.chunk_size)?;
        self.file_pattern()?;
        if self.ingest.test_mode_file_limit == 0 {
            return Err(anyhow::anyhow!("test_mode_file_limit must be greater than 0"));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            ));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log format: {}. Must be one of: {:?}",
                self.logging.format,
                valid_formats
            ));
        }

        Ok(())
    }

    /// Compiled file naming convention.
    pub fn file_pattern(&self) -> Result<Regex> {
        Regex::new(&self.ingest.file_pattern)
            .with_context(|| format!("Invalid file_pattern: {}", self.ingest.file_pattern))
    }

    /// Busy timeout applied to every store connection.
    #[must_use]
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_secs(self.database.busy_timeout_secs)
    }

    /// Render the effective configuration as YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to render configuration")
    }
}
