//! Client configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via CLI_CONFIG or --config)
//! 3. Environment variables (`CLI_` prefix)
//! 4. Command-line flags (applied by the binary)

use crate::batch::{DEFAULT_MAX_BYTES, DEFAULT_MAX_RECORDS};
use crate::error::SourceError;
use crate::session::SessionSettings;
use crate::source::{CsvRecordReader, RecordSource};
use filmq_protocol::{Dataset, QuerySelection};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A record source paired with the dataset it feeds.
pub type DatasetSource = (Dataset, Box<dyn RecordSource + Send>);

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Client identity. A random one is generated when unset.
    pub id: Option<String>,
    /// Aggregation server address (host:port).
    pub server_addr: String,
    /// Results validator address (host:port).
    pub validator_addr: Option<String>,
    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Query to run: 0 for all, 1-5 for a single query.
    pub query: u8,
    /// Batch limits.
    pub batch: BatchConfig,
    /// Dataset files.
    pub datasets: DatasetConfig,
    /// Log filter used when RUST_LOG is not set.
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            id: None,
            server_addr: "127.0.0.1:12345".to_string(),
            validator_addr: None,
            connect_timeout_secs: 10,
            query: 0,
            batch: BatchConfig::default(),
            datasets: DatasetConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl ClientConfig {
    /// Loads configuration from `path` (or CLI_CONFIG), then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = std::env::var("CLI_CONFIG").ok().map(PathBuf::from);

        let mut config = match path.map(Path::to_path_buf).or(env_path) {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: ClientConfig = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(id) = lookup("CLI_ID") {
            if !id.is_empty() {
                self.id = Some(id);
            }
        }

        if let Some(addr) = lookup("CLI_SERVER_ADDRESS") {
            self.server_addr = addr;
        }

        if let Some(addr) = lookup("CLI_VALIDATOR_ADDRESS") {
            self.validator_addr = (!addr.is_empty()).then_some(addr);
        }

        if let Some(timeout) = lookup("CLI_CONNECT_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                self.connect_timeout_secs = secs;
            }
        }

        if let Some(query) = lookup("CLI_QUERY_NUMBER") {
            if let Ok(n) = query.parse() {
                self.query = n;
            }
        }

        if let Some(level) = lookup("CLI_LOG_LEVEL") {
            self.log_level = level;
        }

        self.batch.apply_overrides(&lookup);
        self.datasets.apply_overrides(&lookup);
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_addr.is_empty() {
            return Err(ConfigError::ValidationError(
                "server_addr must not be empty".to_string(),
            ));
        }
        self.query_selection()?;
        self.batch.validate()
    }

    pub fn query_selection(&self) -> Result<QuerySelection, ConfigError> {
        QuerySelection::from_byte(self.query).map_err(|_| {
            ConfigError::ValidationError(format!(
                "query must be 0 (all) or 1-5, got {}",
                self.query
            ))
        })
    }

    /// Returns the connect timeout as Duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Resolves the settings a session runs with.
    pub fn session_settings(&self) -> Result<SessionSettings, ConfigError> {
        self.validate()?;
        let client_id = self
            .id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Ok(SessionSettings {
            client_id,
            query: self.query_selection()?,
            max_records: self.batch.max_records,
            max_bytes: self.batch.max_bytes,
            validator_addr: self.validator_addr.clone(),
            connect_timeout: self.connect_timeout(),
        })
    }
}

/// Batch limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum records per batch.
    pub max_records: usize,
    /// Maximum batch payload size in bytes.
    pub max_bytes: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_records: DEFAULT_MAX_RECORDS,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

impl BatchConfig {
    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(amount) = lookup("CLI_BATCH_MAX_AMOUNT") {
            if let Ok(n) = amount.parse() {
                self.max_records = n;
            }
        }

        if let Some(bytes) = lookup("CLI_BATCH_MAX_BYTES") {
            if let Ok(n) = bytes.parse() {
                self.max_bytes = n;
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_records == 0 {
            return Err(ConfigError::ValidationError(
                "batch.max_records must be at least 1".to_string(),
            ));
        }
        if self.max_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "batch.max_bytes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Paths of the dataset files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub movies: PathBuf,
    pub ratings: PathBuf,
    pub credits: PathBuf,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            movies: PathBuf::from("data/movies.csv"),
            ratings: PathBuf::from("data/ratings.csv"),
            credits: PathBuf::from("data/credits.csv"),
        }
    }
}

impl DatasetConfig {
    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("CLI_DATASETS_MOVIES") {
            self.movies = PathBuf::from(path);
        }
        if let Some(path) = lookup("CLI_DATASETS_RATINGS") {
            self.ratings = PathBuf::from(path);
        }
        if let Some(path) = lookup("CLI_DATASETS_CREDITS") {
            self.credits = PathBuf::from(path);
        }
    }

    /// Returns the file backing `dataset`.
    pub fn path(&self, dataset: Dataset) -> &Path {
        match dataset {
            Dataset::Movies => &self.movies,
            Dataset::Ratings => &self.ratings,
            Dataset::Credits => &self.credits,
        }
    }

    /// Opens a CSV reader for every dataset, in upload order.
    pub fn open_sources(&self) -> Result<Vec<DatasetSource>, SourceError> {
        Dataset::ALL
            .iter()
            .map(|&dataset| -> Result<DatasetSource, SourceError> {
                let reader = CsvRecordReader::open(self.path(dataset))?;
                Ok((dataset, Box::new(reader) as Box<dyn RecordSource + Send>))
            })
            .collect()
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
