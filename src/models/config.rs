use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::utils::retry::RetryConfig;

pub const DEFAULT_EMBEDDING_URL: &str = "http://localhost:8080";
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";
pub const DEFAULT_COLLECTION: &str = "documents";
pub const DEFAULT_EMBEDDING_MODEL: &str = "all-MiniLM-L6-v2";
pub const DEFAULT_MAX_INPUT_LENGTH: u32 = 384;
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 384;

pub const ENV_QDRANT_URL: &str = "QDRANT_URL";
pub const ENV_QDRANT_API_KEY: &str = "QDRANT_API_KEY";
pub const ENV_COLLECTION: &str = "VECTOR_DB_OUTPUT_COLLECTION_NAME";
pub const ENV_MAX_INPUT_LENGTH: &str = "EMBEDDING_MODEL_MAX_INPUT_LENGTH";
pub const ENV_DIMENSION: &str = "EMBEDDING_MODEL_DIMENSION";
pub const ENV_MODEL_DIR: &str = "EMBEDDING_MODEL_DIR";
pub const ENV_EMBEDDING_URL: &str = "EMBEDDING_URL";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub retry: RetrySettings,
}

impl Config {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("doc-indexer").join("config.toml"))
    }

    /// Load defaults, then the config file, then `.env` and the process environment.
    ///
    /// An explicit `path` must exist; the default location may be absent.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path.map(Path::to_path_buf).or_else(Self::config_path) {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(&path)?;
                Self::from_toml_str(&content)?
            }
            Some(path) if Some(&path) != Self::config_path().as_ref() => {
                return Err(ConfigError::PathError(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            _ => Self::default(),
        };

        dotenvy::dotenv().ok();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Override values from environment variables resolved through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_QDRANT_URL) {
            self.vector_store.url = url;
        }
        if let Some(key) = lookup(ENV_QDRANT_API_KEY).filter(|k| !k.is_empty()) {
            self.vector_store.api_key = Some(key);
        }
        if let Some(collection) = lookup(ENV_COLLECTION) {
            self.vector_store.collection = collection;
        }
        if let Some(value) = lookup(ENV_MAX_INPUT_LENGTH) {
            self.embedding.max_input_length = parse_env(ENV_MAX_INPUT_LENGTH, &value)?;
        }
        if let Some(value) = lookup(ENV_DIMENSION) {
            self.embedding.dimension = parse_env(ENV_DIMENSION, &value)?;
        }
        if let Some(dir) = lookup(ENV_MODEL_DIR) {
            self.embedding.model_dir = Some(PathBuf::from(dir));
        }
        if let Some(url) = lookup(ENV_EMBEDDING_URL) {
            self.embedding.url = url;
        }
        Ok(())
    }

    /// Fail fast on settings that cannot work together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding.max_input_length == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.max_input_length must be greater than zero".to_string(),
            ));
        }
        if self.embedding.dimension == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.dimension must be greater than zero".to_string(),
            ));
        }
        if self.vector_size() != u64::from(self.embedding.dimension) {
            return Err(ConfigError::ValidationError(format!(
                "vector_store.vector_size ({}) does not match embedding.dimension ({})",
                self.vector_size(),
                self.embedding.dimension
            )));
        }
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.batch_size must be greater than zero".to_string(),
            ));
        }
        if self.ingest.concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "ingest.concurrency must be greater than zero".to_string(),
            ));
        }
        if self.vector_store.collection.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "vector_store.collection must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Dimensionality the collection is created with.
    pub fn vector_size(&self) -> u64 {
        self.vector_store
            .vector_size
            .map_or(u64::from(self.embedding.dimension), u64::from)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local ONNX sentence-transformer
    #[default]
    Onnx,
    /// Remote `/embed` endpoint
    Http,
}

impl fmt::Display for EmbeddingProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbeddingProvider::Onnx => write!(f, "onnx"),
            EmbeddingProvider::Http => write!(f, "http"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProvider,

    /// Directory holding `model.onnx` and `tokenizer.json`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_dir: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenizer_path: Option<PathBuf>,

    #[serde(default = "default_embedding_url")]
    pub url: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Token window of the model, special tokens included
    #[serde(default = "default_max_input_length")]
    pub max_input_length: u32,

    /// Length of the vectors the model produces
    #[serde(default = "default_dimension")]
    pub dimension: u32,
}

fn default_embedding_url() -> String {
    DEFAULT_EMBEDDING_URL.to_string()
}

fn default_timeout() -> u64 {
    120
}

fn default_batch_size() -> u32 {
    16
}

fn default_max_input_length() -> u32 {
    DEFAULT_MAX_INPUT_LENGTH
}

fn default_dimension() -> u32 {
    DEFAULT_EMBEDDING_DIMENSION
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            model_dir: None,
            tokenizer_path: None,
            url: default_embedding_url(),
            timeout_secs: default_timeout(),
            batch_size: default_batch_size(),
            max_input_length: default_max_input_length(),
            dimension: default_dimension(),
        }
    }
}

impl EmbeddingConfig {
    pub fn model_dir(&self) -> PathBuf {
        self.model_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("doc-indexer")
                .join("models")
                .join(DEFAULT_EMBEDDING_MODEL)
        })
    }

    pub fn tokenizer_file(&self) -> PathBuf {
        self.tokenizer_path
            .clone()
            .unwrap_or_else(|| self.model_dir().join("tokenizer.json"))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorDriver {
    #[default]
    Qdrant,
    /// Process-local store; nothing survives the run
    Memory,
}

impl fmt::Display for VectorDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VectorDriver::Qdrant => write!(f, "qdrant"),
            VectorDriver::Memory => write!(f, "memory"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    #[serde(default)]
    pub driver: VectorDriver,

    #[serde(default = "default_qdrant_url")]
    pub url: String,

    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Defaults to `embedding.dimension`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_size: Option<u32>,
}

fn default_qdrant_url() -> String {
    DEFAULT_QDRANT_URL.to_string()
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            driver: VectorDriver::default(),
            url: default_qdrant_url(),
            collection: default_collection(),
            api_key: None,
            vector_size: None,
        }
    }
}

/// What to do when a file cannot be read or parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractErrorPolicy {
    /// Record the failure and move on to the next file
    #[default]
    Skip,
    /// Stop the run
    Abort,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// 1 lists only the top-level directory
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Files processed at once; 1 is strictly sequential
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_file_timeout")]
    pub file_timeout_secs: u64,

    #[serde(default)]
    pub on_extract_error: ExtractErrorPolicy,

    #[serde(default)]
    pub origin_url: String,
}

fn default_max_depth() -> usize {
    1
}

fn default_concurrency() -> usize {
    1
}

fn default_file_timeout() -> u64 {
    600
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            exclude_patterns: Vec::new(),
            concurrency: default_concurrency(),
            file_timeout_secs: default_file_timeout(),
            on_extract_error: ExtractErrorPolicy::default(),
            origin_url: String::new(),
        }
    }
}

impl IngestConfig {
    pub fn file_timeout(&self) -> Duration {
        Duration::from_secs(self.file_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    200
}

fn default_max_delay_ms() -> u64 {
    10_000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig::new(self.max_retries)
            .with_initial_delay(Duration::from_millis(self.initial_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
    }
}
