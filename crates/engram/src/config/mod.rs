use serde::Deserialize;
use std::path::PathBuf;

/// Consolidation engine configuration
///
/// Supplied programmatically at engine construction; also deserializable
/// from TOML for applications that keep their settings in a file.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Minimum similarity score for merging into an existing record
    /// (inclusive). Scores are cosine similarity in [0, 1].
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    /// Maximum number of entries held in short-term memory
    #[serde(default = "default_max_short_term_size")]
    pub max_short_term_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            max_short_term_size: default_max_short_term_size(),
        }
    }
}

fn default_similarity_threshold() -> f32 {
    0.8
}

fn default_max_short_term_size() -> usize {
    50
}

/// File-embedded backend configuration (LanceDB)
#[derive(Debug, Clone, Deserialize)]
pub struct FileBackendConfig {
    /// Directory holding the database files
    pub data_dir: PathBuf,
    /// Embedding dimensionality for the records table
    #[serde(default = "default_dimension")]
    pub dimension: usize,
}

fn default_dimension() -> usize {
    384
}

/// Relational-server backend configuration (SurrealDB over HTTP)
#[derive(Debug, Clone, Deserialize)]
pub struct ServerBackendConfig {
    /// Server endpoint, e.g. "http://127.0.0.1:8000"
    pub url: String,
    /// Root username for authentication
    pub username: String,
    /// Root password for authentication
    pub password: String,
    /// Namespace to select after signin
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Database to select after signin
    #[serde(default = "default_database")]
    pub database: String,
}

fn default_namespace() -> String {
    "engram".to_string()
}

fn default_database() -> String {
    "memory".to_string()
}

/// Remote-dataset backend configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetBackendConfig {
    /// Hub endpoint, e.g. "https://hub.example.com"
    pub endpoint: String,
    /// Dataset identifier, e.g. "org/long-term-memory"
    pub dataset: String,
    /// Environment variable holding the access token
    #[serde(default = "default_token_env")]
    pub token_env: String,
    /// Request timeout in seconds
    #[serde(default = "default_dataset_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_token_env() -> String {
    "DATASET_HUB_TOKEN".to_string()
}

fn default_dataset_timeout_secs() -> u64 {
    30
}

/// Remote analysis hook configuration (OpenAI-compatible API)
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    /// API endpoint URL
    #[serde(default)]
    pub api_url: String,
    /// Environment variable name for the API key
    #[serde(default = "default_analysis_api_key_env")]
    pub api_key_env: String,
    /// Model identifier for the scoring request
    #[serde(default = "default_analysis_model")]
    pub model: String,
    /// Request timeout in seconds
    #[serde(default = "default_analysis_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            api_key_env: default_analysis_api_key_env(),
            model: default_analysis_model(),
            timeout_secs: default_analysis_timeout_secs(),
        }
    }
}

fn default_analysis_api_key_env() -> String {
    "ANALYSIS_API_KEY".to_string()
}

fn default_analysis_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_analysis_timeout_secs() -> u64 {
    30
}
