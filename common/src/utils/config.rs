use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackendKind {
    Fastembed,
    Openai,
    Hashed,
}

fn default_embedding_backend() -> EmbeddingBackendKind {
    EmbeddingBackendKind::Fastembed
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub openai_api_key: String,
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
    pub http_port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_generation_model")]
    pub generation_model: String,
    #[serde(default = "default_embedding_backend")]
    pub embedding_backend: EmbeddingBackendKind,
    #[serde(default)]
    pub embedding_model: Option<String>,
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: usize,
    #[serde(default = "default_true")]
    pub reranking_enabled: bool,
    #[serde(default)]
    pub reranking_pool_size: Option<usize>,
    /// Initial retrieval fan-out before reranking.
    #[serde(default = "default_initial_k")]
    pub initial_k: usize,
    /// Number of chunks kept after reranking.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Per-user conversation memory capacity.
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    /// Hard ceiling on the estimated prompt size, in tokens.
    #[serde(default = "default_prompt_token_budget")]
    pub prompt_token_budget: usize,
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_generation_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_embedding_dimensions() -> usize {
    384
}

const fn default_true() -> bool {
    true
}

const fn default_initial_k() -> usize {
    20
}

const fn default_top_k() -> usize {
    5
}

const fn default_max_turns() -> usize {
    5
}

const fn default_prompt_token_budget() -> usize {
    8192
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}
