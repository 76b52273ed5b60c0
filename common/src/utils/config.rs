use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalBackend {
    #[default]
    SurrealDb,
    Static,
}

#[derive(Clone, Deserialize, Debug)]
#[allow(clippy::struct_field_names)]
pub struct AppConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    // Ingestion
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,
    #[serde(default)]
    pub chunk_overlap_chars: usize,
    #[serde(default = "default_upsert_batch_size")]
    pub upsert_batch_size: usize,

    // Chat
    #[serde(default = "default_retrieval_limit")]
    pub retrieval_limit: usize,
    #[serde(default = "default_max_history_messages")]
    pub max_history_messages: usize,

    // Generation
    #[serde(default = "default_generation_provider")]
    pub generation_provider: String,
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    #[serde(default)]
    pub gemini_api_key: Option<String>,
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,
    #[serde(default = "default_gemini_base_url")]
    pub gemini_base_url: String,
    #[serde(default = "default_local_llm_base_url")]
    pub local_llm_base_url: String,
    #[serde(default = "default_local_llm_model")]
    pub local_llm_model: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,
    #[serde(default = "default_llm_temperature")]
    pub llm_temperature: f32,
    #[serde(default = "default_llm_max_tokens")]
    pub llm_max_tokens: u32,

    // Retrieval store
    #[serde(default)]
    pub retrieval_backend: RetrievalBackend,
    #[serde(default = "default_surrealdb_address")]
    pub surrealdb_address: String,
    #[serde(default)]
    pub surrealdb_username: Option<String>,
    #[serde(default)]
    pub surrealdb_password: Option<String>,
    #[serde(default = "default_surrealdb_namespace")]
    pub surrealdb_namespace: String,
    #[serde(default = "default_surrealdb_database")]
    pub surrealdb_database: String,
    #[serde(default = "default_embedding_backend")]
    pub embedding_backend: String,
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: usize,
    #[serde(default)]
    pub embedding_model: Option<String>,
}

fn default_http_port() -> u16 {
    3000
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_allowed_extensions() -> Vec<String> {
    [".txt", ".md", ".markdown", ".pdf"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn default_max_chunk_chars() -> usize {
    1_000
}

fn default_upsert_batch_size() -> usize {
    32
}

fn default_retrieval_limit() -> usize {
    3
}

fn default_max_history_messages() -> usize {
    20
}

fn default_generation_provider() -> String {
    "dummy".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_gemini_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_local_llm_base_url() -> String {
    "http://localhost:8080/v1".to_string()
}

fn default_local_llm_model() -> String {
    "local-model".to_string()
}

fn default_llm_timeout_secs() -> u64 {
    60
}

fn default_llm_temperature() -> f32 {
    0.1
}

fn default_llm_max_tokens() -> u32 {
    1024
}

fn default_surrealdb_address() -> String {
    "mem://".to_string()
}

fn default_surrealdb_namespace() -> String {
    "rag".to_string()
}

fn default_surrealdb_database() -> String {
    "rag".to_string()
}

fn default_embedding_backend() -> String {
    "hashed".to_string()
}

fn default_embedding_dimensions() -> usize {
    384
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            max_upload_bytes: default_max_upload_bytes(),
            allowed_extensions: default_allowed_extensions(),
            max_chunk_chars: default_max_chunk_chars(),
            chunk_overlap_chars: 0,
            upsert_batch_size: default_upsert_batch_size(),
            retrieval_limit: default_retrieval_limit(),
            max_history_messages: default_max_history_messages(),
            generation_provider: default_generation_provider(),
            openai_api_key: None,
            openai_model: default_openai_model(),
            openai_base_url: default_openai_base_url(),
            gemini_api_key: None,
            gemini_model: default_gemini_model(),
            gemini_base_url: default_gemini_base_url(),
            local_llm_base_url: default_local_llm_base_url(),
            local_llm_model: default_local_llm_model(),
            llm_timeout_secs: default_llm_timeout_secs(),
            llm_temperature: default_llm_temperature(),
            llm_max_tokens: default_llm_max_tokens(),
            retrieval_backend: RetrievalBackend::default(),
            surrealdb_address: default_surrealdb_address(),
            surrealdb_username: None,
            surrealdb_password: None,
            surrealdb_namespace: default_surrealdb_namespace(),
            surrealdb_database: default_surrealdb_database(),
            embedding_backend: default_embedding_backend(),
            embedding_dimensions: default_embedding_dimensions(),
            embedding_model: None,
        }
    }
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(
            Environment::default()
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("allowed_extensions"),
        )
        .build()?;

    config.try_deserialize()
}
