use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub artifact_bucket: String,
    pub data_dir: String,
    pub chunk_size: usize,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    pub model_id: String,
    pub llm_api_base: String,
    /// Only the association step needs this; checked when the HTTP
    /// model client is constructed, not here.
    pub llm_api_key: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            artifact_bucket: env::var("ARTIFACT_BUCKET")
                .unwrap_or_else(|_| "complimap-artifacts".to_string()),
            data_dir: env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
            // A zero chunk size violates the chunker contract; clamp it.
            chunk_size: env_usize("CHUNK_SIZE", 25).max(1),
            max_retries: env_usize("MAX_RETRIES", 2),
            retry_delay_ms: env::var("RETRY_DELAY_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1000),
            model_id: env::var("MODEL_ID").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            llm_api_base: env::var("LLM_API_BASE")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            llm_api_key: env::var("LLM_API_KEY").ok(),
        }
    }
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}
