//! OpenAI-compatible chat-completions client implementing `ModelClient`.

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::llm::ModelClient;

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Option<Vec<Choice>>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// HTTP binding of the `converse` contract.
#[derive(Debug)]
pub struct HttpModelClient {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model_id: String,
}

impl HttpModelClient {
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let api_key = config
            .llm_api_key
            .clone()
            .context("LLM_API_KEY is not set")?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            api_base: config.llm_api_base.trim_end_matches('/').to_string(),
            api_key,
            model_id: config.model_id.clone(),
        })
    }
}

impl ModelClient for HttpModelClient {
    async fn converse(&self, prompt: &str) -> anyhow::Result<String> {
        let request = ChatRequest {
            model: self.model_id.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            // Association needs reproducible structured output.
            temperature: 0.0,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .context("model request failed")?;

        let status = response.status();
        let body: ChatResponse = response
            .json()
            .await
            .with_context(|| format!("model response body unreadable (status {status})"))?;

        if let Some(error) = body.error {
            anyhow::bail!("model API error (status {status}): {}", error.message);
        }

        body.choices
            .and_then(|mut choices| {
                if choices.is_empty() {
                    None
                } else {
                    Some(choices.remove(0).message.content)
                }
            })
            .with_context(|| format!("model response carried no choices (status {status})"))
    }
}
