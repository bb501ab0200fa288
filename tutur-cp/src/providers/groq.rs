//! Groq chat-completion correction client

use super::{split_numbered_lines, CorrectionProvider, ProviderError};
use crate::config::ProviderConfig;
use crate::models::CorrectionMode;
use crate::prompts;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

const GROQ_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const QUICK_MODEL: &str = "llama-3.1-8b-instant";
const ENHANCED_MODEL: &str = "llama-3.1-70b-versatile";
const USER_AGENT: &str = concat!("tutur/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

pub struct GroqClient {
    http_client: reqwest::Client,
    api_key: Option<String>,
    disabled: bool,
}

impl GroqClient {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            http_client: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client (system error)"),
            api_key: config.groq_api_key.clone(),
            disabled: config.disable_groq,
        }
    }

    fn model_for(mode: CorrectionMode) -> &'static str {
        match mode {
            CorrectionMode::Quick => QUICK_MODEL,
            CorrectionMode::Enhanced => ENHANCED_MODEL,
        }
    }
}

#[async_trait]
impl CorrectionProvider for GroqClient {
    fn name(&self) -> &'static str {
        "groq"
    }

    fn available(&self) -> bool {
        !self.disabled && self.api_key.is_some()
    }

    async fn correct_batch(
        &self,
        texts: &[String],
        mode: CorrectionMode,
        glossary: Option<&[String]>,
    ) -> Result<Vec<String>, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ProviderError::MissingCredentials("groq"))?;

        let system = prompts::build_correction_prompt(glossary);
        let prompt = prompts::wrap_batch_prompt(&system, texts);

        debug!(count = texts.len(), mode = %mode, "Querying Groq chat completions");

        let response = self
            .http_client
            .post(GROQ_API_URL)
            .bearer_auth(api_key)
            .json(&json!({
                "model": Self::model_for(mode),
                "messages": [
                    { "role": "system", "content": system },
                    { "role": "user", "content": prompt },
                ],
                "temperature": 0.2,
                "max_tokens": 512,
            }))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                provider: "groq",
                status: status.as_u16(),
            });
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|_| ProviderError::ShapeMismatch("groq"))?;

        let content = completion
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or(ProviderError::ShapeMismatch("groq"))?;

        Ok(split_numbered_lines(content))
    }
}
