//! HuggingFace Inference API correction client
//!
//! The Inference API answers with either an array of generations or a single
//! object, and the text field differs by task; decoding covers the shapes we
//! accept explicitly instead of probing fields at runtime.

use super::{split_numbered_lines, CorrectionProvider, ProviderError};
use crate::config::ProviderConfig;
use crate::models::CorrectionMode;
use crate::prompts;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

const HF_API_BASE: &str = "https://api-inference.huggingface.co/models";
const DEFAULT_MODEL: &str = "google/flan-t5-base";
const USER_AGENT: &str = concat!("tutur/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InferenceResponse {
    Many(Vec<Generation>),
    One(Generation),
}

#[derive(Debug, Deserialize)]
struct Generation {
    #[serde(default)]
    generated_text: Option<String>,
    #[serde(default)]
    summary_text: Option<String>,
}

impl Generation {
    fn into_text(self) -> Option<String> {
        self.generated_text.or(self.summary_text)
    }
}

impl InferenceResponse {
    fn into_text(self) -> Option<String> {
        match self {
            InferenceResponse::Many(mut generations) => {
                if generations.is_empty() {
                    None
                } else {
                    generations.remove(0).into_text()
                }
            }
            InferenceResponse::One(generation) => generation.into_text(),
        }
    }
}

pub struct HuggingFaceClient {
    http_client: reqwest::Client,
    api_token: Option<String>,
    disabled: bool,
}

impl HuggingFaceClient {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            http_client: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client (system error)"),
            api_token: config.hf_api_token.clone(),
            disabled: config.disable_hf,
        }
    }
}

#[async_trait]
impl CorrectionProvider for HuggingFaceClient {
    fn name(&self) -> &'static str {
        "huggingface"
    }

    fn available(&self) -> bool {
        !self.disabled && self.api_token.is_some()
    }

    async fn correct_batch(
        &self,
        texts: &[String],
        _mode: CorrectionMode,
        glossary: Option<&[String]>,
    ) -> Result<Vec<String>, ProviderError> {
        let api_token = self
            .api_token
            .as_deref()
            .ok_or(ProviderError::MissingCredentials("huggingface"))?;

        let system = prompts::build_correction_prompt(glossary);
        let prompt = prompts::wrap_batch_prompt(&system, texts);
        let url = format!("{}/{}", HF_API_BASE, DEFAULT_MODEL);

        debug!(count = texts.len(), model = DEFAULT_MODEL, "Querying HuggingFace inference");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(api_token)
            .json(&json!({
                "inputs": prompt,
                "parameters": { "max_new_tokens": 256, "temperature": 0.2 },
            }))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                provider: "huggingface",
                status: status.as_u16(),
            });
        }

        let decoded: InferenceResponse = response
            .json()
            .await
            .map_err(|_| ProviderError::ShapeMismatch("huggingface"))?;

        let text = decoded
            .into_text()
            .ok_or(ProviderError::ShapeMismatch("huggingface"))?;

        Ok(split_numbered_lines(&text))
    }
}
