//! OpenAI completions client (legacy `/v1/completions`, used with fine-tuned models).

use crate::llm::Completer;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Client for the OpenAI completions API.
#[derive(Clone)]
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("completion rejected credentials: {0}")]
    Unauthorized(String),
    #[error("completion rate limited or over quota: {0}")]
    RateLimited(String),
    #[error("completion api error: {0}")]
    Api(String),
    #[error("completion returned no choices")]
    NoChoices,
}

impl OpenAiClient {
    pub fn new(base_url: Option<String>, api_key: impl Into<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    /// POST /completions — one attempt, first choice trimmed.
    pub async fn complete(
        &self,
        prompt: &str,
        model: &str,
        max_tokens: u32,
    ) -> Result<String, CompletionError> {
        let url = format!("{}/completions", self.base_url);
        let body = CompletionRequest {
            model,
            prompt,
            max_tokens,
        };
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            let detail = format!("{} {}", status, body);
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    CompletionError::Unauthorized(detail)
                }
                StatusCode::TOO_MANY_REQUESTS => CompletionError::RateLimited(detail),
                _ => CompletionError::Api(detail),
            });
        }
        let data: CompletionResponse = res.json().await?;
        first_choice_text(data)
    }
}

#[async_trait]
impl Completer for OpenAiClient {
    async fn complete(
        &self,
        prompt: &str,
        model: &str,
        max_tokens: u32,
    ) -> Result<String, CompletionError> {
        OpenAiClient::complete(self, prompt, model, max_tokens).await
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    text: String,
}

fn first_choice_text(data: CompletionResponse) -> Result<String, CompletionError> {
    data.choices
        .into_iter()
        .next()
        .map(|c| c.text.trim().to_string())
        .ok_or(CompletionError::NoChoices)
}
