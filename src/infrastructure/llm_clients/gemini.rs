use super::LLMClient;
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::{GenerationParams, LLMConfig};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "topK")]
    top_k: u32,
    #[serde(rename = "topP")]
    top_p: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

impl From<&GenerationParams> for GenerationConfig {
    fn from(params: &GenerationParams) -> Self {
        Self {
            temperature: params.temperature,
            top_k: params.top_k,
            top_p: params.top_p,
            max_output_tokens: params.max_output_tokens,
        }
    }
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Deserialize)]
struct GeminiCandidatePart {
    text: Option<String>,
}

pub struct GeminiClient {
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_client(
            reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        )
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn api_key(config: &LLMConfig) -> Result<String> {
        config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| AppError::LLMError("Missing API key for Google provider".to_string()))
    }

    fn endpoint(config: &LLMConfig) -> Result<Url> {
        let invalid = |reason: String| {
            AppError::ConfigError(format!("Invalid base URL {}: {}", config.base_url, reason))
        };
        let mut url = Url::parse(config.base_url.trim()).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid("cannot be a base".to_string()))?
            .pop_if_empty()
            .push(&format!("{}:generateContent", config.model.trim()));
        Ok(url)
    }
}

impl Default for GeminiClient {
    fn default() -> Self {
        Self::new()
    }
}

fn build_request<'a>(config: &LLMConfig, prompt: &'a str) -> GeminiRequest<'a> {
    GeminiRequest {
        contents: vec![GeminiContent {
            parts: vec![GeminiPart { text: prompt }],
        }],
        generation_config: GenerationConfig::from(&config.generation),
    }
}

/// Timeouts and broken connections, including ones hit while the body streams in.
fn is_transport_failure(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
}

/// Map a non-success status onto the error taxonomy.
pub(crate) fn classify_status(status: StatusCode, body: String) -> AppError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        AppError::RateLimited(body)
    } else {
        AppError::Upstream {
            status: status.as_u16(),
            body,
        }
    }
}

fn first_candidate_text(response: GeminiResponse) -> Result<String> {
    let text = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .and_then(|content| content.parts.into_iter().next())
        .and_then(|part| part.text)
        .ok_or_else(|| AppError::LLMError("Invalid response format".to_string()))?;

    if text.trim().is_empty() {
        return Err(AppError::LLMError("Model returned empty content".to_string()));
    }
    Ok(text)
}

#[async_trait]
impl LLMClient for GeminiClient {
    async fn generate(&self, config: &LLMConfig, prompt: &str) -> Result<String> {
        let api_key = Self::api_key(config)?;
        let url = Self::endpoint(config)?;
        let body = build_request(config, prompt);

        debug!(model = %config.model, prompt_chars = prompt.len(), "Calling generateContent");

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Transport(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, text));
        }

        let raw = response.text().await.map_err(|e| {
            if is_transport_failure(&e) {
                AppError::Transport(format!("Failed to read response: {}", e))
            } else {
                AppError::LLMError(format!("Failed to read response: {}", e))
            }
        })?;
        let json: GeminiResponse = serde_json::from_str(&raw)
            .map_err(|e| AppError::LLMError(format!("Failed to parse JSON: {}", e)))?;

        first_candidate_text(json)
    }
}
