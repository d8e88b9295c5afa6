// telemetry-backends-rs/src/llm_client.rs
//
// HTTP client for an OpenAI-compatible chat-completions endpoint, used as the
// engine's reasoning service.
//
// - Retryable failures (server errors, network errors, rate limits) are retried
//   with exponential backoff plus a small random jitter.
// - Everything else fails fast.
//
// Configuration: see `LlmConfig::from_env` (LLM_API_URL, LLM_MODEL, LLM_API_KEY,
// LLM_MAX_RETRIES, LLM_INITIAL_RETRY_DELAY_MS, LLM_MAX_RETRY_DELAY_MS,
// LLM_TEMPERATURE, LLM_MAX_TOKENS).

use std::time::Duration;

use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff, ExponentialBackoffBuilder};
use rand::Rng;
use rca_engine::{CollaboratorError, ReasoningService};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::LlmConfig;
use crate::error::LlmError;

/// Sent ahead of every analysis request.
pub const SYSTEM_PROMPT: &str = "You are a site reliability engineer performing root-cause analysis. \
Base every conclusion on the evidence provided and answer with a single JSON object only.";

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: u32,
}

pub struct LlmClient {
    client: Client,
    config: LlmConfig,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient").field("config", &self.config).finish_non_exhaustive()
    }
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| LlmError::UnknownError(format!("could not build HTTP client: {}", e)))?;

        info!(api_url = %config.api_url, model = %config.model, "reasoning client initialized");
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Exponential backoff: doubles from the initial delay up to the
    /// configured maximum, with a two minute ceiling on total retry time.
    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.config.initial_retry_delay_ms))
            .with_max_interval(Duration::from_millis(self.config.max_retry_delay_ms))
            .with_multiplier(2.0)
            .with_max_elapsed_time(Some(Duration::from_secs(120)))
            .with_randomization_factor(0.5)
            .build()
    }

    /// Send one chat completion, retrying transient failures.
    pub async fn generate_text(&self, prompt: &str, system_prompt: Option<&str>) -> Result<String, LlmError> {
        let mut backoff = self.create_backoff();
        let mut attempt = 0;

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system_prompt {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.to_string(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        });

        let request_body = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages,
            temperature: Some(self.config.temperature),
            max_tokens: Some(self.config.max_tokens),
        };

        loop {
            attempt += 1;
            if attempt > 1 {
                info!(attempt, "retrying reasoning request");
            }

            match self.execute_request(&request_body).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    if !err.is_retryable() || attempt > self.config.max_retries {
                        error!(attempt, error = %err, "reasoning request failed");
                        return Err(err);
                    }

                    match backoff.next_backoff() {
                        Some(delay) => {
                            let jitter = rand::thread_rng().gen_range(0..=200);
                            let delay = delay + Duration::from_millis(jitter);
                            warn!(error = %err, ?delay, "retryable reasoning failure");
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            error!(error = %err, "exceeded maximum backoff time");
                            return Err(err);
                        }
                    }
                }
            }
        }
    }

    async fn execute_request(&self, request_body: &ChatCompletionRequest) -> Result<String, LlmError> {
        let mut request = self.client.post(&self.config.api_url).json(request_body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                LlmError::NetworkError(format!("Request timed out: {}", err))
            } else if err.is_connect() {
                LlmError::NetworkError(format!("Connection failed: {}", err))
            } else {
                LlmError::NetworkError(err.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                400 => LlmError::InvalidRequest(format!("Bad request: {}", text)),
                401 => LlmError::InvalidRequest(format!("Unauthorized: {}", text)),
                403 => LlmError::InvalidRequest(format!("Forbidden: {}", text)),
                404 => LlmError::ModelNotAvailable(format!("Not found: {}", text)),
                429 => LlmError::RateLimitExceeded(text),
                500 | 502 | 503 | 504 => LlmError::ServerError(format!("{}: {}", status, text)),
                _ => LlmError::UnknownError(format!("{}: {}", status, text)),
            });
        }

        let data: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(format!("Failed to parse response: {}", e)))?;

        if let Some(usage) = &data.usage {
            debug!(total_tokens = usage.total_tokens, "reasoning request completed");
        }

        data.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| LlmError::ParseError("No choices returned in response".to_string()))
    }
}

#[async_trait]
impl ReasoningService for LlmClient {
    async fn infer(&self, request: &str) -> Result<String, CollaboratorError> {
        self.generate_text(request, Some(SYSTEM_PROMPT))
            .await
            .map_err(CollaboratorError::from)
    }
}
