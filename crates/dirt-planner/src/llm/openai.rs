//! OpenAI Chat Completions client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{CompletionRequest, CompletionResponse, FinishReason, LlmClient, LlmError, TokenUsage};
use crate::backoff::Backoff;
use crate::config::PipelineConfig;

/// Check if an HTTP status code is retryable
pub(crate) fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

pub struct OpenAIClient {
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
    max_tokens: u32,
    max_retries: u32,
    backoff_base: Duration,
    backoff_max: Duration,
    timeout: Duration,
}

impl OpenAIClient {
    pub fn from_config(config: &PipelineConfig, api_key: &str) -> Result<Self, LlmError> {
        debug!(model = %config.model, base_url = %config.llm_base_url, "from_config: called");
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(LlmError::InvalidResponse("OpenAI API key is not set".to_string()));
        }

        let http = Client::builder()
            .timeout(config.llm_timeout)
            .build()
            .map_err(LlmError::Network)?;

        Ok(Self {
            model: config.model.clone(),
            api_key: api_key.to_string(),
            base_url: config.llm_base_url.trim_end_matches('/').to_string(),
            http,
            max_tokens: config.max_tokens,
            max_retries: config.llm_max_retries,
            backoff_base: config.backoff_base,
            backoff_max: config.backoff_max,
            timeout: config.llm_timeout,
        })
    }

    fn build_request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        debug!(%self.model, %request.max_tokens, "build_request_body: called");
        let max_tokens = request.max_tokens.min(self.max_tokens);

        // gpt-5 and o-series reasoning models take max_completion_tokens and a fixed temperature
        let reasoning_model = self.model.starts_with("gpt-5")
            || self.model.starts_with("o1")
            || self.model.starts_with("o3")
            || self.model.starts_with("o4");

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system_prompt },
                { "role": "user", "content": request.user_prompt },
            ],
        });

        if reasoning_model {
            body["max_completion_tokens"] = serde_json::json!(max_tokens);
        } else {
            body["max_tokens"] = serde_json::json!(max_tokens);
            body["temperature"] = serde_json::json!(request.temperature);
        }

        body
    }

    fn parse_response(&self, api_response: OpenAIResponse) -> CompletionResponse {
        debug!(choices = api_response.choices.len(), "parse_response: called");
        let usage = api_response
            .usage
            .map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        let (content, finish_reason) = match api_response.choices.into_iter().next() {
            Some(choice) => {
                let finish_reason = match choice.finish_reason.as_deref() {
                    Some("stop") | None => FinishReason::Stop,
                    Some("length") => FinishReason::Length,
                    Some("content_filter") => FinishReason::ContentFilter,
                    Some(_) => FinishReason::Other,
                };
                (choice.message.content, finish_reason)
            }
            None => (None, FinishReason::Other),
        };

        if finish_reason == FinishReason::Length {
            warn!(model = %self.model, "parse_response: completion truncated at max tokens");
        }

        CompletionResponse {
            content,
            finish_reason,
            usage,
        }
    }
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        debug!(%self.model, %request.max_tokens, "complete: called");
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.build_request_body(&request);
        let mut backoff = Backoff::new(self.backoff_base, self.backoff_max);

        let mut last_error: Option<LlmError> = None;
        for attempt in 0..=self.max_retries {
            if let Some(err) = last_error.as_ref() {
                let delay = backoff.fail_with_hint(err.retry_after());
                warn!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "complete: retrying after transient error");
                tokio::time::sleep(delay).await;
            }

            let response = match self
                .http
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) if e.is_timeout() => {
                    debug!(attempt, "complete: request timed out");
                    last_error = Some(LlmError::Timeout(self.timeout));
                    continue;
                }
                Err(e) => {
                    debug!(attempt, error = %e, "complete: network error");
                    last_error = Some(LlmError::Network(e));
                    continue;
                }
            };

            let status = response.status().as_u16();

            if status == 429 {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(60);
                debug!(attempt, retry_after, "complete: rate limited (429)");
                last_error = Some(LlmError::RateLimited {
                    retry_after: Duration::from_secs(retry_after),
                });
                continue;
            }

            if is_retryable_status(status) {
                let text = response.text().await.unwrap_or_default();
                debug!(attempt, status, "complete: retryable error");
                last_error = Some(LlmError::ApiError { status, message: text });
                continue;
            }

            if !response.status().is_success() {
                debug!(%status, "complete: API error");
                let text = response.text().await.unwrap_or_default();
                return Err(LlmError::ApiError { status, message: text });
            }

            debug!("complete: success");
            let api_response: OpenAIResponse = response.json().await?;
            return Ok(self.parse_response(api_response));
        }

        Err(last_error.unwrap_or_else(|| LlmError::InvalidResponse("Max retries exceeded".to_string())))
    }
}

// OpenAI API response types

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}
