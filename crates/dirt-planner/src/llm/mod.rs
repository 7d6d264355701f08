//! Language-model client used by the planner, narrator and revision steps.

use std::sync::Arc;

use tracing::debug;

pub mod client;
mod error;
mod openai;
mod types;

pub use client::LlmClient;
pub use error::LlmError;
pub use openai::OpenAIClient;
pub use types::{CompletionRequest, CompletionResponse, FinishReason, TokenUsage};

use crate::config::PipelineConfig;

/// Build the OpenAI-backed client for one request's credentials.
pub fn create_client(config: &PipelineConfig, api_key: &str) -> Result<Arc<dyn LlmClient>, LlmError> {
    debug!(model = %config.model, "create_client: called");
    Ok(Arc::new(OpenAIClient::from_config(config, api_key)?))
}
