//! Markdown trip plan generation.

use std::sync::Arc;

use dirt_core::{strip_code_fence, NarrativePlan, PlanError, StitchedRoute, StructuredItinerary, TourRequest};
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::llm::{CompletionRequest, FinishReason, LlmClient};
use crate::prompts;

pub struct PlanNarrator {
    llm: Arc<dyn LlmClient>,
    config: PipelineConfig,
}

impl PlanNarrator {
    pub fn new(llm: Arc<dyn LlmClient>, config: PipelineConfig) -> Self {
        Self { llm, config }
    }

    pub async fn narrate(
        &self,
        request: &TourRequest,
        itinerary: &StructuredItinerary,
        route: &StitchedRoute,
    ) -> Result<NarrativePlan, PlanError> {
        let prompt = prompts::narration_prompt(request, itinerary, route);
        let narrative = self.generate(prompts::NARRATOR_SYSTEM, prompt).await?;
        info!(chars = narrative.as_str().len(), "narrative generated");
        Ok(narrative)
    }

    /// Rewrite `prior` around `feedback`, keeping what the feedback leaves alone.
    pub async fn revise(
        &self,
        prior: &NarrativePlan,
        feedback: &str,
        request: &TourRequest,
        routed: Option<(&StructuredItinerary, &StitchedRoute)>,
    ) -> Result<NarrativePlan, PlanError> {
        let prompt = prompts::revision_prompt(prior.as_str(), feedback, request, routed);
        let narrative = self.generate(prompts::REVISION_SYSTEM, prompt).await?;
        info!(chars = narrative.as_str().len(), "narrative revised");
        Ok(narrative)
    }

    async fn generate(&self, system: &str, prompt: String) -> Result<NarrativePlan, PlanError> {
        let completion = CompletionRequest::new(system, prompt)
            .with_max_tokens(self.config.max_tokens)
            .with_temperature(self.config.temperature);
        let response = self
            .llm
            .complete(completion)
            .await
            .map_err(|err| PlanError::Model(err.to_string()))?;

        if response.finish_reason == FinishReason::Length {
            warn!("narrative hit the token limit and may be cut short");
        }

        let text = strip_code_fence(response.content_str()).trim();
        if text.is_empty() {
            return Err(PlanError::NarrativeEmpty);
        }
        Ok(NarrativePlan::new(text))
    }
}
