//! Itinerary planning: one model call, parsed and checked, with a single
//! stricter retry when the reply is unusable.

use std::sync::Arc;

use dirt_core::{
    assemble, compute_constraints, parse_model_response, Coordinate, ParseOutcome, PlanError,
    RadiusConstraints, StructuredItinerary, TourRequest,
};
use dirt_maps::DirectionsService;
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::config::PipelineConfig;
use crate::llm::{CompletionRequest, LlmClient};
use crate::prompts;

pub struct ItineraryPlanner {
    llm: Arc<dyn LlmClient>,
    directions: Arc<dyn DirectionsService>,
    config: PipelineConfig,
}

impl ItineraryPlanner {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        directions: Arc<dyn DirectionsService>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            llm,
            directions,
            config,
        }
    }

    /// Loop limits for closed loops; `None` for point-to-point tours.
    ///
    /// Geocodes the start so overnights can be measured against it.
    pub async fn constraints_for(
        &self,
        request: &TourRequest,
        request_id: Option<&str>,
    ) -> Result<Option<RadiusConstraints>, PlanError> {
        if !request.is_closed_loop() {
            return Ok(None);
        }
        let start = self.geocode_start(&request.start, request_id).await?;
        let constraints =
            compute_constraints(request.nights, &request.preferences.daily_distance, start)?;
        info!(
            nights = request.nights,
            max_radius_km = constraints.max_radius_km,
            "closed loop detected"
        );
        Ok(Some(constraints))
    }

    /// Transient service errors are retried with backoff, like directions.
    async fn geocode_start(
        &self,
        address: &str,
        request_id: Option<&str>,
    ) -> Result<Coordinate, PlanError> {
        let max_attempts = self.config.directions_max_retries + 1;
        let mut backoff = Backoff::new(self.config.backoff_base, self.config.backoff_max);

        loop {
            let err = match self.directions.geocode(address, request_id).await {
                Ok(Some(coordinate)) => return Ok(coordinate),
                Ok(None) => return Err(PlanError::Geocode(address.to_string())),
                Err(err) => err,
            };

            if !err.is_transient() {
                warn!(address, error = %err, "geocoding start failed");
                return Err(PlanError::Geocode(format!("{}: {}", address, err)));
            }
            if backoff.attempts() + 1 >= max_attempts {
                warn!(address, attempts = max_attempts, error = %err, "geocoding retries exhausted");
                return Err(PlanError::RoutingServiceUnavailable {
                    attempts: max_attempts,
                    message: err.to_string(),
                });
            }
            let delay = backoff.fail();
            warn!(
                address,
                attempt = backoff.attempts(),
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "transient geocoding error, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Ask the model for the day skeleton of `request`.
    pub async fn plan(
        &self,
        request: &TourRequest,
        constraints: Option<&RadiusConstraints>,
    ) -> Result<StructuredItinerary, PlanError> {
        let first = self.attempt(request, constraints, None).await;

        let defect = match first {
            Err(err) if err.is_model_defect() => err,
            other => return other,
        };
        warn!(error = %defect, "model itinerary rejected, retrying with stricter prompt");
        self.attempt(request, constraints, Some(&defect)).await
    }

    /// One model call. With `defect` set the prompt opens with a correction
    /// naming what was wrong with the previous itinerary.
    pub async fn attempt(
        &self,
        request: &TourRequest,
        constraints: Option<&RadiusConstraints>,
        defect: Option<&PlanError>,
    ) -> Result<StructuredItinerary, PlanError> {
        let prompt = match defect {
            Some(defect) => prompts::stricter_planning_prompt(request, constraints, defect),
            None => prompts::planning_prompt(request, constraints),
        };
        let completion = CompletionRequest::new(prompts::PLANNER_SYSTEM, prompt)
            .with_max_tokens(self.config.max_tokens)
            .with_temperature(self.config.temperature);
        let response = self
            .llm
            .complete(completion)
            .await
            .map_err(|err| PlanError::Model(err.to_string()))?;

        self.evaluate(response.content_str(), request, constraints)
    }

    /// Check loop overnights again once routing has given every waypoint a
    /// coordinate. Replies recovered from headings carry none before that.
    pub fn verify_routed(
        &self,
        itinerary: &StructuredItinerary,
        constraints: &RadiusConstraints,
    ) -> Result<(), PlanError> {
        constraints.verify(itinerary, self.config.constraint_tolerance)
    }

    /// Parse, assemble and (for loops) verify one model reply.
    pub fn evaluate(
        &self,
        text: &str,
        request: &TourRequest,
        constraints: Option<&RadiusConstraints>,
    ) -> Result<StructuredItinerary, PlanError> {
        let expected = request.days() as usize;
        let outcome = parse_model_response(text);
        debug!(outcome = outcome.label(), "parsed model itinerary");

        let draft = match outcome {
            ParseOutcome::Failed(reason) => {
                warn!(reason = %reason, "model itinerary unreadable");
                return Err(PlanError::ItineraryIncomplete { expected, found: 0 });
            }
            ParseOutcome::Recovered(draft) => {
                warn!(days = draft.days.len(), "itinerary recovered from day headings");
                draft
            }
            ParseOutcome::Parsed(draft) => draft,
        };

        let start = constraints.map(|c| c.start);
        let itinerary = assemble(draft, request, start)?;
        if let Some(constraints) = constraints {
            constraints.verify(&itinerary, self.config.constraint_tolerance)?;
        }

        info!(
            days = itinerary.days.len(),
            total_distance_km = itinerary.total_distance_km,
            "itinerary planned"
        );
        Ok(itinerary)
    }
}
