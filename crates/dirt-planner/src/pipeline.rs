//! Plan → Route → Generate for one tour request.

use std::sync::Arc;

use dirt_core::{
    geometry, GeometryDocument, NarrativePlan, PlanError, StitchedRoute, StructuredItinerary,
    TourRequest, TripPreferences,
};
use dirt_maps::{DirectionsService, GoogleMapsClient};
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::{Credentials, PipelineConfig};
use crate::llm::{self, LlmClient};
use crate::narrator::PlanNarrator;
use crate::planner::ItineraryPlanner;
use crate::revision::{FeedbackScope, RevisionEngine};
use crate::stitcher::RouteStitcher;

/// Everything one planning request needs. Built per request; nothing here
/// is shared between riders.
#[derive(Clone)]
pub struct PlanningContext {
    pub llm: Arc<dyn LlmClient>,
    pub directions: Arc<dyn DirectionsService>,
    pub config: PipelineConfig,
}

impl PlanningContext {
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

    /// Real OpenAI and Google Maps clients for `credentials`.
    ///
    /// The keys live only inside the clients built here.
    pub fn from_credentials(
        config: PipelineConfig,
        credentials: Credentials,
    ) -> Result<Self, PlanError> {
        let missing = credentials.missing();
        if !missing.is_empty() {
            return Err(PlanError::InvalidPreferences(format!(
                "missing API keys: {}",
                missing.join(", ")
            )));
        }

        let llm = llm::create_client(&config, &credentials.openai_api_key)
            .map_err(|err| PlanError::Model(err.to_string()))?;
        let directions = GoogleMapsClient::new(
            credentials.google_maps_api_key.clone(),
            config.maps_base_url.clone(),
            config.directions_timeout,
        )
        .map_err(|err| PlanError::RoutingRejected(err.to_string()))?;

        Ok(Self {
            llm,
            directions: Arc::new(directions),
            config,
        })
    }
}

/// A fully planned tour.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedTour {
    pub request: TourRequest,
    pub itinerary: StructuredItinerary,
    pub route: StitchedRoute,
    pub narrative: NarrativePlan,
    pub geometry: GeometryDocument,
    pub total_distance_km: f64,
}

pub struct TourPipeline {
    planner: ItineraryPlanner,
    stitcher: RouteStitcher,
    narrator: PlanNarrator,
}

impl TourPipeline {
    pub fn new(context: PlanningContext) -> Self {
        let PlanningContext {
            llm,
            directions,
            config,
        } = context;
        Self {
            planner: ItineraryPlanner::new(llm.clone(), directions.clone(), config.clone()),
            stitcher: RouteStitcher::new(directions, config.clone()),
            narrator: PlanNarrator::new(llm, config),
        }
    }

    pub fn narrator(&self) -> &PlanNarrator {
        &self.narrator
    }

    /// Plan, route and narrate a tour.
    pub async fn plan(
        &self,
        start: &str,
        end: &str,
        nights: u32,
        preferences: TripPreferences,
    ) -> Result<PlannedTour, PlanError> {
        let request = TourRequest::new(start, end, nights, preferences)?;
        self.plan_request(request).await
    }

    pub async fn plan_request(&self, request: TourRequest) -> Result<PlannedTour, PlanError> {
        let request_id = Uuid::new_v4().to_string();
        let span = info_span!(
            "plan_tour",
            request_id = %request_id,
            start = %request.start,
            end = %request.end,
            nights = request.nights
        );

        async move {
            request.validate()?;
            let (itinerary, route) = self.route_tour(&request, Some(&request_id)).await?;
            let narrative = self.narrator.narrate(&request, &itinerary, &route).await?;
            let geometry = geometry::build(&route, &itinerary)?;

            info!(
                total_distance_km = route.total_distance_km,
                stops = route.stops.len(),
                "tour planned"
            );
            Ok::<_, PlanError>(PlannedTour {
                total_distance_km: route.total_distance_km,
                request,
                itinerary,
                route,
                narrative,
                geometry,
            })
        }
        .instrument(span)
        .await
    }

    /// Revise a narrative without a held tour.
    ///
    /// Feedback that only touches the write-up is applied to the prior
    /// narrative as is. Feedback asking for different stops, distances or
    /// days plans and routes `original_request` again first.
    pub async fn revise(
        &self,
        prior_narrative: &str,
        feedback: &str,
        original_request: &TourRequest,
    ) -> Result<NarrativePlan, PlanError> {
        let scope = FeedbackScope::classify(feedback, original_request, None);
        let request_id = Uuid::new_v4().to_string();
        let span = info_span!("revise_tour", request_id = %request_id, scope = ?scope);

        async move {
            original_request.validate()?;
            let prior = NarrativePlan::new(prior_narrative);
            match scope {
                FeedbackScope::RouteChange => {
                    info!("feedback changes the route, planning again");
                    let (itinerary, route) =
                        self.route_tour(original_request, Some(&request_id)).await?;
                    self.narrator
                        .revise(&prior, feedback, original_request, Some((&itinerary, &route)))
                        .await
                }
                FeedbackScope::NarrativeOnly => {
                    self.narrator
                        .revise(&prior, feedback, original_request, None)
                        .await
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Stateful revisions starting from `tour`.
    pub fn revision_engine(&self, tour: PlannedTour) -> RevisionEngine<'_> {
        RevisionEngine::new(self, tour)
    }

    /// Plan and route, without narration.
    ///
    /// Loops are checked again on the routed coordinates. The model gets a
    /// single stricter retry across both checks.
    pub(crate) async fn route_tour(
        &self,
        request: &TourRequest,
        request_id: Option<&str>,
    ) -> Result<(StructuredItinerary, StitchedRoute), PlanError> {
        let Some(constraints) = self.planner.constraints_for(request, request_id).await? else {
            let mut itinerary = self.planner.plan(request, None).await?;
            let route = self.stitcher.stitch(&mut itinerary, request_id).await?;
            return Ok((itinerary, route));
        };

        let mut defect: Option<PlanError> = None;
        loop {
            let attempt = self
                .planner
                .attempt(request, Some(&constraints), defect.as_ref())
                .await;
            let mut itinerary = match attempt {
                Err(err) if err.is_model_defect() && defect.is_none() => {
                    warn!(error = %err, "model itinerary rejected, retrying with stricter prompt");
                    defect = Some(err);
                    continue;
                }
                other => other?,
            };

            let route = self.stitcher.stitch(&mut itinerary, request_id).await?;
            match self.planner.verify_routed(&itinerary, &constraints) {
                Ok(()) => return Ok((itinerary, route)),
                Err(err) if defect.is_none() => {
                    warn!(
                        error = %err,
                        "routed overnight breaks the loop limit, retrying with stricter prompt"
                    );
                    defect = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
    }
}
