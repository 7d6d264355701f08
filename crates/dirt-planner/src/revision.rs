//! Feedback-driven revision of a held tour.

use std::sync::OnceLock;

use dirt_core::{geometry, PlanError, TourRequest};
use regex::Regex;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::pipeline::{PlannedTour, TourPipeline};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisionState {
    Stable,
    Revising,
}

/// What a piece of feedback asks to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackScope {
    /// Rewrite the narrative only; itinerary and route stay as they are.
    NarrativeOnly,
    /// Plan and route again before rewriting the narrative.
    RouteChange,
}

fn route_change_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(shorter|longer|re-?route|detour|distances?|mileage|km|kilomet(?:er|re)s?|miles?|stops?|overnights?|nights?|(?:extra|more|fewer|another|less|one)\s+days?|add(?:ing)?\s+a\s+day|different\s+(?:route|way|direction|town|towns|campground))\b",
        )
        .expect("route change pattern is valid")
    })
}

impl FeedbackScope {
    /// Route change when the trip itself differs from `held`, or when the
    /// feedback asks for different stops, distances or days.
    pub fn classify(feedback: &str, held: &TourRequest, revised: Option<&TourRequest>) -> Self {
        if let Some(revised) = revised {
            let trip_changed = revised.nights != held.nights
                || !revised.start.eq_ignore_ascii_case(&held.start)
                || !revised.end.eq_ignore_ascii_case(&held.end)
                || revised.preferences.daily_distance != held.preferences.daily_distance;
            if trip_changed {
                return FeedbackScope::RouteChange;
            }
        }
        if route_change_re().is_match(feedback) {
            FeedbackScope::RouteChange
        } else {
            FeedbackScope::NarrativeOnly
        }
    }
}

/// Holds the latest tour and applies feedback to it one revision at a time.
pub struct RevisionEngine<'a> {
    pipeline: &'a TourPipeline,
    state: RevisionState,
    tour: PlannedTour,
}

impl<'a> RevisionEngine<'a> {
    pub fn new(pipeline: &'a TourPipeline, tour: PlannedTour) -> Self {
        Self {
            pipeline,
            state: RevisionState::Stable,
            tour,
        }
    }

    pub fn state(&self) -> RevisionState {
        self.state
    }

    pub fn tour(&self) -> &PlannedTour {
        &self.tour
    }

    pub fn into_tour(self) -> PlannedTour {
        self.tour
    }

    /// Apply `feedback`, optionally with an edited request.
    ///
    /// On failure the previous tour is kept and the error returned.
    pub async fn revise(
        &mut self,
        feedback: &str,
        revised_request: Option<TourRequest>,
    ) -> Result<&PlannedTour, PlanError> {
        self.state = RevisionState::Revising;
        let result = self.apply(feedback, revised_request).await;
        self.state = RevisionState::Stable;

        match result {
            Ok(tour) => {
                self.tour = tour;
                Ok(&self.tour)
            }
            Err(err) => {
                warn!(error = %err, kind = ?err.kind(), "revision failed, keeping previous tour");
                Err(err)
            }
        }
    }

    async fn apply(
        &self,
        feedback: &str,
        revised_request: Option<TourRequest>,
    ) -> Result<PlannedTour, PlanError> {
        let scope = FeedbackScope::classify(feedback, &self.tour.request, revised_request.as_ref());
        let request = revised_request.unwrap_or_else(|| self.tour.request.clone());
        request.validate()?;

        let request_id = Uuid::new_v4().to_string();
        let span = info_span!("revise_tour", request_id = %request_id, scope = ?scope);

        async move {
            let (itinerary, route, geometry) = match scope {
                FeedbackScope::RouteChange => {
                    info!("feedback changes the route, planning again");
                    let (itinerary, route) =
                        self.pipeline.route_tour(&request, Some(&request_id)).await?;
                    let geometry = geometry::build(&route, &itinerary)?;
                    (itinerary, route, geometry)
                }
                FeedbackScope::NarrativeOnly => (
                    self.tour.itinerary.clone(),
                    self.tour.route.clone(),
                    self.tour.geometry.clone(),
                ),
            };

            let narrative = self
                .pipeline
                .narrator()
                .revise(
                    &self.tour.narrative,
                    feedback,
                    &request,
                    Some((&itinerary, &route)),
                )
                .await?;

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
}
