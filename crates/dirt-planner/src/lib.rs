//! DirtGenie planning pipeline.
//!
//! A tour request flows through three stages:
//!
//! 1. **Plan**: the model proposes a day-by-day itinerary, which is parsed,
//!    assembled and, for closed loops, checked against the return limits.
//! 2. **Route**: every leg is routed by the directions service and the legs
//!    are stitched into one continuous path.
//! 3. **Generate**: the model writes the Markdown plan from the routed
//!    distances, and a GeoJSON document is built from the route.

pub mod backoff;
pub mod config;
pub mod llm;
pub mod narrator;
pub mod pipeline;
pub mod planner;
pub mod prompts;
pub mod revision;
pub mod stitcher;

#[cfg(test)]
mod testing;
#[cfg(test)]
mod tests;

pub use config::{Credentials, PipelineConfig, StitchMode};
pub use llm::{CompletionRequest, CompletionResponse, LlmClient, LlmError, OpenAIClient};
pub use narrator::PlanNarrator;
pub use pipeline::{PlannedTour, PlanningContext, TourPipeline};
pub use planner::ItineraryPlanner;
pub use revision::{FeedbackScope, RevisionEngine, RevisionState};
pub use stitcher::RouteStitcher;
