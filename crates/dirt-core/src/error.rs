//! Failure taxonomy for the planning pipeline.

use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by the plan, route and narrate stages.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    #[error("invalid preferences: {0}")]
    InvalidPreferences(String),

    #[error("itinerary incomplete: expected {expected} day destinations, recovered {found}")]
    ItineraryIncomplete { expected: usize, found: usize },

    #[error(
        "day {day} overnight is {distance_km:.1} km from the start, limit is {limit_km:.1} km"
    )]
    ConstraintViolation {
        day: u32,
        distance_km: f64,
        limit_km: f64,
    },

    #[error("no bicycle route found for leg {leg_index} ({from} -> {to})")]
    RouteNotFound {
        leg_index: usize,
        from: String,
        to: String,
    },

    #[error("routing service unavailable after {attempts} attempts: {message}")]
    RoutingServiceUnavailable { attempts: u32, message: String },

    #[error("routing request rejected: {0}")]
    RoutingRejected(String),

    #[error("could not geocode '{0}'")]
    Geocode(String),

    #[error("cannot build geometry from an empty route")]
    EmptyRoute,

    #[error("model call failed: {0}")]
    Model(String),

    #[error("model returned an empty narrative")]
    NarrativeEmpty,
}

/// Stable, presentation-friendly failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidPreferences,
    ItineraryIncomplete,
    ConstraintViolation,
    RouteNotFound,
    RoutingServiceUnavailable,
    RoutingRejected,
    Geocode,
    EmptyRoute,
    Model,
    NarrativeEmpty,
}

impl PlanError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PlanError::InvalidPreferences(_) => ErrorKind::InvalidPreferences,
            PlanError::ItineraryIncomplete { .. } => ErrorKind::ItineraryIncomplete,
            PlanError::ConstraintViolation { .. } => ErrorKind::ConstraintViolation,
            PlanError::RouteNotFound { .. } => ErrorKind::RouteNotFound,
            PlanError::RoutingServiceUnavailable { .. } => ErrorKind::RoutingServiceUnavailable,
            PlanError::RoutingRejected(_) => ErrorKind::RoutingRejected,
            PlanError::Geocode(_) => ErrorKind::Geocode,
            PlanError::EmptyRoute => ErrorKind::EmptyRoute,
            PlanError::Model(_) => ErrorKind::Model,
            PlanError::NarrativeEmpty => ErrorKind::NarrativeEmpty,
        }
    }

    /// Defective model output that earns one retry with a stricter prompt.
    pub fn is_model_defect(&self) -> bool {
        matches!(
            self,
            PlanError::ItineraryIncomplete { .. } | PlanError::ConstraintViolation { .. }
        )
    }

    /// Leg that caused the failure, when one is known.
    pub fn leg_index(&self) -> Option<usize> {
        match self {
            PlanError::RouteNotFound { leg_index, .. } => Some(*leg_index),
            _ => None,
        }
    }

    /// Day that caused the failure, when one is known.
    pub fn day(&self) -> Option<u32> {
        match self {
            PlanError::ConstraintViolation { day, .. } => Some(*day),
            _ => None,
        }
    }
}
