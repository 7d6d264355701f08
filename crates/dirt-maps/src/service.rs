//! Directions service abstraction.

use async_trait::async_trait;
use dirt_core::{Coordinate, Waypoint};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DirectionsError {
    #[error("no bicycle route found: {0}")]
    NoRoute(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("directions service unavailable: {0}")]
    Unavailable(String),

    #[error("directions request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("request rejected ({status}): {message}")]
    Rejected { status: String, message: String },

    #[error("invalid directions response: {0}")]
    InvalidResponse(String),
}

impl DirectionsError {
    /// Worth retrying after a delay.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DirectionsError::RateLimited(_)
                | DirectionsError::Unavailable(_)
                | DirectionsError::Timeout
                | DirectionsError::Network(_)
        )
    }

    pub fn is_no_route(&self) -> bool {
        matches!(self, DirectionsError::NoRoute(_))
    }
}

/// A place to route through: exact coordinate when known, else free text.
#[derive(Debug, Clone, PartialEq)]
pub enum Location {
    Coordinate(Coordinate),
    Address(String),
}

impl Location {
    pub fn to_query(&self) -> String {
        match self {
            Location::Coordinate(coord) => coord.to_string(),
            Location::Address(address) => address.clone(),
        }
    }
}

impl From<&Waypoint> for Location {
    fn from(waypoint: &Waypoint) -> Self {
        match waypoint.coordinate {
            Some(coord) if coord.is_valid() => Location::Coordinate(coord),
            _ => Location::Address(waypoint.name.clone()),
        }
    }
}

/// Ordered locations; the first is the origin and the last the destination.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectionsRequest {
    pub locations: Vec<Location>,
    pub request_id: Option<String>,
}

impl DirectionsRequest {
    pub fn new(locations: Vec<Location>) -> Self {
        Self {
            locations,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }

    /// Number of legs the service should return.
    pub fn leg_count(&self) -> usize {
        self.locations.len().saturating_sub(1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DirectionsLeg {
    pub path: Vec<Coordinate>,
    pub distance_m: f64,
    pub duration_s: f64,
    pub start_location: Coordinate,
    pub end_location: Coordinate,
    pub start_address: String,
    pub end_address: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DirectionsRoute {
    pub legs: Vec<DirectionsLeg>,
    pub summary: String,
    pub warnings: Vec<String>,
}

#[async_trait]
pub trait DirectionsService: Send + Sync {
    /// Bicycle route through all locations in order, one leg per pair.
    async fn directions(
        &self,
        request: &DirectionsRequest,
    ) -> Result<DirectionsRoute, DirectionsError>;

    /// Resolve an address; `Ok(None)` when nothing matches.
    async fn geocode(
        &self,
        address: &str,
        request_id: Option<&str>,
    ) -> Result<Option<Coordinate>, DirectionsError>;
}
