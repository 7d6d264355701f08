//! Bicycle directions for DirtGenie.
//!
//! Wraps the Google Maps Directions and Geocoding APIs behind the
//! [`DirectionsService`] trait so the planner can be tested without a network.

pub mod client;
pub mod service;

pub use client::{GoogleMapsClient, DEFAULT_BASE_URL, MAX_WAYPOINTS};
pub use service::{
    DirectionsError, DirectionsLeg, DirectionsRequest, DirectionsRoute, DirectionsService,
    Location,
};
