//! Concatenation of routed legs into one continuous route.

use tracing::debug;

use crate::error::PlanError;
use crate::models::{RouteLeg, RouteStop, StitchedRoute, StructuredItinerary, WaypointRole};

/// Join `legs` (in leg order) into a [`StitchedRoute`].
///
/// The first point of a leg is dropped when it repeats the previous leg's
/// last point. Distances are the service-reported leg values, summed. Stops
/// sit exactly on the destination coordinate of the leg that reaches them.
pub fn stitch_legs(
    itinerary: &StructuredItinerary,
    mut legs: Vec<RouteLeg>,
) -> Result<StitchedRoute, PlanError> {
    if legs.is_empty() {
        return Err(PlanError::EmptyRoute);
    }
    legs.sort_by_key(|leg| leg.index);

    let mut path = Vec::with_capacity(legs.iter().map(|leg| leg.path.len()).sum());
    let mut dropped_joints = 0usize;
    for leg in &legs {
        let mut points = leg.path.iter().copied();
        if let (Some(last), Some(first)) = (path.last().copied(), leg.path.first().copied()) {
            if last == first {
                points.next();
                dropped_joints += 1;
            }
        }
        path.extend(points);
    }
    if path.is_empty() {
        return Err(PlanError::EmptyRoute);
    }

    let total_distance_km = legs.iter().map(|leg| leg.distance_km).sum();
    let total_duration_hours = legs.iter().map(|leg| leg.duration_hours).sum();

    let mut stops = Vec::with_capacity(itinerary.days.len() + 1);
    let first = &legs[0];
    if let Some(coordinate) = first.origin.coordinate.or_else(|| first.path.first().copied()) {
        stops.push(RouteStop {
            day: 0,
            name: first.origin.name.clone(),
            role: WaypointRole::Start,
            coordinate,
            distance_km_from_start: 0.0,
        });
    }

    let mut cumulative_km = 0.0;
    for leg in &legs {
        cumulative_km += leg.distance_km;
        if !matches!(leg.destination.role, WaypointRole::Overnight | WaypointRole::End) {
            continue;
        }
        let Some(coordinate) = leg
            .destination
            .coordinate
            .or_else(|| leg.path.last().copied())
        else {
            continue;
        };
        stops.push(RouteStop {
            day: leg.destination.day,
            name: leg.destination.name.clone(),
            role: leg.destination.role,
            coordinate,
            distance_km_from_start: cumulative_km,
        });
    }

    debug!(
        legs = legs.len(),
        points = path.len(),
        dropped_joints,
        total_distance_km,
        "stitched route"
    );

    Ok(StitchedRoute {
        path,
        legs,
        total_distance_km,
        total_duration_hours,
        stops,
    })
}
