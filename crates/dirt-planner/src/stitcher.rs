//! Route stitching: bicycle directions for every leg of an itinerary.

use std::sync::Arc;

use dirt_core::{stitch_legs, PlanError, RouteLeg, StitchedRoute, StructuredItinerary, Waypoint};
use dirt_maps::{
    DirectionsError, DirectionsLeg, DirectionsRequest, DirectionsRoute, DirectionsService, Location,
    MAX_WAYPOINTS,
};
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::config::{PipelineConfig, StitchMode};

/// Locations per batched request: origin, destination and the waypoint limit.
const MAX_LOCATIONS_PER_REQUEST: usize = MAX_WAYPOINTS + 2;

enum FetchError {
    NoRoute(String),
    Fatal(PlanError),
}

impl From<PlanError> for FetchError {
    fn from(err: PlanError) -> Self {
        FetchError::Fatal(err)
    }
}

pub struct RouteStitcher {
    directions: Arc<dyn DirectionsService>,
    config: PipelineConfig,
}

impl RouteStitcher {
    pub fn new(directions: Arc<dyn DirectionsService>, config: PipelineConfig) -> Self {
        Self { directions, config }
    }

    /// Route every leg in order and join them.
    ///
    /// On success the itinerary's waypoint coordinates are replaced by the
    /// routed leg endpoints.
    pub async fn stitch(
        &self,
        itinerary: &mut StructuredItinerary,
        request_id: Option<&str>,
    ) -> Result<StitchedRoute, PlanError> {
        let waypoints = &itinerary.waypoints;
        if waypoints.len() < 2 {
            return Err(PlanError::EmptyRoute);
        }
        let leg_count = waypoints.len() - 1;
        info!(legs = leg_count, mode = ?self.config.stitch_mode, "routing itinerary");

        let legs = match self.config.stitch_mode {
            StitchMode::Batched => self.route_batched(waypoints, request_id).await?,
            StitchMode::PerLeg => self.route_per_leg(waypoints, request_id).await?,
        };

        let route = stitch_legs(itinerary, legs)?;
        itinerary.refine_coordinates(&route.legs);
        info!(
            total_distance_km = route.total_distance_km,
            total_duration_hours = route.total_duration_hours,
            points = route.path.len(),
            "route stitched"
        );
        Ok(route)
    }

    async fn route_batched(
        &self,
        waypoints: &[Waypoint],
        request_id: Option<&str>,
    ) -> Result<Vec<RouteLeg>, PlanError> {
        let leg_count = waypoints.len() - 1;
        let mut legs = Vec::with_capacity(leg_count);
        let mut first = 0usize;

        while first < leg_count {
            let last = (first + MAX_LOCATIONS_PER_REQUEST - 1).min(leg_count);
            let locations = waypoints[first..=last].iter().map(Location::from).collect();
            let request = DirectionsRequest::new(locations)
                .with_request_id(request_id.map(str::to_string));
            debug!(first_leg = first, last_leg = last - 1, "requesting batched directions");

            match self.fetch(&request).await {
                Ok(route) => {
                    if route.legs.len() != last - first {
                        return Err(PlanError::RoutingRejected(format!(
                            "expected {} legs, service returned {}",
                            last - first,
                            route.legs.len()
                        )));
                    }
                    for (offset, leg) in route.legs.into_iter().enumerate() {
                        legs.push(to_route_leg(first + offset, waypoints, leg));
                    }
                }
                Err(FetchError::NoRoute(status)) => {
                    warn!(status = %status, "batched request found no route, locating failing leg");
                    for index in first..last {
                        legs.push(self.route_leg(waypoints, index, request_id).await?);
                    }
                }
                Err(FetchError::Fatal(err)) => return Err(err),
            }
            first = last;
        }
        Ok(legs)
    }

    async fn route_per_leg(
        &self,
        waypoints: &[Waypoint],
        request_id: Option<&str>,
    ) -> Result<Vec<RouteLeg>, PlanError> {
        let concurrency = self.config.leg_concurrency.max(1);
        stream::iter(0..waypoints.len() - 1)
            .map(|index| self.route_leg(waypoints, index, request_id))
            .buffered(concurrency)
            .try_collect()
            .await
    }

    async fn route_leg(
        &self,
        waypoints: &[Waypoint],
        index: usize,
        request_id: Option<&str>,
    ) -> Result<RouteLeg, PlanError> {
        let (from, to) = (&waypoints[index], &waypoints[index + 1]);
        let request = DirectionsRequest::new(vec![Location::from(from), Location::from(to)])
            .with_request_id(request_id.map(str::to_string));

        match self.fetch(&request).await {
            Ok(route) => match route.legs.into_iter().next() {
                Some(leg) => Ok(to_route_leg(index, waypoints, leg)),
                None => Err(PlanError::RoutingRejected(format!(
                    "service returned no legs for leg {}",
                    index
                ))),
            },
            Err(FetchError::NoRoute(status)) => {
                warn!(leg_index = index, from = %from.name, to = %to.name, status = %status, "no bicycle route for leg");
                Err(PlanError::RouteNotFound {
                    leg_index: index,
                    from: from.name.clone(),
                    to: to.name.clone(),
                })
            }
            Err(FetchError::Fatal(err)) => Err(err),
        }
    }

    /// One directions call with bounded retries on transient failures.
    async fn fetch(&self, request: &DirectionsRequest) -> Result<DirectionsRoute, FetchError> {
        let max_attempts = self.config.directions_max_retries + 1;
        let mut backoff = Backoff::new(self.config.backoff_base, self.config.backoff_max);

        loop {
            let err = match self.directions.directions(request).await {
                Ok(route) => return Ok(route),
                Err(err) => err,
            };

            match err {
                DirectionsError::NoRoute(status) => return Err(FetchError::NoRoute(status)),
                err if err.is_transient() => {
                    if backoff.attempts() + 1 >= max_attempts {
                        warn!(attempts = max_attempts, error = %err, "directions retries exhausted");
                        return Err(PlanError::RoutingServiceUnavailable {
                            attempts: max_attempts,
                            message: err.to_string(),
                        }
                        .into());
                    }
                    let delay = backoff.fail();
                    warn!(
                        attempt = backoff.attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient directions error, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                err => return Err(PlanError::RoutingRejected(err.to_string()).into()),
            }
        }
    }
}

fn to_route_leg(index: usize, waypoints: &[Waypoint], leg: DirectionsLeg) -> RouteLeg {
    let mut origin = waypoints[index].clone();
    origin.coordinate = Some(leg.start_location);
    let mut destination = waypoints[index + 1].clone();
    destination.coordinate = Some(leg.end_location);

    RouteLeg {
        index,
        origin,
        destination,
        path: leg.path,
        distance_km: leg.distance_m / 1000.0,
        duration_hours: leg.duration_s / 3600.0,
    }
}
