//! Test doubles and fixtures for the pipeline.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dirt_core::{haversine_km, Coordinate};
use dirt_maps::{
    DirectionsError, DirectionsLeg, DirectionsRequest, DirectionsRoute, DirectionsService, Location,
};
use tracing::debug;

use crate::config::{PipelineConfig, StitchMode};
use crate::llm::client::mock::MockLlmClient;
use crate::pipeline::{PlanningContext, TourPipeline};

/// Routed endpoints land a little off the requested coordinate, like a
/// real service snapping to the road network.
const SNAP_OFFSET: f64 = 0.00012;

/// Scripted directions service.
///
/// Addresses resolve through a fixed table; coordinates are used as is.
/// Every leg is a three-point path with a road distance of 1.3x the
/// straight line.
#[derive(Default)]
pub struct MockDirections {
    places: HashMap<String, Coordinate>,
    unreachable: Vec<Coordinate>,
    transient_failures: AtomicUsize,
    transient_geocode_failures: AtomicUsize,
    requests: Mutex<Vec<DirectionsRequest>>,
    geocodes: AtomicUsize,
}

impl MockDirections {
    pub fn new() -> Self {
        Self::default()
            .with_place("Portland, OR", Coordinate::new(45.5152, -122.6784))
            .with_place("Bend, OR", Coordinate::new(44.0582, -121.3153))
            .with_place("Boulder, CO", Coordinate::new(40.015, -105.2705))
    }

    pub fn with_place(mut self, name: &str, coordinate: Coordinate) -> Self {
        self.places.insert(name.to_lowercase(), coordinate);
        self
    }

    /// Any leg ending at `coordinate` has no bicycle route.
    pub fn with_unreachable(mut self, coordinate: Coordinate) -> Self {
        self.unreachable.push(coordinate);
        self
    }

    /// Fail the next `count` directions calls with a transient error.
    pub fn with_transient_failures(self, count: usize) -> Self {
        self.transient_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Fail the next `count` geocode calls with a transient error.
    pub fn with_transient_geocode_failures(self, count: usize) -> Self {
        self.transient_geocode_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn requests(&self) -> Vec<DirectionsRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn directions_calls(&self) -> usize {
        self.requests().len()
    }

    pub fn geocode_calls(&self) -> usize {
        self.geocodes.load(Ordering::SeqCst)
    }

    fn resolve(&self, location: &Location) -> Option<Coordinate> {
        match location {
            Location::Coordinate(coordinate) => Some(*coordinate),
            Location::Address(address) => self.places.get(&address.to_lowercase()).copied(),
        }
    }

    fn is_unreachable(&self, coordinate: Coordinate) -> bool {
        self.unreachable.iter().any(|blocked| {
            (blocked.lat - coordinate.lat).abs() < 1e-9 && (blocked.lon - coordinate.lon).abs() < 1e-9
        })
    }
}

pub fn snapped(coordinate: Coordinate) -> Coordinate {
    Coordinate::new(coordinate.lat + SNAP_OFFSET, coordinate.lon - SNAP_OFFSET)
}

fn leg_between(from: Coordinate, to: Coordinate) -> DirectionsLeg {
    let start = snapped(from);
    let end = snapped(to);
    let mid = Coordinate::new((start.lat + end.lat) / 2.0 + 0.01, (start.lon + end.lon) / 2.0);
    let distance_m = haversine_km(from, to) * 1300.0;
    DirectionsLeg {
        path: vec![start, mid, end],
        distance_m,
        // About 16 km/h loaded touring pace.
        duration_s: distance_m / 4.5,
        start_location: start,
        end_location: end,
        start_address: String::new(),
        end_address: String::new(),
    }
}

#[async_trait]
impl DirectionsService for MockDirections {
    async fn directions(
        &self,
        request: &DirectionsRequest,
    ) -> Result<DirectionsRoute, DirectionsError> {
        debug!(locations = request.locations.len(), "MockDirections::directions: called");
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request.clone());
        }

        let pending = self.transient_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.transient_failures.store(pending - 1, Ordering::SeqCst);
            return Err(DirectionsError::Unavailable("UNKNOWN_ERROR".into()));
        }

        let mut coordinates = Vec::with_capacity(request.locations.len());
        for location in &request.locations {
            match self.resolve(location) {
                Some(coordinate) => coordinates.push(coordinate),
                None => return Err(DirectionsError::NoRoute("NOT_FOUND".into())),
            }
        }

        let mut legs = Vec::with_capacity(coordinates.len().saturating_sub(1));
        for pair in coordinates.windows(2) {
            if self.is_unreachable(pair[1]) {
                return Err(DirectionsError::NoRoute("ZERO_RESULTS".into()));
            }
            legs.push(leg_between(pair[0], pair[1]));
        }

        Ok(DirectionsRoute {
            legs,
            summary: "mock".into(),
            warnings: Vec::new(),
        })
    }

    async fn geocode(
        &self,
        address: &str,
        _request_id: Option<&str>,
    ) -> Result<Option<Coordinate>, DirectionsError> {
        self.geocodes.fetch_add(1, Ordering::SeqCst);
        let pending = self.transient_geocode_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.transient_geocode_failures.store(pending - 1, Ordering::SeqCst);
            return Err(DirectionsError::RateLimited("OVER_QUERY_LIMIT".into()));
        }
        Ok(self.places.get(&address.to_lowercase()).copied())
    }
}

/// Fast retries so tests do not wait on real backoff.
pub fn test_config(mode: StitchMode) -> PipelineConfig {
    PipelineConfig {
        backoff_base: Duration::from_millis(5),
        backoff_max: Duration::from_millis(20),
        directions_max_retries: 3,
        stitch_mode: mode,
        leg_concurrency: 3,
        ..PipelineConfig::default()
    }
}

pub fn pipeline(
    llm: &Arc<MockLlmClient>,
    directions: &Arc<MockDirections>,
    mode: StitchMode,
) -> TourPipeline {
    TourPipeline::new(PlanningContext::new(
        llm.clone(),
        directions.clone(),
        test_config(mode),
    ))
}

// ========== FIXTURES ==========

pub const HOOD_RIVER: Coordinate = Coordinate { lat: 45.7054, lon: -121.5215 };
pub const MAUPIN: Coordinate = Coordinate { lat: 45.1754, lon: -121.0806 };
pub const BEND: Coordinate = Coordinate { lat: 44.0582, lon: -121.3153 };
pub const BOULDER: Coordinate = Coordinate { lat: 40.015, lon: -105.2705 };
pub const LYONS: Coordinate = Coordinate { lat: 40.2247, lon: -105.2714 };
pub const NEDERLAND: Coordinate = Coordinate { lat: 39.9614, lon: -105.5108 };
pub const ESTES_PARK: Coordinate = Coordinate { lat: 40.3772, lon: -105.5217 };

/// Portland to Bend over two nights.
pub const PORTLAND_BEND_REPLY: &str = r#"```json
{
  "days": [
    {"day": 1, "start_location": "Portland, OR", "end_location": "Hood River, OR",
     "latitude": 45.7054, "longitude": -121.5215,
     "overnight_location": "Tucker Park Campground",
     "highlights": ["Historic Columbia River Highway", "Multnomah Falls"],
     "estimated_distance_km": 105},
    {"day": 2, "start_location": "Hood River, OR", "end_location": "Maupin, OR",
     "latitude": 45.1754, "longitude": -121.0806,
     "overnight_location": "Maupin City Park",
     "highlights": ["Deschutes River canyon"],
     "estimated_distance_km": 95},
    {"day": 3, "start_location": "Maupin, OR", "end_location": "Bend, OR",
     "latitude": 44.0582, "longitude": -121.3153,
     "highlights": ["Smith Rock"],
     "estimated_distance_km": 150}
  ],
  "total_distance_km": 350,
  "route_summary": "Gorge, canyon and high desert"
}
```"#;

/// Boulder loop over two nights, every overnight inside the loop radius.
pub const BOULDER_LOOP_REPLY: &str = r#"{
  "days": [
    {"day": 1, "end_location": "Lyons, CO", "latitude": 40.2247, "longitude": -105.2714,
     "overnight_location": "Meadow Park", "estimated_distance_km": 40,
     "distance_from_start_km": 23, "days_remaining_to_return": 2},
    {"day": 2, "end_location": "Nederland, CO", "latitude": 39.9614, "longitude": -105.5108,
     "overnight_location": "Kelly Dahl Campground", "estimated_distance_km": 45,
     "distance_from_start_km": 21, "days_remaining_to_return": 1},
    {"day": 3, "end_location": "Boulder, CO", "estimated_distance_km": 30}
  ]
}"#;

/// Same loop but the first night is at Estes Park, beyond the radius.
pub const BOULDER_LOOP_TOO_FAR_REPLY: &str = r#"{
  "days": [
    {"day": 1, "end_location": "Estes Park, CO", "latitude": 40.3772, "longitude": -105.5217,
     "estimated_distance_km": 65, "distance_from_start_km": 20},
    {"day": 2, "end_location": "Nederland, CO", "latitude": 39.9614, "longitude": -105.5108,
     "estimated_distance_km": 50},
    {"day": 3, "end_location": "Boulder, CO", "estimated_distance_km": 30}
  ]
}"#;

pub const NARRATIVE_REPLY: &str = "```markdown\n# Portland to Bend\n\n## Day 1\nRide the gorge.\n```";

/// `days` overnights on a straight line heading north from Portland.
pub fn long_tour_reply(days: u32) -> String {
    let entries: Vec<String> = (1..=days)
        .map(|day| {
            format!(
                r#"{{"day": {day}, "end_location": "Stop {day}", "latitude": {lat:.4}, "longitude": -122.6784, "estimated_distance_km": 40}}"#,
                day = day,
                lat = 45.5152 + 0.3 * day as f64
            )
        })
        .collect();
    format!(r#"{{"days": [{}]}}"#, entries.join(",\n"))
}
