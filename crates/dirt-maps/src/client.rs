//! Google Maps Directions and Geocoding client.

use std::time::Duration;

use async_trait::async_trait;
use dirt_core::{polyline, Coordinate};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::service::{
    DirectionsError, DirectionsLeg, DirectionsRequest, DirectionsRoute, DirectionsService,
};

pub const DEFAULT_BASE_URL: &str = "https://maps.googleapis.com";

/// Waypoints allowed between origin and destination in one request.
pub const MAX_WAYPOINTS: usize = 25;

/// HTTP client for the Google Maps web services. One instance per API key.
pub struct GoogleMapsClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl GoogleMapsClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DirectionsError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| DirectionsError::Network(format!("failed to create HTTP client: {err}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn apply_request_id(
        &self,
        request: reqwest::RequestBuilder,
        request_id: Option<&str>,
    ) -> reqwest::RequestBuilder {
        match request_id {
            Some(value) if !value.is_empty() => request.header("X-Request-ID", value),
            _ => request,
        }
    }

    async fn get_json(
        &self,
        path: &str,
        query: &[(&str, String)],
        request_id: Option<&str>,
    ) -> Result<String, DirectionsError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .apply_request_id(
                self.client
                    .get(&url)
                    .query(query)
                    .query(&[("key", self.api_key.as_str())]),
                request_id,
            )
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        let body = response.text().await.map_err(map_reqwest_error)?;

        if status.as_u16() == 429 {
            return Err(DirectionsError::RateLimited(format!("HTTP {}", status)));
        }
        if status.is_server_error() {
            return Err(DirectionsError::Unavailable(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(DirectionsError::Rejected {
                status: status.as_u16().to_string(),
                message: body,
            });
        }
        Ok(body)
    }
}

fn map_reqwest_error(err: reqwest::Error) -> DirectionsError {
    if err.is_timeout() {
        DirectionsError::Timeout
    } else {
        DirectionsError::Network(err.to_string())
    }
}

/// Query parameters for an ordered bicycle route through `request`.
pub fn directions_query(request: &DirectionsRequest) -> Result<Vec<(&'static str, String)>, DirectionsError> {
    let (Some(origin), Some(destination)) = (request.locations.first(), request.locations.last())
    else {
        return Err(invalid_request("no locations"));
    };
    if request.locations.len() < 2 {
        return Err(invalid_request("need an origin and a destination"));
    }
    let via = &request.locations[1..request.locations.len() - 1];
    if via.len() > MAX_WAYPOINTS {
        return Err(invalid_request(&format!(
            "{} waypoints exceeds the limit of {}",
            via.len(),
            MAX_WAYPOINTS
        )));
    }

    let mut query = vec![
        ("origin", origin.to_query()),
        ("destination", destination.to_query()),
        ("mode", "bicycling".to_string()),
        ("units", "metric".to_string()),
    ];
    if !via.is_empty() {
        let mut waypoints = vec!["optimize:false".to_string()];
        waypoints.extend(via.iter().map(|location| location.to_query()));
        query.push(("waypoints", waypoints.join("|")));
    }
    Ok(query)
}

fn invalid_request(message: &str) -> DirectionsError {
    DirectionsError::Rejected {
        status: "INVALID_REQUEST".to_string(),
        message: message.to_string(),
    }
}

// ========== RESPONSE PARSING ==========

#[derive(Debug, Deserialize)]
struct ApiDirections {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    routes: Vec<ApiRoute>,
}

#[derive(Debug, Deserialize)]
struct ApiRoute {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    warnings: Vec<String>,
    legs: Vec<ApiLeg>,
}

#[derive(Debug, Deserialize)]
struct ApiLeg {
    distance: ApiValue,
    duration: ApiValue,
    start_location: ApiLatLng,
    end_location: ApiLatLng,
    #[serde(default)]
    start_address: String,
    #[serde(default)]
    end_address: String,
    #[serde(default)]
    steps: Vec<ApiStep>,
}

#[derive(Debug, Deserialize)]
struct ApiValue {
    value: f64,
}

#[derive(Debug, Deserialize)]
struct ApiLatLng {
    lat: f64,
    lng: f64,
}

impl From<&ApiLatLng> for Coordinate {
    fn from(value: &ApiLatLng) -> Self {
        Coordinate::new(value.lat, value.lng)
    }
}

#[derive(Debug, Deserialize)]
struct ApiStep {
    polyline: ApiPolyline,
}

#[derive(Debug, Deserialize)]
struct ApiPolyline {
    points: String,
}

#[derive(Debug, Deserialize)]
struct ApiGeocode {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    results: Vec<ApiGeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct ApiGeocodeResult {
    geometry: ApiGeometry,
}

#[derive(Debug, Deserialize)]
struct ApiGeometry {
    location: ApiLatLng,
}

/// Map a Google status string to an error; `OK` passes.
fn check_status(status: &str, message: Option<String>) -> Result<(), DirectionsError> {
    let message = message.unwrap_or_else(|| status.to_string());
    match status {
        "OK" => Ok(()),
        "ZERO_RESULTS" | "NOT_FOUND" => Err(DirectionsError::NoRoute(message)),
        "OVER_QUERY_LIMIT" => Err(DirectionsError::RateLimited(message)),
        "UNKNOWN_ERROR" => Err(DirectionsError::Unavailable(message)),
        other => Err(DirectionsError::Rejected {
            status: other.to_string(),
            message,
        }),
    }
}

/// Parse a Directions API body into legs with decoded paths.
pub fn parse_directions(body: &str) -> Result<DirectionsRoute, DirectionsError> {
    let payload: ApiDirections = serde_json::from_str(body)
        .map_err(|err| DirectionsError::InvalidResponse(err.to_string()))?;
    check_status(&payload.status, payload.error_message)?;

    let route = payload
        .routes
        .into_iter()
        .next()
        .ok_or_else(|| DirectionsError::NoRoute("status OK but no routes".to_string()))?;

    let legs = route
        .legs
        .iter()
        .map(parse_leg)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(DirectionsRoute {
        legs,
        summary: route.summary,
        warnings: route.warnings,
    })
}

fn parse_leg(leg: &ApiLeg) -> Result<DirectionsLeg, DirectionsError> {
    let start_location = Coordinate::from(&leg.start_location);
    let end_location = Coordinate::from(&leg.end_location);

    let mut path: Vec<Coordinate> = Vec::new();
    for step in &leg.steps {
        let points = polyline::decode(&step.polyline.points)
            .map_err(|err| DirectionsError::InvalidResponse(err.to_string()))?;
        let skip = match (path.last(), points.first()) {
            (Some(last), Some(first)) if last == first => 1,
            _ => 0,
        };
        path.extend(points.into_iter().skip(skip));
    }
    if path.is_empty() {
        path = vec![start_location, end_location];
    }

    Ok(DirectionsLeg {
        path,
        distance_m: leg.distance.value,
        duration_s: leg.duration.value,
        start_location,
        end_location,
        start_address: leg.start_address.clone(),
        end_address: leg.end_address.clone(),
    })
}

/// Parse a Geocoding API body; `ZERO_RESULTS` is `Ok(None)`.
pub fn parse_geocode(body: &str) -> Result<Option<Coordinate>, DirectionsError> {
    let payload: ApiGeocode = serde_json::from_str(body)
        .map_err(|err| DirectionsError::InvalidResponse(err.to_string()))?;
    if payload.status == "ZERO_RESULTS" {
        return Ok(None);
    }
    check_status(&payload.status, payload.error_message)?;
    Ok(payload
        .results
        .first()
        .map(|result| Coordinate::from(&result.geometry.location)))
}

#[async_trait]
impl DirectionsService for GoogleMapsClient {
    async fn directions(
        &self,
        request: &DirectionsRequest,
    ) -> Result<DirectionsRoute, DirectionsError> {
        let query = directions_query(request)?;
        debug!(locations = request.locations.len(), "requesting bicycle directions");

        let body = self
            .get_json("/maps/api/directions/json", &query, request.request_id.as_deref())
            .await?;
        let route = parse_directions(&body)?;

        if route.legs.len() != request.leg_count() {
            return Err(DirectionsError::InvalidResponse(format!(
                "expected {} legs, got {}",
                request.leg_count(),
                route.legs.len()
            )));
        }
        for warning in &route.warnings {
            warn!(warning = %warning, "directions warning");
        }
        Ok(route)
    }

    async fn geocode(
        &self,
        address: &str,
        request_id: Option<&str>,
    ) -> Result<Option<Coordinate>, DirectionsError> {
        debug!(address, "geocoding");
        let body = self
            .get_json(
                "/maps/api/geocode/json",
                &[("address", address.to_string())],
                request_id,
            )
            .await?;
        parse_geocode(&body)
    }
}
