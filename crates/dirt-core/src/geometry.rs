//! GeoJSON output for a stitched route.

use serde::{Deserialize, Serialize};

use crate::error::PlanError;
use crate::models::{RouteStop, StitchedRoute, StructuredItinerary, WaypointRole};

const ROUTE_STROKE: &str = "#0066cc";
const ROUTE_STROKE_WIDTH: u32 = 4;
const ROUTE_STROKE_OPACITY: f64 = 0.8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryDocument {
    #[serde(rename = "type")]
    pub kind: String,
    pub features: Vec<Feature>,
    pub properties: DocumentProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentProperties {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: String,
    pub geometry: Geometry,
    pub properties: FeatureProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    LineString { coordinates: Vec<[f64; 2]> },
    Point { coordinates: [f64; 2] },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureProperties {
    Route(RouteProperties),
    Stop(StopProperties),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteProperties {
    /// Always `"route"`.
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub distance_km: f64,
    pub duration_hours: f64,
    pub leg_count: usize,
    pub stroke: String,
    #[serde(rename = "stroke-width")]
    pub stroke_width: u32,
    #[serde(rename = "stroke-opacity")]
    pub stroke_opacity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopKind {
    Start,
    OvernightAccommodation,
    End,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopProperties {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: StopKind,
    pub day: u32,
    pub distance_km_from_start: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accommodation: Option<String>,
    #[serde(rename = "marker-color")]
    pub marker_color: String,
    #[serde(rename = "marker-symbol")]
    pub marker_symbol: String,
}

impl StopKind {
    fn marker_color(&self) -> &'static str {
        match self {
            StopKind::Start => "#2e7d32",
            StopKind::OvernightAccommodation => "#ff6600",
            StopKind::End => "#c62828",
        }
    }
}

/// Build the feature collection: the route line first, then one point per stop.
pub fn build(
    route: &StitchedRoute,
    itinerary: &StructuredItinerary,
) -> Result<GeometryDocument, PlanError> {
    if route.path.is_empty() || route.legs.is_empty() || route.stops.is_empty() {
        return Err(PlanError::EmptyRoute);
    }

    let start_name = route
        .stops
        .first()
        .map(|stop| stop.name.as_str())
        .unwrap_or_default();
    let end_name = route
        .stops
        .last()
        .map(|stop| stop.name.as_str())
        .unwrap_or_default();
    let trip_name = format!("{} to {}", start_name, end_name);

    let mut features = Vec::with_capacity(route.stops.len() + 1);
    features.push(Feature {
        kind: "Feature".to_string(),
        geometry: Geometry::LineString {
            coordinates: route.path.iter().map(|c| c.to_lon_lat()).collect(),
        },
        properties: FeatureProperties::Route(RouteProperties {
            kind: "route".to_string(),
            name: format!("Route from {}", trip_name),
            distance_km: route.total_distance_km,
            duration_hours: route.total_duration_hours,
            leg_count: route.legs.len(),
            stroke: ROUTE_STROKE.to_string(),
            stroke_width: ROUTE_STROKE_WIDTH,
            stroke_opacity: ROUTE_STROKE_OPACITY,
        }),
    });
    features.extend(route.stops.iter().map(|stop| stop_feature(stop, itinerary)));

    Ok(GeometryDocument {
        kind: "FeatureCollection".to_string(),
        features,
        properties: DocumentProperties {
            name: format!("Bikepacking Trip: {}", trip_name),
            description: itinerary
                .summary
                .clone()
                .unwrap_or_else(|| format!("{} days, {:.1} km", itinerary.days.len(), route.total_distance_km)),
        },
    })
}

fn stop_feature(stop: &RouteStop, itinerary: &StructuredItinerary) -> Feature {
    let kind = match stop.role {
        WaypointRole::Start => StopKind::Start,
        WaypointRole::End => StopKind::End,
        _ => StopKind::OvernightAccommodation,
    };
    let accommodation = itinerary
        .day(stop.day)
        .and_then(|plan| plan.accommodation.clone())
        .filter(|_| kind == StopKind::OvernightAccommodation);
    let marker_symbol = match kind {
        StopKind::Start => "bicycle".to_string(),
        StopKind::End => "embassy".to_string(),
        StopKind::OvernightAccommodation => stop.day.to_string(),
    };

    Feature {
        kind: "Feature".to_string(),
        geometry: Geometry::Point {
            coordinates: stop.coordinate.to_lon_lat(),
        },
        properties: FeatureProperties::Stop(StopProperties {
            name: stop.name.clone(),
            kind,
            day: stop.day,
            distance_km_from_start: stop.distance_km_from_start,
            accommodation,
            marker_color: kind.marker_color().to_string(),
            marker_symbol,
        }),
    }
}

impl GeometryDocument {
    pub fn line_count(&self) -> usize {
        self.features
            .iter()
            .filter(|f| matches!(f.geometry, Geometry::LineString { .. }))
            .count()
    }

    pub fn point_count(&self) -> usize {
        self.features
            .iter()
            .filter(|f| matches!(f.geometry, Geometry::Point { .. }))
            .count()
    }

    pub fn stops(&self) -> impl Iterator<Item = (&StopProperties, [f64; 2])> {
        self.features.iter().filter_map(|f| match (&f.properties, &f.geometry) {
            (FeatureProperties::Stop(props), Geometry::Point { coordinates }) => {
                Some((props, *coordinates))
            }
            _ => None,
        })
    }
}
