//! Core data models for the tour planning pipeline.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::PlanError;

/// Kilometres per statute mile.
pub const KM_PER_MILE: f64 = 1.609_344;

/// Tire profile used when the rider does not name one.
pub const DEFAULT_TIRE_PROFILE: &str = "700x35c (Gravel - Standard)";

/// A WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    /// GeoJSON position order: `[lon, lat]`.
    pub fn to_lon_lat(&self) -> [f64; 2] {
        [self.lon, self.lat]
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{:.6}", self.lat, self.lon)
    }
}

// ========== PREFERENCES ==========

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccommodationStyle {
    Camping,
    Hotels,
    #[default]
    Mixed,
}

impl AccommodationStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Camping => "camping",
            Self::Hotels => "hotels",
            Self::Mixed => "mixed",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitnessLevel {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
}

impl FitnessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }

    /// Daily distance band suggested for riders who do not state one.
    pub fn default_daily_distance(&self) -> DailyDistance {
        match self {
            Self::Beginner => DailyDistance { min_km: 30.0, max_km: 50.0 },
            Self::Intermediate => DailyDistance { min_km: 50.0, max_km: 80.0 },
            Self::Advanced => DailyDistance { min_km: 80.0, max_km: 120.0 },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerrainPreference {
    Paved,
    Gravel,
    #[default]
    Mixed,
    Challenging,
}

impl TerrainPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paved => "paved",
            Self::Gravel => "gravel",
            Self::Mixed => "mixed",
            Self::Challenging => "challenging",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetTier {
    Budget,
    #[default]
    Moderate,
    Luxury,
}

impl BudgetTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Budget => "budget",
            Self::Moderate => "moderate",
            Self::Luxury => "luxury",
        }
    }
}

macro_rules! display_as_str {
    ($($ty:ty),+) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })+
    };
}

display_as_str!(AccommodationStyle, FitnessLevel, TerrainPreference, BudgetTier);

/// Daily riding distance band in kilometres.
///
/// Accepts `"50-80"`, `"50-80 km"`, `"60"`, a bare number, or an explicit
/// `{min_km, max_km}` object when deserialized. Serializes as `"50-80"`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DailyDistanceRepr", into = "String")]
pub struct DailyDistance {
    pub min_km: f64,
    pub max_km: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DailyDistanceRepr {
    Band { min_km: f64, max_km: f64 },
    Single(f64),
    Text(String),
}

impl TryFrom<DailyDistanceRepr> for DailyDistance {
    type Error = PlanError;

    fn try_from(value: DailyDistanceRepr) -> Result<Self, Self::Error> {
        match value {
            DailyDistanceRepr::Band { min_km, max_km } => DailyDistance::new(min_km, max_km),
            DailyDistanceRepr::Single(km) => DailyDistance::new(km, km),
            DailyDistanceRepr::Text(text) => DailyDistance::parse(&text),
        }
    }
}

impl From<DailyDistance> for String {
    fn from(value: DailyDistance) -> Self {
        value.to_string()
    }
}

impl DailyDistance {
    pub fn new(min_km: f64, max_km: f64) -> Result<Self, PlanError> {
        let band = Self { min_km, max_km };
        band.validate()?;
        Ok(band)
    }

    /// Parse a band written the way riders write it in profiles.
    pub fn parse(text: &str) -> Result<Self, PlanError> {
        let cleaned = text.trim().to_lowercase();
        let cleaned = cleaned
            .trim_end_matches("per day")
            .trim()
            .trim_end_matches("km")
            .trim();
        if cleaned.is_empty() {
            return Err(PlanError::InvalidPreferences(
                "daily distance is empty".to_string(),
            ));
        }

        let parse_part = |part: &str| {
            part.trim().parse::<f64>().map_err(|_| {
                PlanError::InvalidPreferences(format!("cannot read daily distance '{}'", text))
            })
        };

        match cleaned.split_once('-') {
            Some((min, max)) => Self::new(parse_part(min)?, parse_part(max)?),
            None => {
                let km = parse_part(cleaned)?;
                Self::new(km, km)
            }
        }
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        if !self.min_km.is_finite() || !self.max_km.is_finite() {
            return Err(PlanError::InvalidPreferences(
                "daily distance must be finite".to_string(),
            ));
        }
        if self.min_km <= 0.0 || self.max_km <= 0.0 {
            return Err(PlanError::InvalidPreferences(
                "daily distance must be positive".to_string(),
            ));
        }
        if self.min_km > self.max_km {
            return Err(PlanError::InvalidPreferences(format!(
                "daily distance minimum {} exceeds maximum {}",
                self.min_km, self.max_km
            )));
        }
        Ok(())
    }

    pub fn average_km(&self) -> f64 {
        (self.min_km + self.max_km) / 2.0
    }
}

impl fmt::Display for DailyDistance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn km(value: f64) -> String {
            if value.fract() == 0.0 {
                format!("{}", value as i64)
            } else {
                format!("{:.1}", value)
            }
        }
        write!(f, "{}-{}", km(self.min_km), km(self.max_km))
    }
}

impl Default for DailyDistance {
    fn default() -> Self {
        FitnessLevel::default().default_daily_distance()
    }
}

fn default_tire_profile() -> String {
    DEFAULT_TIRE_PROFILE.to_string()
}

/// Normalized rider inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripPreferences {
    #[serde(default)]
    pub accommodation: AccommodationStyle,
    #[serde(default)]
    pub stealth_camping: bool,
    #[serde(default)]
    pub fitness_level: FitnessLevel,
    #[serde(default)]
    pub terrain: TerrainPreference,
    #[serde(default)]
    pub daily_distance: DailyDistance,
    #[serde(default)]
    pub budget: BudgetTier,
    /// Free text such as `700x35c` or `29" x 2.25in`.
    #[serde(default = "default_tire_profile", alias = "tire_size")]
    pub tire_profile: String,
    /// Ordered desire tags, duplicates removed.
    #[serde(default, alias = "interests")]
    pub desires: Vec<String>,
    #[serde(default)]
    pub departure_date: Option<NaiveDate>,
}

impl Default for TripPreferences {
    fn default() -> Self {
        Self {
            accommodation: AccommodationStyle::default(),
            stealth_camping: false,
            fitness_level: FitnessLevel::default(),
            terrain: TerrainPreference::default(),
            daily_distance: DailyDistance::default(),
            budget: BudgetTier::default(),
            tire_profile: default_tire_profile(),
            desires: Vec::new(),
            departure_date: None,
        }
    }
}

impl TripPreferences {
    /// Validate and normalize: trims desire tags and drops duplicates while
    /// keeping first-seen order.
    pub fn normalized(mut self) -> Result<Self, PlanError> {
        self.daily_distance.validate()?;

        let mut seen: Vec<String> = Vec::with_capacity(self.desires.len());
        for tag in self.desires.drain(..) {
            let tag = tag.trim().to_string();
            if tag.is_empty() {
                continue;
            }
            if !seen.iter().any(|existing| existing.eq_ignore_ascii_case(&tag)) {
                seen.push(tag);
            }
        }
        self.desires = seen;

        if self.tire_profile.trim().is_empty() {
            self.tire_profile = default_tire_profile();
        }
        // Stealth camping only applies when the rider camps at all.
        if self.accommodation == AccommodationStyle::Hotels {
            self.stealth_camping = false;
        }
        Ok(self)
    }

    pub fn desires_text(&self) -> String {
        if self.desires.is_empty() {
            "none stated".to_string()
        } else {
            self.desires.join(", ")
        }
    }
}

/// A single trip-planning call. Built once and passed by value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TourRequest {
    pub start: String,
    pub end: String,
    pub nights: u32,
    pub preferences: TripPreferences,
}

impl TourRequest {
    pub fn new(
        start: impl Into<String>,
        end: impl Into<String>,
        nights: u32,
        preferences: TripPreferences,
    ) -> Result<Self, PlanError> {
        let request = Self {
            start: start.into().trim().to_string(),
            end: end.into().trim().to_string(),
            nights,
            preferences: preferences.normalized()?,
        };
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        if self.start.trim().is_empty() || self.end.trim().is_empty() {
            return Err(PlanError::InvalidPreferences(
                "start and end locations are required".to_string(),
            ));
        }
        if self.nights == 0 {
            return Err(PlanError::InvalidPreferences(
                "a tour needs at least one night".to_string(),
            ));
        }
        self.preferences.daily_distance.validate()
    }

    /// Riding days: one per night plus the final day to the end location.
    pub fn days(&self) -> u32 {
        self.nights + 1
    }

    /// True when start and end name the same place. Case, spaces and commas
    /// are ignored and either name containing the other also counts, so
    /// "Boulder, CO" and "boulder" form a loop.
    ///
    /// Containment is deliberately loose: "York" and "New York, NY" also
    /// count as a loop. Pass full "City, ST" names to avoid that.
    pub fn is_closed_loop(&self) -> bool {
        let start = squash_location(&self.start);
        let end = squash_location(&self.end);
        if start.is_empty() || end.is_empty() {
            return false;
        }
        start == end || start.contains(&end) || end.contains(&start)
    }
}

fn squash_location(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .flat_map(char::to_lowercase)
        .collect()
}

// ========== ITINERARY ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaypointRole {
    Start,
    Overnight,
    End,
    /// Routed through but not a stop.
    Via,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub name: String,
    /// Approximate until refined from the routed legs.
    pub coordinate: Option<Coordinate>,
    pub role: WaypointRole,
    /// Day this waypoint belongs to; the start is day 0.
    pub day: u32,
}

impl Waypoint {
    pub fn is_stop(&self) -> bool {
        self.role != WaypointRole::Via
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayPlan {
    pub day: u32,
    /// Index into `StructuredItinerary::waypoints`.
    pub origin: usize,
    /// Index into `StructuredItinerary::waypoints`.
    pub destination: usize,
    pub distance_km: f64,
    pub highlights: Vec<String>,
    pub accommodation: Option<String>,
    /// Straight-line distance from the start claimed by the model (loops only).
    #[serde(default)]
    pub claimed_distance_from_start_km: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredItinerary {
    pub days: Vec<DayPlan>,
    pub waypoints: Vec<Waypoint>,
    pub total_distance_km: f64,
    #[serde(default)]
    pub summary: Option<String>,
}

impl StructuredItinerary {
    pub fn origin_of(&self, day: &DayPlan) -> &Waypoint {
        &self.waypoints[day.origin]
    }

    pub fn destination_of(&self, day: &DayPlan) -> &Waypoint {
        &self.waypoints[day.destination]
    }

    pub fn day(&self, day: u32) -> Option<&DayPlan> {
        self.days.iter().find(|plan| plan.day == day)
    }

    /// Start, every overnight and the end; via points excluded.
    pub fn stops(&self) -> impl Iterator<Item = &Waypoint> {
        self.waypoints.iter().filter(|wp| wp.is_stop())
    }

    /// Overwrite approximate coordinates with the routed leg endpoints.
    ///
    /// Leg `i` runs from waypoint `i` to waypoint `i + 1`.
    pub fn refine_coordinates(&mut self, legs: &[RouteLeg]) {
        if let Some(first) = legs.first() {
            if let (Some(wp), Some(coord)) = (self.waypoints.first_mut(), first.origin.coordinate) {
                wp.coordinate = Some(coord);
            }
        }
        for leg in legs {
            if let (Some(wp), Some(coord)) = (
                self.waypoints.get_mut(leg.index + 1),
                leg.destination.coordinate,
            ) {
                wp.coordinate = Some(coord);
            }
        }
    }
}

// ========== ROUTE ==========

/// The routed path between two consecutive waypoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteLeg {
    pub index: usize,
    pub origin: Waypoint,
    /// Coordinate is the routed end position reported by the service.
    pub destination: Waypoint,
    pub path: Vec<Coordinate>,
    /// Road-network distance as reported by the directions service.
    pub distance_km: f64,
    pub duration_hours: f64,
}

/// A stop pinned to the exact end coordinate of the leg that reaches it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStop {
    pub day: u32,
    pub name: String,
    pub role: WaypointRole,
    pub coordinate: Coordinate,
    /// Cumulative routed distance when the stop is reached.
    pub distance_km_from_start: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StitchedRoute {
    pub path: Vec<Coordinate>,
    pub legs: Vec<RouteLeg>,
    pub total_distance_km: f64,
    pub total_duration_hours: f64,
    /// Start followed by each day's destination, in day order.
    pub stops: Vec<RouteStop>,
}

impl StitchedRoute {
    /// Routed distance ridden on a given day (sum of its legs).
    pub fn day_distance_km(&self, day: u32) -> f64 {
        self.legs
            .iter()
            .filter(|leg| leg.destination.day == day)
            .map(|leg| leg.distance_km)
            .sum()
    }

    pub fn day_duration_hours(&self, day: u32) -> f64 {
        self.legs
            .iter()
            .filter(|leg| leg.destination.day == day)
            .map(|leg| leg.duration_hours)
            .sum()
    }
}

// ========== NARRATIVE ==========

/// Human-readable trip plan. Revisions create a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrativePlan {
    pub text: String,
}

impl NarrativePlan {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for NarrativePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
