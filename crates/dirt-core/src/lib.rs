pub mod constraints;
pub mod error;
pub mod geometry;
pub mod itinerary;
pub mod models;
pub mod polyline;
pub mod profile;
pub mod spatial;
pub mod stitch;

pub use constraints::{
    compute_constraints, DayCeiling, RadiusConstraints, DEFAULT_TOLERANCE, RADIUS_BUDGET_FRACTION,
    ROAD_DISTANCE_FACTOR,
};
pub use error::{ErrorKind, PlanError};
pub use geometry::{
    DocumentProperties, Feature, FeatureProperties, Geometry, GeometryDocument, RouteProperties,
    StopKind, StopProperties,
};
pub use itinerary::{
    assemble, parse_model_response, strip_code_fence, DraftDay, DraftVia, ItineraryDraft,
    ParseOutcome,
};
pub use models::{
    AccommodationStyle, BudgetTier, Coordinate, DailyDistance, DayPlan, FitnessLevel,
    NarrativePlan, RouteLeg, RouteStop, StitchedRoute, StructuredItinerary, TerrainPreference,
    TourRequest, TripPreferences, Waypoint, WaypointRole, DEFAULT_TIRE_PROFILE, KM_PER_MILE,
};
pub use polyline::PolylineError;
pub use profile::{
    classify_tire, default_profile, load_or_create_profile, load_profile, parse_profile,
    render_profile, save_profile, ProfileError, TireClass,
};
pub use spatial::{haversine_distance, haversine_km};
pub use stitch::stitch_legs;
