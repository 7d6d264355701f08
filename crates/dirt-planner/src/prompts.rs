//! Prompt text for the planning, narration and revision calls.

use std::fmt::Write as _;

use dirt_core::{
    classify_tire, PlanError, RadiusConstraints, StitchedRoute, StructuredItinerary, TourRequest,
    TripPreferences, ROAD_DISTANCE_FACTOR,
};

pub const PLANNER_SYSTEM: &str = "You are an expert bikepacking route planner. \
You choose real, specific towns and campgrounds as overnight stops and you answer \
with a single JSON object and nothing else.";

pub const NARRATOR_SYSTEM: &str = "You are an expert bikepacking trip planner with \
extensive knowledge of cycling routes, accommodations and outdoor safety. You write \
detailed, practical trip plans in Markdown.";

pub const REVISION_SYSTEM: &str = "You are an expert bikepacking trip planner. Revise \
the existing plan based on the rider's feedback while keeping its quality, format and \
practical detail.";

fn preferences_block(prefs: &TripPreferences) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "- Accommodation: {}", prefs.accommodation.as_str());
    let _ = writeln!(out, "- Stealth camping allowed: {}", prefs.stealth_camping);
    let _ = writeln!(out, "- Fitness level: {}", prefs.fitness_level.as_str());
    let _ = writeln!(out, "- Terrain preference: {}", prefs.terrain.as_str());
    let _ = writeln!(out, "- Daily distance: {} km", prefs.daily_distance);
    let _ = writeln!(out, "- Budget: {}", prefs.budget.as_str());
    let _ = writeln!(out, "- Tire size: {}", prefs.tire_profile);
    let _ = writeln!(out, "- Interests: {}", prefs.desires_text());
    let _ = write!(
        out,
        "- Departure date: {}",
        prefs
            .departure_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "not specified".to_string())
    );
    out
}

fn surface_block(prefs: &TripPreferences) -> String {
    let class = classify_tire(&prefs.tire_profile);
    format!(
        "Tire \"{}\" is a {} setup and terrain preference is \"{}\": {}",
        prefs.tire_profile,
        class.as_str(),
        prefs.terrain.as_str(),
        class.surface_guidance()
    )
}

fn schema_block(request: &TourRequest, is_loop: bool) -> String {
    let loop_fields = if is_loop {
        ",\n      \"distance_from_start_km\": 35,\n      \"days_remaining_to_return\": 3"
    } else {
        ""
    };
    format!(
        r#"{{
  "days": [
    {{
      "day": 1,
      "start_location": "{start}",
      "end_location": "Specific Town, State",
      "latitude": 0.0,
      "longitude": 0.0,
      "overnight_location": "Named campground, hostel or hotel",
      "highlights": ["attraction", "attraction"],
      "estimated_distance_km": 60{loop_fields}
    }}
  ],
  "total_distance_km": 0,
  "route_summary": "One paragraph describing the route"
}}
Return exactly {days} entries in "days", numbered 1 to {days}. Day {days} must end at "{end}".
Coordinates are the approximate latitude/longitude of each day's end location."#,
        start = request.start,
        end = request.end,
        days = request.days(),
    )
}

/// Prompt asking the model for the day-by-day skeleton as JSON.
pub fn planning_prompt(request: &TourRequest, constraints: Option<&RadiusConstraints>) -> String {
    let prefs = &request.preferences;
    let mut out = String::new();

    let _ = writeln!(
        out,
        "Plan a {}-night, {}-day bikepacking trip from \"{}\" to \"{}\".",
        request.nights,
        request.days(),
        request.start,
        request.end
    );
    if constraints.is_some() {
        let _ = writeln!(
            out,
            "This is a CLOSED LOOP: the rider leaves from and returns to the same place."
        );
    } else {
        let _ = writeln!(
            out,
            "This is a point-to-point tour: every day must make progress toward the destination."
        );
    }

    let _ = writeln!(out, "\nRIDER PREFERENCES:\n{}", preferences_block(prefs));
    let _ = writeln!(out, "\nROUTE SURFACE:\n{}", surface_block(prefs));

    if let Some(constraints) = constraints {
        let _ = writeln!(out, "\nLOOP DISTANCE LIMITS:\n{}", constraints.describe());
        let _ = writeln!(
            out,
            "Every overnight must satisfy: distance_from_start_km * {} <= days_remaining * {:.0} \
             (days_remaining counts the riding days left to get back, including the next day). \
             Distances from start are straight-line kilometres. Do not push outward on the \
             first days and then race home; spread the loop evenly.",
            ROAD_DISTANCE_FACTOR, constraints.max_daily_km
        );
    }

    let _ = writeln!(
        out,
        "\nPLANNING REQUIREMENTS:\n\
         1. Choose real towns, campgrounds or landmarks as overnight stops.\n\
         2. Keep each day within {} km.\n\
         3. Prefer scenic routes with services that match the interests above.",
        prefs.daily_distance
    );

    let _ = write!(
        out,
        "\nRespond with JSON only, in this format:\n{}",
        schema_block(request, constraints.is_some())
    );
    out
}

/// Follow-up sent once when the first reply was unusable.
pub fn stricter_planning_prompt(
    request: &TourRequest,
    constraints: Option<&RadiusConstraints>,
    defect: &PlanError,
) -> String {
    let correction = match defect {
        PlanError::ItineraryIncomplete { expected, found } => format!(
            "Your previous answer described {} of the {} required days or was not valid JSON. \
             Return all {} days as a JSON object with a \"days\" array and no other text.",
            found, expected, expected
        ),
        PlanError::ConstraintViolation {
            day,
            distance_km,
            limit_km,
        } => format!(
            "Your previous answer put the day {} overnight {:.1} km from the start, but the \
             limit for that night is {:.1} km. Choose closer overnight stops so the rider can \
             get back in time.",
            day, distance_km, limit_km
        ),
        other => format!("Your previous answer was rejected: {}.", other),
    };

    format!(
        "CORRECTION REQUIRED: {}\n\n{}",
        correction,
        planning_prompt(request, constraints)
    )
}

fn route_block(itinerary: &StructuredItinerary, route: &StitchedRoute) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Total routed distance: {:.1} km, riding time {:.1} h",
        route.total_distance_km, route.total_duration_hours
    );
    for plan in &itinerary.days {
        let origin = itinerary.origin_of(plan);
        let destination = itinerary.destination_of(plan);
        let stop = route.stops.iter().find(|stop| stop.day == plan.day);
        let _ = write!(
            out,
            "- Day {}: {} -> {}, {:.1} km, {:.1} h",
            plan.day,
            origin.name,
            destination.name,
            route.day_distance_km(plan.day),
            route.day_duration_hours(plan.day)
        );
        if let Some(stop) = stop {
            let _ = write!(
                out,
                ", arrives at {} ({:.1} km from start)",
                stop.coordinate, stop.distance_km_from_start
            );
        }
        if let Some(accommodation) = &plan.accommodation {
            let _ = write!(out, ", overnight: {}", accommodation);
        }
        if !plan.highlights.is_empty() {
            let _ = write!(out, ", highlights: {}", plan.highlights.join("; "));
        }
        out.push('\n');
    }
    out
}

/// Prompt for the final Markdown plan, built on the routed distances.
pub fn narration_prompt(
    request: &TourRequest,
    itinerary: &StructuredItinerary,
    route: &StitchedRoute,
) -> String {
    format!(
        "Create a detailed {nights}-night bikepacking trip plan from \"{start}\" to \"{end}\".\n\n\
         RIDER PREFERENCES:\n{prefs}\n\n\
         ROUTE SURFACE:\n{surface}\n\n\
         ROUTED ITINERARY (use these distances and times, they come from real bicycle directions):\n{route}\n\
         For EACH day include:\n\
         - a route summary with surfaces and notable climbs\n\
         - a primary and a backup accommodation near the overnight coordinates\n\
         - points of interest that match the interests: {desires}\n\
         - resupply, water and bike-shop notes\n\
         - a short safety subsection\n\n\
         For the whole trip include:\n\
         - a summary table (day, start, end, overnight, daily km, cumulative km, highlights)\n\
         - a packing list suited to the tires and terrain\n\
         - a budget estimate for the {budget} budget level\n\
         - emergency and safety contacts for the region\n\n\
         Write the plan in Markdown.",
        nights = request.nights,
        start = request.start,
        end = request.end,
        prefs = preferences_block(&request.preferences),
        surface = surface_block(&request.preferences),
        route = route_block(itinerary, route),
        desires = request.preferences.desires_text(),
        budget = request.preferences.budget.as_str(),
    )
}

/// Prompt to rewrite a prior plan around rider feedback.
///
/// Without `routed` data the stops and distances already in the prior plan
/// are kept as they are.
pub fn revision_prompt(
    prior_narrative: &str,
    feedback: &str,
    request: &TourRequest,
    routed: Option<(&StructuredItinerary, &StitchedRoute)>,
) -> String {
    let route = match routed {
        Some((itinerary, route)) => format!(
            "ROUTED ITINERARY:\n{}\n\
             Address the feedback directly. Keep every part of the original plan that the \
             feedback does not mention, and keep the same format and structure. Use the routed \
             distances above.",
            route_block(itinerary, route)
        ),
        None => "Address the feedback directly. Keep every part of the original plan that the \
                 feedback does not mention, and keep the same format and structure. Keep the \
                 daily stops, overnights and distances exactly as the original plan gives them."
            .to_string(),
    };
    format!(
        "You are revising a bikepacking trip plan.\n\n\
         ORIGINAL PLAN:\n{prior}\n\n\
         RIDER FEEDBACK:\n{feedback}\n\n\
         TRIP: {nights} nights from \"{start}\" to \"{end}\".\n\n\
         RIDER PREFERENCES:\n{prefs}\n\n\
         {route}",
        prior = prior_narrative.trim(),
        feedback = feedback.trim(),
        nights = request.nights,
        start = request.start,
        end = request.end,
        prefs = preferences_block(&request.preferences),
        route = route,
    )
}
