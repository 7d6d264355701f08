use std::sync::Arc;

use dirt_core::{
    compute_constraints, haversine_km, Coordinate, DailyDistance, ErrorKind, PlanError, StopKind,
    TourRequest, TripPreferences, WaypointRole, ROAD_DISTANCE_FACTOR,
};

use crate::config::StitchMode;
use crate::llm::client::mock::MockLlmClient;
use crate::revision::RevisionState;
use crate::testing::*;

fn loop_preferences() -> TripPreferences {
    TripPreferences {
        daily_distance: DailyDistance { min_km: 40.0, max_km: 50.0 },
        ..TripPreferences::default()
    }
}

fn assert_close(a: f64, b: f64) {
    assert!((a - b).abs() < 1e-9, "{a} != {b}");
}

// ========== PLAN ==========

#[tokio::test]
async fn point_to_point_tour_end_to_end() {
    let llm = Arc::new(MockLlmClient::with_texts([PORTLAND_BEND_REPLY, NARRATIVE_REPLY]));
    let directions = Arc::new(MockDirections::new());
    let pipeline = pipeline(&llm, &directions, StitchMode::Batched);

    let tour = pipeline
        .plan("Portland, OR", "Bend, OR", 2, TripPreferences::default())
        .await
        .unwrap();

    assert_eq!(llm.call_count(), 2);
    assert_eq!(directions.directions_calls(), 1);
    assert_eq!(directions.geocode_calls(), 0);

    assert_eq!(tour.itinerary.days.len(), 3);
    assert_eq!(tour.route.legs.len(), 3);
    let leg_sum: f64 = tour.route.legs.iter().map(|leg| leg.distance_km).sum();
    assert_close(tour.route.total_distance_km, leg_sum);
    assert_close(tour.total_distance_km, leg_sum);

    assert!(tour.narrative.as_str().starts_with("# Portland to Bend"));
    assert!(!tour.narrative.as_str().contains("```"));
}

#[tokio::test]
async fn geometry_has_one_line_and_a_point_per_stop() {
    let llm = Arc::new(MockLlmClient::with_texts([PORTLAND_BEND_REPLY, NARRATIVE_REPLY]));
    let directions = Arc::new(MockDirections::new());
    let tour = pipeline(&llm, &directions, StitchMode::Batched)
        .plan("Portland, OR", "Bend, OR", 2, TripPreferences::default())
        .await
        .unwrap();

    assert_eq!(tour.geometry.line_count(), 1);
    assert_eq!(tour.geometry.point_count(), tour.itinerary.days.len() + 1);

    let stops: Vec<_> = tour.geometry.stops().collect();
    assert_eq!(stops[0].0.kind, StopKind::Start);
    assert_eq!(stops[0].0.day, 0);
    assert_eq!(stops.last().unwrap().0.kind, StopKind::End);
    assert_eq!(stops[1].0.accommodation.as_deref(), Some("Tucker Park Campground"));

    // Each overnight sits exactly on the end of the leg that reaches it.
    for (props, coords) in &stops[1..] {
        let leg = tour
            .route
            .legs
            .iter()
            .find(|leg| leg.destination.day == props.day)
            .unwrap();
        assert_eq!(*coords, leg.destination.coordinate.unwrap().to_lon_lat());
    }
    assert_eq!(stops[1].1, snapped(HOOD_RIVER).to_lon_lat());
    assert_eq!(stops[2].1, snapped(MAUPIN).to_lon_lat());
}

#[tokio::test]
async fn waypoints_are_refined_to_routed_endpoints() {
    let llm = Arc::new(MockLlmClient::with_texts([PORTLAND_BEND_REPLY, NARRATIVE_REPLY]));
    let directions = Arc::new(MockDirections::new());
    let tour = pipeline(&llm, &directions, StitchMode::Batched)
        .plan("Portland, OR", "Bend, OR", 2, TripPreferences::default())
        .await
        .unwrap();

    let waypoints = &tour.itinerary.waypoints;
    assert_eq!(waypoints[0].role, WaypointRole::Start);
    assert!(waypoints[0].coordinate.is_some());
    assert_eq!(waypoints[2].coordinate, Some(snapped(MAUPIN)));
    assert_eq!(waypoints[3].coordinate, Some(snapped(BEND)));
}

#[tokio::test]
async fn narrative_prompt_carries_routed_distances() {
    let llm = Arc::new(MockLlmClient::with_texts([PORTLAND_BEND_REPLY, NARRATIVE_REPLY]));
    let directions = Arc::new(MockDirections::new());
    let tour = pipeline(&llm, &directions, StitchMode::Batched)
        .plan("Portland, OR", "Bend, OR", 2, TripPreferences::default())
        .await
        .unwrap();

    let prompt = &llm.requests()[1].user_prompt;
    let day_one = format!("{:.1} km", tour.route.day_distance_km(1));
    assert!(prompt.contains(&day_one), "{prompt}");
    assert!(prompt.contains("packing list"));
    assert!(prompt.contains("backup accommodation"));
    assert!(prompt.contains(&snapped(HOOD_RIVER).to_string()));
}

#[tokio::test]
async fn per_leg_mode_matches_batched_order() {
    let batched_llm = Arc::new(MockLlmClient::with_texts([PORTLAND_BEND_REPLY, NARRATIVE_REPLY]));
    let batched_dirs = Arc::new(MockDirections::new());
    let batched = pipeline(&batched_llm, &batched_dirs, StitchMode::Batched)
        .plan("Portland, OR", "Bend, OR", 2, TripPreferences::default())
        .await
        .unwrap();

    let per_leg_llm = Arc::new(MockLlmClient::with_texts([PORTLAND_BEND_REPLY, NARRATIVE_REPLY]));
    let per_leg_dirs = Arc::new(MockDirections::new());
    let per_leg = pipeline(&per_leg_llm, &per_leg_dirs, StitchMode::PerLeg)
        .plan("Portland, OR", "Bend, OR", 2, TripPreferences::default())
        .await
        .unwrap();

    assert_eq!(per_leg_dirs.directions_calls(), 3);
    assert_eq!(batched.route, per_leg.route);
    assert_eq!(batched.geometry, per_leg.geometry);
}

#[tokio::test]
async fn long_tours_are_split_across_requests() {
    let llm = Arc::new(MockLlmClient::new(vec![
        crate::llm::CompletionResponse::text(long_tour_reply(31)),
        crate::llm::CompletionResponse::text(NARRATIVE_REPLY),
    ]));
    let directions = Arc::new(MockDirections::new());
    let tour = pipeline(&llm, &directions, StitchMode::Batched)
        .plan("Portland, OR", "Vancouver, BC", 30, TripPreferences::default())
        .await
        .unwrap();

    let requests = directions.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].locations.len(), 27);
    assert_eq!(requests[1].locations.len(), 6);
    assert_eq!(tour.route.legs.len(), 31);
    assert!(tour.route.legs.iter().enumerate().all(|(i, leg)| leg.index == i));
    assert_eq!(tour.geometry.point_count(), 32);
}

// ========== CLOSED LOOPS ==========

#[test]
fn six_night_loop_radius() {
    let constraints = compute_constraints(6, &loop_preferences().daily_distance, BOULDER).unwrap();
    assert_close(constraints.max_radius_km, 94.5);
    let ceilings: Vec<f64> = constraints
        .ceilings
        .iter()
        .map(|c| c.max_distance_from_start_km)
        .collect();
    assert!(ceilings.windows(2).all(|w| w[0] >= w[1]));
}

#[tokio::test]
async fn loop_overnights_respect_return_constraint() {
    let llm = Arc::new(MockLlmClient::with_texts([BOULDER_LOOP_REPLY, NARRATIVE_REPLY]));
    let directions = Arc::new(MockDirections::new());
    let tour = pipeline(&llm, &directions, StitchMode::Batched)
        .plan("Boulder, CO", "Boulder, CO", 2, loop_preferences())
        .await
        .unwrap();

    assert_eq!(directions.geocode_calls(), 1);
    let prompt = &llm.requests()[0].user_prompt;
    assert!(prompt.contains("CLOSED LOOP"));
    assert!(prompt.contains("distance_from_start_km * 1.4 <= days_remaining * 50"));

    let nights = tour.request.nights;
    for plan in tour.itinerary.days.iter().filter(|plan| plan.day <= nights) {
        let overnight = tour.itinerary.destination_of(plan).coordinate.unwrap();
        let days_remaining = (nights + 1 - plan.day) as f64;
        assert!(haversine_km(BOULDER, overnight) * ROAD_DISTANCE_FACTOR <= days_remaining * 50.0);
    }

    let end = tour.itinerary.waypoints.last().unwrap();
    assert_eq!(end.role, WaypointRole::End);
    assert_eq!(end.name, "Boulder, CO");
    assert_eq!(tour.route.stops.last().unwrap().coordinate, snapped(BOULDER));
}

#[tokio::test]
async fn loop_violation_retries_once_with_stricter_prompt() {
    let llm = Arc::new(MockLlmClient::with_texts([
        BOULDER_LOOP_TOO_FAR_REPLY,
        BOULDER_LOOP_REPLY,
        NARRATIVE_REPLY,
    ]));
    let directions = Arc::new(MockDirections::new());
    let tour = pipeline(&llm, &directions, StitchMode::Batched)
        .plan("Boulder, CO", "Boulder, CO", 2, loop_preferences())
        .await
        .unwrap();

    assert_eq!(llm.call_count(), 3);
    let retry = &llm.requests()[1].user_prompt;
    assert!(retry.starts_with("CORRECTION REQUIRED"));
    assert!(retry.contains("day 1 overnight"));
    assert_eq!(tour.itinerary.waypoints[1].name, "Lyons, CO");
}

#[tokio::test]
async fn loop_violation_twice_is_reported() {
    let llm = Arc::new(MockLlmClient::with_texts([
        BOULDER_LOOP_TOO_FAR_REPLY,
        BOULDER_LOOP_TOO_FAR_REPLY,
    ]));
    let directions = Arc::new(MockDirections::new());
    let err = pipeline(&llm, &directions, StitchMode::Batched)
        .plan("Boulder, CO", "Boulder, CO", 2, loop_preferences())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    assert_eq!(err.day(), Some(1));
    assert_eq!(llm.call_count(), 2);
    assert_eq!(directions.directions_calls(), 0);
}

/// Heading-only loop reply: no coordinates until the route is stitched.
const BOULDER_LOOP_HEADINGS_REPLY: &str = "Here is your loop.\n\n\
    Day 1: Boulder, CO to Estes Park, CO (65 km)\n\n\
    Day 2: Estes Park, CO to Nederland, CO (50 km)\n\n\
    Day 3: Nederland, CO to Boulder, CO (30 km)\n";

fn boulder_directions() -> MockDirections {
    MockDirections::new()
        .with_place("Estes Park, CO", ESTES_PARK)
        .with_place("Nederland, CO", NEDERLAND)
}

#[tokio::test]
async fn recovered_loop_is_checked_on_routed_coordinates() {
    let llm = Arc::new(MockLlmClient::with_texts([
        BOULDER_LOOP_HEADINGS_REPLY,
        BOULDER_LOOP_REPLY,
        NARRATIVE_REPLY,
    ]));
    let directions = Arc::new(boulder_directions());
    let tour = pipeline(&llm, &directions, StitchMode::Batched)
        .plan("Boulder, CO", "Boulder, CO", 2, loop_preferences())
        .await
        .unwrap();

    assert_eq!(llm.call_count(), 3);
    assert_eq!(directions.directions_calls(), 2);
    let retry = &llm.requests()[1].user_prompt;
    assert!(retry.starts_with("CORRECTION REQUIRED"));
    assert!(retry.contains("day 1 overnight"));
    assert_eq!(tour.itinerary.waypoints[1].name, "Lyons, CO");

    let constraints = compute_constraints(2, &loop_preferences().daily_distance, BOULDER).unwrap();
    for stop in tour.route.stops.iter().filter(|stop| stop.day >= 1 && stop.day <= 2) {
        constraints
            .check_day(stop.day, haversine_km(BOULDER, stop.coordinate), 0.05)
            .unwrap();
    }
}

#[tokio::test]
async fn recovered_loop_too_far_twice_is_reported() {
    let llm = Arc::new(MockLlmClient::with_texts([
        BOULDER_LOOP_HEADINGS_REPLY,
        BOULDER_LOOP_HEADINGS_REPLY,
    ]));
    let directions = Arc::new(boulder_directions());
    let err = pipeline(&llm, &directions, StitchMode::Batched)
        .plan("Boulder, CO", "Boulder, CO", 2, loop_preferences())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    assert_eq!(err.day(), Some(1));
    assert_eq!(llm.call_count(), 2);
    assert_eq!(directions.directions_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn transient_geocoding_errors_are_retried() {
    let llm = Arc::new(MockLlmClient::with_texts([BOULDER_LOOP_REPLY, NARRATIVE_REPLY]));
    let directions = Arc::new(MockDirections::new().with_transient_geocode_failures(2));
    let tour = pipeline(&llm, &directions, StitchMode::Batched)
        .plan("Boulder, CO", "Boulder, CO", 2, loop_preferences())
        .await
        .unwrap();

    assert_eq!(directions.geocode_calls(), 3);
    assert_eq!(tour.itinerary.days.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn persistent_geocoding_errors_exhaust_retries() {
    let llm = Arc::new(MockLlmClient::with_texts([BOULDER_LOOP_REPLY]));
    let directions = Arc::new(MockDirections::new().with_transient_geocode_failures(100));
    let err = pipeline(&llm, &directions, StitchMode::Batched)
        .plan("Boulder, CO", "Boulder, CO", 2, loop_preferences())
        .await
        .unwrap_err();

    assert!(matches!(err, PlanError::RoutingServiceUnavailable { attempts: 4, .. }));
    assert_eq!(directions.geocode_calls(), 4);
    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn loop_start_that_cannot_be_geocoded_fails() {
    let llm = Arc::new(MockLlmClient::with_texts([BOULDER_LOOP_REPLY]));
    let directions = Arc::new(MockDirections::new());
    let err = pipeline(&llm, &directions, StitchMode::Batched)
        .plan("Atlantis", "Atlantis", 2, loop_preferences())
        .await
        .unwrap_err();

    assert!(matches!(err, PlanError::Geocode(_)));
    assert_eq!(llm.call_count(), 0);
}

// ========== MODEL OUTPUT ==========

#[tokio::test]
async fn malformed_json_recovers_from_day_headings() {
    let reply = "Sure! {\"days\": [ oops\n\n\
                 Day 1: Portland, OR to Hood River, OR (105 km)\n\
                 Highlights: Columbia Gorge\n\n\
                 Day 2: Hood River, OR to The Dalles, OR - 35 miles\n\n\
                 Day 3: The Dalles, OR to Bend, OR (210 km)\n";
    let llm = Arc::new(MockLlmClient::with_texts([reply, NARRATIVE_REPLY]));
    let directions = Arc::new(
        MockDirections::new()
            .with_place("Hood River, OR", HOOD_RIVER)
            .with_place("The Dalles, OR", Coordinate::new(45.5946, -121.1787)),
    );
    let tour = pipeline(&llm, &directions, StitchMode::Batched)
        .plan("Portland, OR", "Bend, OR", 2, TripPreferences::default())
        .await
        .unwrap();

    let names: Vec<&str> = tour.itinerary.waypoints.iter().map(|wp| wp.name.as_str()).collect();
    assert_eq!(names, ["Portland, OR", "Hood River, OR", "The Dalles, OR", "Bend, OR"]);
    assert!((tour.itinerary.days[1].distance_km - 35.0 * 1.609_344).abs() < 1e-6);
    assert_eq!(tour.route.legs.len(), 3);
}

#[tokio::test]
async fn unreadable_reply_retries_then_reports_incomplete() {
    let llm = Arc::new(MockLlmClient::with_texts([
        "I would love to help plan this trip!",
        "Day 1: Portland, OR to Hood River, OR (105 km)",
    ]));
    let directions = Arc::new(MockDirections::new());
    let err = pipeline(&llm, &directions, StitchMode::Batched)
        .plan("Portland, OR", "Bend, OR", 2, TripPreferences::default())
        .await
        .unwrap_err();

    assert_eq!(err, PlanError::ItineraryIncomplete { expected: 3, found: 1 });
    assert_eq!(llm.call_count(), 2);
    assert!(llm.requests()[1].user_prompt.contains("described 0 of the 3 required days"));
}

#[tokio::test]
async fn empty_narrative_is_an_error() {
    let llm = Arc::new(MockLlmClient::with_texts([PORTLAND_BEND_REPLY, "```markdown\n```"]));
    let directions = Arc::new(MockDirections::new());
    let err = pipeline(&llm, &directions, StitchMode::Batched)
        .plan("Portland, OR", "Bend, OR", 2, TripPreferences::default())
        .await
        .unwrap_err();
    assert_eq!(err, PlanError::NarrativeEmpty);
}

#[tokio::test]
async fn model_failure_is_reported_as_model_error() {
    let llm = Arc::new(MockLlmClient::new(vec![]));
    let directions = Arc::new(MockDirections::new());
    let err = pipeline(&llm, &directions, StitchMode::Batched)
        .plan("Portland, OR", "Bend, OR", 2, TripPreferences::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Model);
}

// ========== ROUTING FAILURES ==========

#[tokio::test]
async fn no_route_names_the_leg_and_builds_no_geometry() {
    let llm = Arc::new(MockLlmClient::with_texts([PORTLAND_BEND_REPLY, NARRATIVE_REPLY]));
    let directions = Arc::new(MockDirections::new().with_unreachable(MAUPIN));
    let err = pipeline(&llm, &directions, StitchMode::Batched)
        .plan("Portland, OR", "Bend, OR", 2, TripPreferences::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RouteNotFound);
    assert_eq!(err.leg_index(), Some(1));
    assert!(matches!(
        &err,
        PlanError::RouteNotFound { from, to, .. } if from == "Hood River, OR" && to == "Maupin, OR"
    ));
    // Batched request, then per-leg requests up to the failing leg.
    assert_eq!(directions.directions_calls(), 3);
    // Narration never ran.
    assert_eq!(llm.call_count(), 1);
}

#[tokio::test]
async fn no_route_in_per_leg_mode() {
    let llm = Arc::new(MockLlmClient::with_texts([PORTLAND_BEND_REPLY, NARRATIVE_REPLY]));
    let directions = Arc::new(MockDirections::new().with_unreachable(BEND));
    let err = pipeline(&llm, &directions, StitchMode::PerLeg)
        .plan("Portland, OR", "Bend, OR", 2, TripPreferences::default())
        .await
        .unwrap_err();
    assert_eq!(err.leg_index(), Some(2));
}

#[tokio::test(start_paused = true)]
async fn transient_errors_are_retried() {
    let llm = Arc::new(MockLlmClient::with_texts([PORTLAND_BEND_REPLY, NARRATIVE_REPLY]));
    let directions = Arc::new(MockDirections::new().with_transient_failures(2));
    let tour = pipeline(&llm, &directions, StitchMode::Batched)
        .plan("Portland, OR", "Bend, OR", 2, TripPreferences::default())
        .await
        .unwrap();

    assert_eq!(directions.directions_calls(), 3);
    assert_eq!(tour.route.legs.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn persistent_transient_errors_exhaust_retries() {
    let llm = Arc::new(MockLlmClient::with_texts([PORTLAND_BEND_REPLY, NARRATIVE_REPLY]));
    let directions = Arc::new(MockDirections::new().with_transient_failures(100));
    let err = pipeline(&llm, &directions, StitchMode::Batched)
        .plan("Portland, OR", "Bend, OR", 2, TripPreferences::default())
        .await
        .unwrap_err();

    assert!(matches!(err, PlanError::RoutingServiceUnavailable { attempts: 4, .. }));
    assert_eq!(directions.directions_calls(), 4);
}

// ========== REVISION ==========

#[tokio::test]
async fn narrative_only_revision_keeps_route_data() {
    let llm = Arc::new(MockLlmClient::with_texts([
        PORTLAND_BEND_REPLY,
        NARRATIVE_REPLY,
        "# Portland to Bend\n\nNow with breweries.",
    ]));
    let directions = Arc::new(MockDirections::new());
    let pipeline = pipeline(&llm, &directions, StitchMode::Batched);
    let tour = pipeline
        .plan("Portland, OR", "Bend, OR", 2, TripPreferences::default())
        .await
        .unwrap();
    let itinerary_json = serde_json::to_vec(&tour.itinerary).unwrap();
    let route_json = serde_json::to_vec(&tour.route).unwrap();
    let geometry_json = serde_json::to_vec(&tour.geometry).unwrap();

    let mut engine = pipeline.revision_engine(tour.clone());
    let revised = engine
        .revise("Add more brewery recommendations", None)
        .await
        .unwrap()
        .clone();

    assert_eq!(engine.state(), RevisionState::Stable);
    assert_eq!(directions.directions_calls(), 1);
    assert_eq!(serde_json::to_vec(&revised.itinerary).unwrap(), itinerary_json);
    assert_eq!(serde_json::to_vec(&revised.route).unwrap(), route_json);
    assert_eq!(serde_json::to_vec(&revised.geometry).unwrap(), geometry_json);
    assert_ne!(revised.narrative, tour.narrative);

    let prompt = &llm.requests()[2].user_prompt;
    assert!(prompt.contains("ORIGINAL PLAN:\n# Portland to Bend"));
    assert!(prompt.contains("Keep every part of the original plan"));
}

#[tokio::test]
async fn changing_nights_replans_the_route() {
    let four_days = long_tour_reply(4);
    let llm = Arc::new(MockLlmClient::new(vec![
        crate::llm::CompletionResponse::text(PORTLAND_BEND_REPLY),
        crate::llm::CompletionResponse::text(NARRATIVE_REPLY),
        crate::llm::CompletionResponse::text(four_days),
        crate::llm::CompletionResponse::text("# Revised\n\nFour days now."),
    ]));
    let directions = Arc::new(MockDirections::new());
    let pipeline = pipeline(&llm, &directions, StitchMode::Batched);
    let tour = pipeline
        .plan("Portland, OR", "Bend, OR", 2, TripPreferences::default())
        .await
        .unwrap();

    let longer = TourRequest::new("Portland, OR", "Bend, OR", 3, TripPreferences::default()).unwrap();
    let mut engine = pipeline.revision_engine(tour);
    let revised = engine.revise("looks good", Some(longer)).await.unwrap();

    assert_eq!(revised.request.nights, 3);
    assert_eq!(revised.itinerary.days.len(), 4);
    assert_eq!(revised.geometry.point_count(), 5);
    assert_eq!(directions.directions_calls(), 2);
}

#[tokio::test]
async fn failed_revision_keeps_previous_tour() {
    let llm = Arc::new(MockLlmClient::with_texts([PORTLAND_BEND_REPLY, NARRATIVE_REPLY]));
    let directions = Arc::new(MockDirections::new());
    let pipeline = pipeline(&llm, &directions, StitchMode::Batched);
    let tour = pipeline
        .plan("Portland, OR", "Bend, OR", 2, TripPreferences::default())
        .await
        .unwrap();

    let mut engine = pipeline.revision_engine(tour.clone());
    let err = engine.revise("Add a packing checklist", None).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Model);
    assert_eq!(engine.state(), RevisionState::Stable);
    assert_eq!(engine.tour(), &tour);
}

#[tokio::test]
async fn stateless_narrative_revision_does_not_replan() {
    let llm = Arc::new(MockLlmClient::with_texts(["# Portland to Bend\n\nRevised with breweries."]));
    let directions = Arc::new(MockDirections::new());
    let request = TourRequest::new("Portland, OR", "Bend, OR", 2, TripPreferences::default()).unwrap();

    let narrative = pipeline(&llm, &directions, StitchMode::Batched)
        .revise(
            "# Portland to Bend\n\nDay 1 ends in Hood River.",
            "Add more brewery recommendations",
            &request,
        )
        .await
        .unwrap();

    assert!(narrative.as_str().contains("breweries"));
    assert_eq!(llm.call_count(), 1);
    assert_eq!(directions.directions_calls(), 0);
    let prompt = &llm.requests()[0].user_prompt;
    assert!(prompt.contains("Day 1 ends in Hood River."));
    assert!(prompt.contains("Add more brewery recommendations"));
    assert!(!prompt.contains("ROUTED ITINERARY"));
}

#[tokio::test]
async fn stateless_route_change_replans_and_rewrites() {
    let llm = Arc::new(MockLlmClient::with_texts([
        PORTLAND_BEND_REPLY,
        "# Portland to Bend\n\nShorter second day.",
    ]));
    let directions = Arc::new(MockDirections::new());
    let request = TourRequest::new("Portland, OR", "Bend, OR", 2, TripPreferences::default()).unwrap();

    let narrative = pipeline(&llm, &directions, StitchMode::Batched)
        .revise("# Portland to Bend\n\nOld plan.", "Make day 2 shorter", &request)
        .await
        .unwrap();

    assert!(narrative.as_str().contains("Shorter"));
    assert_eq!(directions.directions_calls(), 1);
    let prompt = &llm.requests()[1].user_prompt;
    assert!(prompt.contains("Old plan."));
    assert!(prompt.contains("ROUTED ITINERARY"));
    assert!(prompt.contains("Hood River, OR"));
}
