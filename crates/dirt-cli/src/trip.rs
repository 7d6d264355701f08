//! Trip directories: report, route geometry, profile and request.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use dirt_core::{
    geometry, render_profile, NarrativePlan, StitchedRoute, StructuredItinerary, TourRequest,
};
use dirt_planner::PlannedTour;
use serde::{Deserialize, Serialize};
use tracing::info;

pub const REPORT_FILE: &str = "report.md";
pub const GEOMETRY_FILE: &str = "route.geojson";
pub const PROFILE_FILE: &str = "profile.yml";
pub const REQUEST_FILE: &str = "trip.json";

/// Separates the generated header from the narrative in `report.md`.
const REPORT_SEPARATOR: &str = "\n---\n\n";

/// What `trip.json` holds: enough to revise without planning again.
#[derive(Debug, Serialize, Deserialize)]
struct TripRecord {
    request: TourRequest,
    itinerary: StructuredItinerary,
    route: StitchedRoute,
}

/// A trip read back from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedTrip {
    pub dir: PathBuf,
    pub tour: PlannedTour,
}

/// `"Portland, OR"` and `"Bend, OR"` give `portland-or-to-bend-or`.
pub fn trip_dir_name(start: &str, end: &str) -> String {
    format!("{}-to-{}", slug(start), slug(end))
}

fn slug(name: &str) -> String {
    name.to_lowercase()
        .replace(',', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

fn render_report(request: &TourRequest, total_distance_km: f64, narrative: &NarrativePlan) -> String {
    format!(
        "# Bikepacking Trip: {} to {}\n\n\
         **Duration:** {} nights\n\
         **Total distance:** {:.1} km\n\
         **Generated:** {}{}{}\n",
        request.start,
        request.end,
        request.nights,
        total_distance_km,
        Utc::now().format("%Y-%m-%d %H:%M UTC"),
        REPORT_SEPARATOR,
        narrative.as_str().trim_end()
    )
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

fn write_tour(dir: &Path, tour: &PlannedTour) -> Result<()> {
    let record = TripRecord {
        request: tour.request.clone(),
        itinerary: tour.itinerary.clone(),
        route: tour.route.clone(),
    };

    write_file(
        &dir.join(REPORT_FILE),
        &render_report(&tour.request, tour.total_distance_km, &tour.narrative),
    )?;
    write_file(
        &dir.join(GEOMETRY_FILE),
        &serde_json::to_string_pretty(&tour.geometry).context("failed to encode route geometry")?,
    )?;
    write_file(
        &dir.join(PROFILE_FILE),
        &render_profile(&tour.request.preferences).context("failed to encode profile")?,
    )?;
    write_file(
        &dir.join(REQUEST_FILE),
        &serde_json::to_string_pretty(&record).context("failed to encode trip record")?,
    )
}

/// Write every artifact of `tour` into `<output_dir>/<start>-to-<end>/`.
pub fn save_trip(output_dir: &Path, tour: &PlannedTour) -> Result<PathBuf> {
    let dir = output_dir.join(trip_dir_name(&tour.request.start, &tour.request.end));
    fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
    write_tour(&dir, tour)?;

    info!(dir = %dir.display(), "trip saved");
    Ok(dir)
}

/// Read a trip written by [`save_trip`]; the geometry is rebuilt from the
/// saved route.
pub fn load_trip(dir: &Path) -> Result<SavedTrip> {
    let record_path = dir.join(REQUEST_FILE);
    let raw = fs::read_to_string(&record_path)
        .with_context(|| format!("failed to read {}", record_path.display()))?;
    let record: TripRecord = serde_json::from_str(&raw)
        .with_context(|| format!("invalid trip record in {}", record_path.display()))?;
    record.request.validate()?;

    let report_path = dir.join(REPORT_FILE);
    let report = fs::read_to_string(&report_path)
        .with_context(|| format!("failed to read {}", report_path.display()))?;
    let narrative = match report.split_once(REPORT_SEPARATOR) {
        Some((_, body)) => body,
        None => report.as_str(),
    };

    let geometry = geometry::build(&record.route, &record.itinerary)?;
    Ok(SavedTrip {
        dir: dir.to_path_buf(),
        tour: PlannedTour {
            total_distance_km: record.route.total_distance_km,
            request: record.request,
            itinerary: record.itinerary,
            route: record.route,
            narrative: NarrativePlan::new(narrative.trim()),
            geometry,
        },
    })
}

/// Write a revised tour over the saved trip it came from.
///
/// Every file is rewritten from `tour`, so a narrative-only revision leaves
/// the route files byte for byte as they were.
pub fn save_revision(trip: &SavedTrip, tour: &PlannedTour) -> Result<PathBuf> {
    write_tour(&trip.dir, tour)?;
    let path = trip.dir.join(REPORT_FILE);
    info!(path = %path.display(), "revised trip saved");
    Ok(path)
}
