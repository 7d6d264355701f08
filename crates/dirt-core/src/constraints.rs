//! Return-feasibility limits for closed-loop tours.
//!
//! A loop has to get the rider home within the daily distance band, so each
//! overnight stop must stay close enough to the start that the remaining
//! days can cover the ride back. Straight-line distance is converted to
//! expected road distance with [`ROAD_DISTANCE_FACTOR`].

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PlanError;
use crate::models::{Coordinate, DailyDistance, StructuredItinerary};
use crate::spatial::haversine_km;

/// Road kilometres per straight-line kilometre.
pub const ROAD_DISTANCE_FACTOR: f64 = 1.4;

/// Share of the total daily-distance budget usable as loop radius.
pub const RADIUS_BUDGET_FRACTION: f64 = 0.35;

/// Relative slack allowed when re-checking model-proposed stops.
pub const DEFAULT_TOLERANCE: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DayCeiling {
    pub day: u32,
    /// Riding days left after this day's overnight, including the return.
    pub days_remaining: u32,
    pub max_distance_from_start_km: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadiusConstraints {
    pub nights: u32,
    pub start: Coordinate,
    pub average_daily_km: f64,
    pub max_daily_km: f64,
    pub max_radius_km: f64,
    /// One entry per overnight, day 1 through day `nights`.
    pub ceilings: Vec<DayCeiling>,
}

/// Compute loop limits for `nights` overnights from `start`.
pub fn compute_constraints(
    nights: u32,
    band: &DailyDistance,
    start: Coordinate,
) -> Result<RadiusConstraints, PlanError> {
    if nights == 0 {
        return Err(PlanError::InvalidPreferences(
            "closed loop needs at least one night".to_string(),
        ));
    }
    if !band.max_km.is_finite() || band.max_km <= 0.0 {
        return Err(PlanError::InvalidPreferences(format!(
            "maximum daily distance must be positive, got {}",
            band.max_km
        )));
    }

    let average_daily_km = band.average_km();
    let max_radius_km = average_daily_km * nights as f64 * RADIUS_BUDGET_FRACTION;
    let ceilings = (1..=nights)
        .map(|day| {
            let days_remaining = nights + 1 - day;
            DayCeiling {
                day,
                days_remaining,
                max_distance_from_start_km: days_remaining as f64 * band.max_km
                    / ROAD_DISTANCE_FACTOR,
            }
        })
        .collect();

    debug!(nights, max_radius_km, "computed loop constraints");

    Ok(RadiusConstraints {
        nights,
        start,
        average_daily_km,
        max_daily_km: band.max_km,
        max_radius_km,
        ceilings,
    })
}

impl RadiusConstraints {
    pub fn ceiling(&self, day: u32) -> Option<&DayCeiling> {
        self.ceilings.iter().find(|ceiling| ceiling.day == day)
    }

    /// The tighter of the day's return ceiling and the loop radius.
    pub fn limit_km(&self, day: u32) -> Option<f64> {
        self.ceiling(day)
            .map(|ceiling| ceiling.max_distance_from_start_km.min(self.max_radius_km))
    }

    /// `distance * 1.4 <= days_remaining * max_daily`, up to float noise.
    pub fn allows_return(&self, day: u32, distance_from_start_km: f64) -> bool {
        match self.ceiling(day) {
            Some(ceiling) => {
                distance_from_start_km * ROAD_DISTANCE_FACTOR
                    <= ceiling.days_remaining as f64 * self.max_daily_km + 1e-9
            }
            // Final day ends at the start.
            None => true,
        }
    }

    /// Check one overnight against its limit with relative `tolerance`.
    pub fn check_day(
        &self,
        day: u32,
        distance_from_start_km: f64,
        tolerance: f64,
    ) -> Result<(), PlanError> {
        let Some(limit_km) = self.limit_km(day) else {
            return Ok(());
        };
        if distance_from_start_km > limit_km * (1.0 + tolerance.max(0.0)) {
            return Err(PlanError::ConstraintViolation {
                day,
                distance_km: distance_from_start_km,
                limit_km,
            });
        }
        Ok(())
    }

    /// Recompute each overnight's distance from the start and check it.
    ///
    /// Coordinates win over the model's claimed distance; days with neither
    /// are skipped since there is nothing to measure.
    pub fn verify(&self, itinerary: &StructuredItinerary, tolerance: f64) -> Result<(), PlanError> {
        for plan in itinerary.days.iter().filter(|plan| plan.day <= self.nights) {
            let destination = itinerary.destination_of(plan);
            let measured = destination
                .coordinate
                .map(|coord| haversine_km(self.start, coord));
            let Some(distance) = measured.or(plan.claimed_distance_from_start_km) else {
                debug!(day = plan.day, "no coordinate or claim, skipping loop check");
                continue;
            };

            if let (Some(measured), Some(claimed)) = (measured, plan.claimed_distance_from_start_km) {
                if (measured - claimed).abs() > 10.0 {
                    debug!(
                        day = plan.day,
                        measured,
                        claimed,
                        "model distance claim disagrees with coordinates"
                    );
                }
            }

            self.check_day(plan.day, distance, tolerance)?;
        }
        Ok(())
    }

    /// Human-readable table embedded in the planning prompt.
    pub fn describe(&self) -> String {
        let mut lines = vec![format!(
            "Maximum radius from start: {:.1} km (straight line)",
            self.max_radius_km
        )];
        for ceiling in &self.ceilings {
            lines.push(format!(
                "Day {} overnight: at most {:.1} km from start ({} days left to return)",
                ceiling.day,
                ceiling.max_distance_from_start_km.min(self.max_radius_km),
                ceiling.days_remaining
            ));
        }
        lines.join("\n")
    }
}
