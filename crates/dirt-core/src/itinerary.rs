//! Parsing of the planning model's reply into a structured itinerary.
//!
//! The reply is read strictly first: code fences are stripped, the first
//! balanced JSON object is isolated and decoded against a schema that accepts
//! either a `days` array or the older `itinerary: {"day_1": ...}` map. When
//! that fails, a text pass looks for `Day N:` headings and recovers what it
//! can. The result is a tagged [`ParseOutcome`] so callers know how much to
//! trust it.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::constraints::ROAD_DISTANCE_FACTOR;
use crate::error::PlanError;
use crate::models::{
    Coordinate, DayPlan, StructuredItinerary, TourRequest, Waypoint, WaypointRole, KM_PER_MILE,
};
use crate::spatial::haversine_km;

// ========== DRAFT ==========

/// A pass-through point the model wants the route to follow.
#[derive(Debug, Clone, PartialEq)]
pub struct DraftVia {
    pub name: String,
    pub coordinate: Option<Coordinate>,
}

/// One day as the model described it, before validation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DraftDay {
    pub day: u32,
    pub start_name: Option<String>,
    pub end_name: String,
    pub coordinate: Option<Coordinate>,
    pub overnight: Option<String>,
    pub highlights: Vec<String>,
    pub distance_km: Option<f64>,
    pub distance_from_start_km: Option<f64>,
    pub days_remaining: Option<u32>,
    pub via: Vec<DraftVia>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ItineraryDraft {
    /// Sorted by day, one entry per day number.
    pub days: Vec<DraftDay>,
    pub total_distance_km: Option<f64>,
    pub summary: Option<String>,
}

/// How the model reply was read.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// Strict JSON decode succeeded.
    Parsed(ItineraryDraft),
    /// JSON was unusable; days were recovered from `Day N:` headings.
    Recovered(ItineraryDraft),
    /// Nothing usable.
    Failed(String),
}

impl ParseOutcome {
    pub fn draft(&self) -> Option<&ItineraryDraft> {
        match self {
            ParseOutcome::Parsed(draft) | ParseOutcome::Recovered(draft) => Some(draft),
            ParseOutcome::Failed(_) => None,
        }
    }

    pub fn into_draft(self) -> Option<ItineraryDraft> {
        match self {
            ParseOutcome::Parsed(draft) | ParseOutcome::Recovered(draft) => Some(draft),
            ParseOutcome::Failed(_) => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ParseOutcome::Parsed(_) => "parsed",
            ParseOutcome::Recovered(_) => "recovered",
            ParseOutcome::Failed(_) => "failed",
        }
    }
}

/// Read a planning reply.
pub fn parse_model_response(text: &str) -> ParseOutcome {
    let strict_error = match parse_strict(text) {
        Ok(draft) if !draft.days.is_empty() => return ParseOutcome::Parsed(draft),
        Ok(_) => "JSON contained no days".to_string(),
        Err(err) => err,
    };
    debug!(error = %strict_error, "strict itinerary parse failed, trying headings");

    let recovered = parse_headings(text);
    if recovered.days.is_empty() {
        ParseOutcome::Failed(strict_error)
    } else {
        ParseOutcome::Recovered(recovered)
    }
}

/// Remove a Markdown code fence wrapping the whole reply, if present.
pub fn strip_code_fence(text: &str) -> &str {
    let body = text.trim();
    if !body.starts_with("```") {
        return body;
    }
    let body = match body.find('\n') {
        Some(newline) => &body[newline + 1..],
        None => body.trim_start_matches('`'),
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

// ========== STRICT ==========

#[derive(Debug, Deserialize)]
struct RawPlan {
    #[serde(default)]
    days: Option<Vec<RawDay>>,
    #[serde(default)]
    itinerary: Option<BTreeMap<String, RawDay>>,
    #[serde(default, alias = "total_estimated_distance", alias = "total_distance")]
    total_distance_km: Option<Value>,
    #[serde(default, alias = "route_summary")]
    summary: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDay {
    #[serde(default)]
    day: Option<Value>,
    #[serde(default, alias = "start", alias = "start_location")]
    start_name: Option<String>,
    #[serde(alias = "end", alias = "end_location", alias = "destination")]
    end_name: String,
    #[serde(default, alias = "lat")]
    latitude: Option<f64>,
    #[serde(default, alias = "lng", alias = "lon")]
    longitude: Option<f64>,
    #[serde(default)]
    coordinates: Option<RawCoordinates>,
    #[serde(default, alias = "overnight_location", alias = "accommodation")]
    overnight: Option<String>,
    #[serde(default)]
    highlights: Vec<Value>,
    #[serde(default, alias = "estimated_distance_km", alias = "distance")]
    distance_km: Option<Value>,
    #[serde(default)]
    distance_from_start_km: Option<Value>,
    #[serde(default, alias = "days_remaining_to_return")]
    days_remaining: Option<Value>,
    #[serde(default)]
    via: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCoordinates {
    Object {
        #[serde(alias = "latitude")]
        lat: f64,
        #[serde(alias = "lng", alias = "longitude")]
        lon: f64,
    },
    /// `[lat, lon]`
    Pair([f64; 2]),
}

impl RawDay {
    fn into_draft(self, fallback_day: u32) -> DraftDay {
        let coordinate = match (self.latitude, self.longitude, self.coordinates) {
            (Some(lat), Some(lon), _) => Some(Coordinate::new(lat, lon)),
            (_, _, Some(RawCoordinates::Object { lat, lon })) => Some(Coordinate::new(lat, lon)),
            (_, _, Some(RawCoordinates::Pair([lat, lon]))) => Some(Coordinate::new(lat, lon)),
            _ => None,
        }
        .filter(Coordinate::is_valid);

        DraftDay {
            day: self
                .day
                .as_ref()
                .and_then(value_u32)
                .filter(|day| *day > 0)
                .unwrap_or(fallback_day),
            start_name: self.start_name.map(|name| name.trim().to_string()),
            end_name: self.end_name.trim().to_string(),
            coordinate,
            overnight: self
                .overnight
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty()),
            highlights: self.highlights.iter().filter_map(value_text).collect(),
            distance_km: self.distance_km.as_ref().and_then(value_km),
            distance_from_start_km: self.distance_from_start_km.as_ref().and_then(value_km),
            days_remaining: self.days_remaining.as_ref().and_then(value_u32),
            via: self.via.iter().filter_map(value_via).collect(),
        }
    }
}

fn parse_strict(text: &str) -> Result<ItineraryDraft, String> {
    let body = strip_code_fence(text);
    let object = first_json_object(body).ok_or_else(|| "no balanced JSON object".to_string())?;
    let raw: RawPlan = serde_json::from_str(object).map_err(|err| err.to_string())?;

    let mut days: Vec<DraftDay> = match (raw.days, raw.itinerary) {
        (Some(days), _) => days
            .into_iter()
            .enumerate()
            .map(|(index, day)| day.into_draft(index as u32 + 1))
            .collect(),
        (None, Some(map)) => {
            let mut keyed: Vec<(u32, RawDay)> = map
                .into_iter()
                .filter_map(|(key, day)| day_number_from_key(&key).map(|n| (n, day)))
                .collect();
            keyed.sort_by_key(|(n, _)| *n);
            keyed
                .into_iter()
                .map(|(n, day)| day.into_draft(n))
                .collect()
        }
        (None, None) => return Err("missing `days` or `itinerary`".to_string()),
    };

    days.retain(|day| !day.end_name.is_empty());
    normalize_days(&mut days);

    Ok(ItineraryDraft {
        days,
        total_distance_km: raw.total_distance_km.as_ref().and_then(value_km),
        summary: raw.summary.filter(|s| !s.trim().is_empty()),
    })
}

/// First `{...}` with balanced braces, ignoring braces inside strings.
fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn day_number_from_key(key: &str) -> Option<u32> {
    let digits: String = key.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok().filter(|n| *n > 0)
}

fn value_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Distances arrive as numbers, `"45"`, `"45 km"` or `"28 miles"`.
fn value_km(value: &Value) -> Option<f64> {
    let km = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => distance_in_text(s).or_else(|| s.trim().parse().ok()),
        _ => None,
    }?;
    (km.is_finite() && km >= 0.0).then_some(km)
}

fn value_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Object(map) => map
            .get("name")
            .or_else(|| map.get("title"))
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())?,
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn value_via(value: &Value) -> Option<DraftVia> {
    match value {
        Value::String(name) => {
            let name = name.trim();
            (!name.is_empty()).then(|| DraftVia {
                name: name.to_string(),
                coordinate: None,
            })
        }
        Value::Object(map) => {
            let name = map.get("name").and_then(Value::as_str)?.trim().to_string();
            let lat = map
                .get("latitude")
                .or_else(|| map.get("lat"))
                .and_then(Value::as_f64);
            let lon = map
                .get("longitude")
                .or_else(|| map.get("lng"))
                .or_else(|| map.get("lon"))
                .and_then(Value::as_f64);
            let coordinate = match (lat, lon) {
                (Some(lat), Some(lon)) => Some(Coordinate::new(lat, lon)).filter(Coordinate::is_valid),
                _ => None,
            };
            (!name.is_empty()).then_some(DraftVia { name, coordinate })
        }
        _ => None,
    }
}

/// Sort by day and keep the first entry for each day number.
fn normalize_days(days: &mut Vec<DraftDay>) {
    days.sort_by_key(|day| day.day);
    days.dedup_by_key(|day| day.day);
}

// ========== HEADING FALLBACK ==========

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?im)^[ \t#*_>-]*day[ \t]+(\d{1,2})[*_]*[ \t]*(?:[:.)\x{2013}\x{2014}-](.*))?$",
        )
        .expect("day heading pattern is valid")
    })
}

fn distance_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(km|kilomet(?:er|re)s?|mi|miles?)\b")
            .expect("distance pattern is valid")
    })
}

fn labelled_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?im)^[ \t*_>-]*(end|destination|overnight|accommodation|highlights?)[*_]*[ \t]*:[*_]*[ \t]*(.+)$",
        )
        .expect("labelled line pattern is valid")
    })
}

/// First distance with a unit in `text`, in kilometres.
pub fn distance_in_text(text: &str) -> Option<f64> {
    let caps = distance_re().captures(text)?;
    let value: f64 = caps.get(1)?.as_str().parse().ok()?;
    let unit = caps.get(2)?.as_str().to_ascii_lowercase();
    Some(if unit.starts_with("mi") {
        value * KM_PER_MILE
    } else {
        value
    })
}

fn parse_headings(text: &str) -> ItineraryDraft {
    let headings: Vec<_> = heading_re().captures_iter(text).collect();
    let mut days = Vec::with_capacity(headings.len());

    for (position, caps) in headings.iter().enumerate() {
        let (Some(whole), Some(number)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let Ok(day) = number.as_str().parse::<u32>() else {
            continue;
        };
        if day == 0 {
            continue;
        }
        let title = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        let body_end = headings
            .get(position + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(text.len());
        let body = &text[whole.end()..body_end];

        match recover_day(day, title, body) {
            Some(draft) => days.push(draft),
            None => debug!(day, "heading found but name or distance missing"),
        }
    }

    normalize_days(&mut days);
    ItineraryDraft {
        days,
        total_distance_km: None,
        summary: None,
    }
}

fn recover_day(day: u32, title: &str, body: &str) -> Option<DraftDay> {
    let title = clean_markup(title);
    let mut end_label = None;
    let mut overnight = None;
    let mut highlights = Vec::new();

    for caps in labelled_line_re().captures_iter(body) {
        let (Some(label), Some(value)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let value = clean_markup(value.as_str());
        if value.is_empty() {
            continue;
        }
        match label.as_str().to_ascii_lowercase().as_str() {
            "end" | "destination" => {
                end_label.get_or_insert(value);
            }
            "overnight" | "accommodation" => {
                overnight.get_or_insert(value);
            }
            _ => highlights.extend(
                value
                    .split([',', ';'])
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            ),
        }
    }

    let (start_name, title_name) = split_title(&title);
    let end_name = match title_name {
        Some(name) if start_name.is_some() => Some(name),
        other => end_label.or(other),
    }?;
    let distance_km = distance_in_text(&title).or_else(|| distance_in_text(body))?;

    Some(DraftDay {
        day,
        start_name,
        end_name,
        coordinate: None,
        overnight,
        highlights,
        distance_km: Some(distance_km),
        distance_from_start_km: None,
        days_remaining: None,
        via: Vec::new(),
    })
}

/// `"Boulder to Lyons (45 km)"` gives `(Some("Boulder"), Some("Lyons"))`.
/// The start is only `Some` for the `A to B` form.
fn split_title(title: &str) -> (Option<String>, Option<String>) {
    let mut head = title;
    for separator in ["(", " \u{2014} ", " \u{2013} ", " - ", " | "] {
        if let Some(index) = head.find(separator) {
            head = &head[..index];
        }
    }
    if let Some(distance) = distance_re().find(head) {
        head = &head[..distance.start()];
    }
    let head = head.trim().trim_end_matches([',', '.', ':', '-']).trim();

    let lower = head.to_lowercase();
    let name = |s: &str| {
        let s = s.trim();
        (!s.is_empty() && !s.chars().all(|c| c.is_ascii_digit() || c == '.' || c.is_whitespace()))
            .then(|| s.to_string())
    };
    match lower.rfind(" to ") {
        Some(index) => (name(&head[..index]), name(&head[index + 4..])),
        None => (None, name(head)),
    }
}

fn clean_markup(text: &str) -> String {
    text.replace(['*', '`'], "")
        .trim_matches(|c: char| c.is_whitespace() || c == '_' || c == '#')
        .to_string()
}

// ========== ASSEMBLY ==========

/// Turn a draft into a [`StructuredItinerary`] for `request`.
///
/// Requires a destination for every day `1..=nights + 1`. The final
/// destination is named after the request's end location; for closed loops
/// it also takes the start coordinate.
pub fn assemble(
    draft: ItineraryDraft,
    request: &TourRequest,
    start: Option<Coordinate>,
) -> Result<StructuredItinerary, PlanError> {
    let expected = request.days();
    let mut days = draft.days;
    normalize_days(&mut days);

    let extra = days.iter().filter(|day| day.day > expected).count();
    if extra > 0 {
        warn!(extra, expected, "model returned more days than requested, truncating");
    }
    days.retain(|day| day.day <= expected);

    if days.len() < expected as usize {
        return Err(PlanError::ItineraryIncomplete {
            expected: expected as usize,
            found: days.len(),
        });
    }

    let is_loop = request.is_closed_loop();
    let average_daily_km = request.preferences.daily_distance.average_km();

    let mut waypoints = vec![Waypoint {
        name: request.start.clone(),
        coordinate: start,
        role: WaypointRole::Start,
        day: 0,
    }];
    let mut plans = Vec::with_capacity(days.len());
    let mut origin = 0usize;

    for draft_day in days {
        let is_last = draft_day.day == expected;

        for via in draft_day.via {
            waypoints.push(Waypoint {
                name: via.name,
                coordinate: via.coordinate,
                role: WaypointRole::Via,
                day: draft_day.day,
            });
        }

        let (name, coordinate, role) = if is_last {
            let coordinate = if is_loop {
                start.or(draft_day.coordinate)
            } else {
                draft_day.coordinate
            };
            (request.end.clone(), coordinate, WaypointRole::End)
        } else {
            (draft_day.end_name, draft_day.coordinate, WaypointRole::Overnight)
        };

        let origin_coordinate = waypoints[origin].coordinate;
        waypoints.push(Waypoint {
            name,
            coordinate,
            role,
            day: draft_day.day,
        });
        let destination = waypoints.len() - 1;

        let distance_km = draft_day.distance_km.unwrap_or_else(|| {
            let estimate = match (origin_coordinate, coordinate) {
                (Some(a), Some(b)) => haversine_km(a, b) * ROAD_DISTANCE_FACTOR,
                _ => average_daily_km,
            };
            debug!(day = draft_day.day, estimate, "no planned distance, estimating");
            estimate
        });

        plans.push(DayPlan {
            day: draft_day.day,
            origin,
            destination,
            distance_km,
            highlights: draft_day.highlights,
            accommodation: if is_last { None } else { draft_day.overnight },
            claimed_distance_from_start_km: draft_day.distance_from_start_km,
        });
        origin = destination;
    }

    let total_distance_km = plans.iter().map(|plan| plan.distance_km).sum();

    Ok(StructuredItinerary {
        days: plans,
        waypoints,
        total_distance_km,
        summary: draft.summary,
    })
}
