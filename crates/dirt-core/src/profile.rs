//! Rider profiles stored as YAML, and tire-based surface classification.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::error::PlanError;
use crate::models::{
    AccommodationStyle, BudgetTier, DailyDistance, FitnessLevel, TerrainPreference,
    TripPreferences, DEFAULT_TIRE_PROFILE,
};

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("failed to access profile {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in profile: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("profile missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("invalid profile: {0}")]
    Invalid(#[from] PlanError),
}

/// Profile as written on disk; everything optional so missing fields can be
/// reported together.
#[derive(Debug, Deserialize)]
struct ProfileFile {
    accommodation: Option<AccommodationStyle>,
    stealth_camping: Option<bool>,
    fitness_level: Option<FitnessLevel>,
    daily_distance: Option<DailyDistance>,
    terrain: Option<TerrainPreference>,
    budget: Option<BudgetTier>,
    #[serde(alias = "tire_size")]
    tire_profile: Option<String>,
    #[serde(alias = "interests")]
    desires: Option<Vec<String>>,
    departure_date: Option<NaiveDate>,
}

/// Preferences written when a rider has no profile yet.
pub fn default_profile() -> TripPreferences {
    TripPreferences {
        desires: vec!["nature".to_string(), "adventure".to_string()],
        ..TripPreferences::default()
    }
}

/// Parse profile YAML. `accommodation`, `fitness_level`, `terrain` and
/// `budget` are required; the daily band defaults from the fitness level.
pub fn parse_profile(yaml: &str) -> Result<TripPreferences, ProfileError> {
    let file: ProfileFile = serde_yaml::from_str(yaml)?;

    let mut missing = Vec::new();
    if file.accommodation.is_none() {
        missing.push("accommodation");
    }
    if file.fitness_level.is_none() {
        missing.push("fitness_level");
    }
    if file.terrain.is_none() {
        missing.push("terrain");
    }
    if file.budget.is_none() {
        missing.push("budget");
    }
    let (Some(accommodation), Some(fitness_level), Some(terrain), Some(budget)) =
        (file.accommodation, file.fitness_level, file.terrain, file.budget)
    else {
        return Err(ProfileError::MissingFields(missing));
    };

    let preferences = TripPreferences {
        accommodation,
        stealth_camping: file.stealth_camping.unwrap_or(false),
        fitness_level,
        terrain,
        daily_distance: file
            .daily_distance
            .unwrap_or_else(|| fitness_level.default_daily_distance()),
        budget,
        tire_profile: file
            .tire_profile
            .unwrap_or_else(|| DEFAULT_TIRE_PROFILE.to_string()),
        desires: file.desires.unwrap_or_default(),
        departure_date: file.departure_date,
    };
    Ok(preferences.normalized()?)
}

pub fn load_profile(path: &Path) -> Result<TripPreferences, ProfileError> {
    let yaml = fs::read_to_string(path).map_err(|source| ProfileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_profile(&yaml)
}

/// Load `path`, writing [`default_profile`] there first when it does not
/// exist. The flag is true when the file was created.
pub fn load_or_create_profile(path: &Path) -> Result<(TripPreferences, bool), ProfileError> {
    if path.exists() {
        return Ok((load_profile(path)?, false));
    }
    let preferences = default_profile();
    save_profile(path, &preferences)?;
    info!(path = %path.display(), "created default profile");
    Ok((preferences, true))
}

pub fn save_profile(path: &Path, preferences: &TripPreferences) -> Result<(), ProfileError> {
    let io_err = |source| ProfileError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, render_profile(preferences)?).map_err(io_err)
}

/// Commented YAML that [`parse_profile`] reads back unchanged.
pub fn render_profile(preferences: &TripPreferences) -> Result<String, ProfileError> {
    let scalar = |value: &str| -> Result<String, ProfileError> {
        Ok(serde_yaml::to_string(value)?.trim_end().to_string())
    };
    let desires = if preferences.desires.is_empty() {
        " []".to_string()
    } else {
        format!("\n{}", serde_yaml::to_string(&preferences.desires)?.trim_end())
    };
    let departure = match preferences.departure_date {
        Some(date) => format!("\n# Planned departure (YYYY-MM-DD)\ndeparture_date: {}\n", date),
        None => String::new(),
    };

    Ok(format!(
        "# DirtGenie Profile
# Edit this file to customize your default trip preferences

# Accommodation preference: camping, hotels, or mixed
accommodation: {accommodation}

# Allow stealth/wild camping: true or false
stealth_camping: {stealth}

# Fitness level: beginner, intermediate, or advanced
fitness_level: {fitness}

# Daily distance preference in km (e.g., \"30-50\", \"50-80\", \"80-120\")
daily_distance: {distance}

# Terrain preference: paved, gravel, mixed, or challenging
terrain: {terrain}

# Tire size (e.g., \"700x35c\", \"650b x 2.25in\", '29\" x 2.1in')
tire_size: {tire}

# Budget range: budget, moderate, or luxury
budget: {budget}

# Special interests (list of keywords)
interests:{desires}
{departure}",
        accommodation = preferences.accommodation,
        stealth = preferences.stealth_camping,
        fitness = preferences.fitness_level,
        distance = scalar(&preferences.daily_distance.to_string())?,
        terrain = preferences.terrain,
        tire = scalar(&preferences.tire_profile)?,
        budget = preferences.budget,
        desires = desires,
        departure = departure,
    ))
}

// ========== TIRES ==========

/// Surface capability implied by a tire profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TireClass {
    Road,
    Gravel,
    Mountain,
}

fn inch_width_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[123]\.\d{1,2}").expect("inch width pattern is valid"))
}

fn mm_width_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:[x×]\s*(\d{2})\s*(?:mm|c)?\b|\b(\d{2})\s*(?:mm|c)\b)")
            .expect("width pattern is valid")
    })
}

/// Classify a free-text tire profile such as `700x25c`, `650b x 47mm` or
/// `29" x 2.25in`. Unrecognized text counts as gravel.
pub fn classify_tire(profile: &str) -> TireClass {
    let text = profile.to_lowercase();

    let inch_width = inch_width_re()
        .find_iter(&text)
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .any(|width| (1.9..=3.0).contains(&width));
    if inch_width || text.contains("mountain") || text.contains("mtb") {
        return TireClass::Mountain;
    }

    let width_mm = mm_width_re().captures_iter(&text).find_map(|caps| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .filter(|w| (18..=75).contains(w))
    });
    match width_mm {
        Some(width) if width <= 28 => TireClass::Road,
        Some(width) if width >= 50 => TireClass::Mountain,
        _ => TireClass::Gravel,
    }
}

impl TireClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            TireClass::Road => "road",
            TireClass::Gravel => "gravel",
            TireClass::Mountain => "mountain",
        }
    }

    /// Routing guidance for the planning prompt.
    pub fn surface_guidance(&self) -> &'static str {
        match self {
            TireClass::Road => {
                "Narrow road tires: prioritize paved roads, well-maintained bike paths and only light, hard-packed gravel."
            }
            TireClass::Gravel => {
                "Gravel tires: mixed terrain is fine, including paved roads, gravel roads and light trails. Avoid technical singletrack."
            }
            TireClass::Mountain => {
                "Mountain bike tires: rough gravel, dirt roads, singletrack and rougher terrain are all suitable."
            }
        }
    }
}
