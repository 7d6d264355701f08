//! Pipeline configuration and per-request credentials from environment.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// How the route stitcher talks to the directions service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StitchMode {
    /// One ordered multi-waypoint request (split when over the waypoint limit).
    Batched,
    /// One request per consecutive waypoint pair, run concurrently.
    PerLeg,
}

impl FromStr for StitchMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "batched" | "batch" => Ok(StitchMode::Batched),
            "per-leg" | "leg" | "legs" => Ok(StitchMode::PerLeg),
            other => Err(format!("unknown stitch mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub model: String,
    pub llm_base_url: String,
    pub maps_base_url: String,
    pub llm_timeout: Duration,
    pub directions_timeout: Duration,
    /// Retries for transient model API errors (429/5xx/network).
    pub llm_max_retries: u32,
    /// Retries for transient directions errors.
    pub directions_max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub stitch_mode: StitchMode,
    /// Upper bound on in-flight per-leg directions requests.
    pub leg_concurrency: usize,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Relative slack when re-checking loop overnights.
    pub constraint_tolerance: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            llm_base_url: "https://api.openai.com".to_string(),
            maps_base_url: dirt_maps::DEFAULT_BASE_URL.to_string(),
            llm_timeout: Duration::from_secs(120),
            directions_timeout: Duration::from_secs(20),
            llm_max_retries: 3,
            directions_max_retries: 3,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(8),
            stitch_mode: StitchMode::Batched,
            leg_concurrency: 4,
            temperature: 0.7,
            max_tokens: 4000,
            constraint_tolerance: dirt_core::DEFAULT_TOLERANCE,
        }
    }
}

fn parse_env<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            model: env::var("DIRTGENIE_MODEL").unwrap_or(defaults.model),
            llm_base_url: env::var("DIRTGENIE_LLM_BASE_URL").unwrap_or(defaults.llm_base_url),
            maps_base_url: env::var("DIRTGENIE_MAPS_BASE_URL").unwrap_or(defaults.maps_base_url),
            llm_timeout: parse_env("DIRTGENIE_LLM_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.llm_timeout),
            directions_timeout: parse_env("DIRTGENIE_DIRECTIONS_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.directions_timeout),
            llm_max_retries: parse_env("DIRTGENIE_LLM_MAX_RETRIES")
                .unwrap_or(defaults.llm_max_retries),
            directions_max_retries: parse_env("DIRTGENIE_DIRECTIONS_MAX_RETRIES")
                .unwrap_or(defaults.directions_max_retries),
            backoff_base: parse_env("DIRTGENIE_BACKOFF_BASE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff_base),
            backoff_max: parse_env("DIRTGENIE_BACKOFF_MAX_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff_max),
            stitch_mode: parse_env("DIRTGENIE_STITCH_MODE").unwrap_or(defaults.stitch_mode),
            leg_concurrency: parse_env::<usize>("DIRTGENIE_LEG_CONCURRENCY")
                .map(|n| n.max(1))
                .unwrap_or(defaults.leg_concurrency),
            temperature: parse_env("DIRTGENIE_TEMPERATURE").unwrap_or(defaults.temperature),
            max_tokens: parse_env("DIRTGENIE_MAX_TOKENS").unwrap_or(defaults.max_tokens),
            constraint_tolerance: parse_env("DIRTGENIE_CONSTRAINT_TOLERANCE")
                .unwrap_or(defaults.constraint_tolerance),
        }
    }
}

/// API keys for one planning request. Never stored process-wide.
#[derive(Clone, Default)]
pub struct Credentials {
    pub openai_api_key: String,
    pub google_maps_api_key: String,
}

impl Credentials {
    pub fn new(openai_api_key: impl Into<String>, google_maps_api_key: impl Into<String>) -> Self {
        Self {
            openai_api_key: openai_api_key.into().trim().to_string(),
            google_maps_api_key: google_maps_api_key.into().trim().to_string(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            env::var("OPENAI_API_KEY").unwrap_or_default(),
            env::var("GOOGLE_MAPS_API_KEY").unwrap_or_default(),
        )
    }

    /// Names of the keys that are not set.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.openai_api_key.is_empty() {
            missing.push("OPENAI_API_KEY");
        }
        if self.google_maps_api_key.is_empty() {
            missing.push("GOOGLE_MAPS_API_KEY");
        }
        missing
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |key: &str| if key.is_empty() { "<unset>" } else { "<redacted>" };
        f.debug_struct("Credentials")
            .field("openai_api_key", &mask(&self.openai_api_key))
            .field("google_maps_api_key", &mask(&self.google_maps_api_key))
            .finish()
    }
}
