//! Configuration management for the city assistant core.
//!
//! Configuration can be set via environment variables:
//! - `OPENWEATHER_API_KEY` - Optional. API key for the weather provider.
//! - `WEATHER_BASE_URL` - Optional. Weather provider endpoint. Defaults to
//!   `https://api.openweathermap.org/data/2.5`.
//! - `TIME_BASE_URL` - Optional. Time provider endpoint. Defaults to
//!   `https://worldtimeapi.org/api`.
//! - `GEODB_API_KEY` - Optional. API key for the city facts provider.
//! - `FACTS_BASE_URL` - Optional. Facts provider endpoint. Defaults to
//!   `https://wft-geo-db.p.rapidapi.com`.
//! - `REDIS_URL` - Optional. Shared cache store URL. Without it the
//!   in-memory store is used.
//! - `CACHE_ENABLED` - Optional. Defaults to `true`.
//! - `HTTP_TIMEOUT_SECS` - Optional. Per-attempt provider timeout. Defaults to `10`.
//! - `HTTP_MAX_ATTEMPTS` - Optional. Retry budget per provider call. Defaults to `3`.
//! - `CITY_MATCH_THRESHOLD` - Optional. Fuzzy city-match threshold in
//!   `0.0..=1.0`. Defaults to `0.85`.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// External provider configuration.
///
/// Base URLs are overridable so tests and local development can point the
/// adapters at stub servers. Credentials are opaque to the core.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Weather provider endpoint
    pub weather_base_url: String,

    /// Weather provider API key
    pub weather_api_key: Option<String>,

    /// Time provider endpoint
    pub time_base_url: String,

    /// City facts provider endpoint
    pub facts_base_url: String,

    /// City facts provider API key
    pub facts_api_key: Option<String>,

    /// Per-attempt timeout for provider calls
    pub request_timeout: Duration,

    /// Attempt budget per provider call (first try included)
    pub max_attempts: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            weather_base_url: "https://api.openweathermap.org/data/2.5".to_string(),
            weather_api_key: None,
            time_base_url: "https://worldtimeapi.org/api".to_string(),
            facts_base_url: "https://wft-geo-db.p.rapidapi.com".to_string(),
            facts_api_key: None,
            request_timeout: Duration::from_secs(10),
            max_attempts: 3,
        }
    }
}

/// Cache store configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Redis/Valkey URL for the shared store; `None` selects the
    /// in-memory store
    pub redis_url: Option<String>,

    /// Master switch; when false every read is a miss and every write a no-op
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            enabled: true,
        }
    }
}

/// Core configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// External provider endpoints and credentials
    pub providers: ProviderConfig,

    /// Cache store settings
    pub cache: CacheConfig,

    /// Minimum Jaro-Winkler similarity for fuzzy city resolution
    pub city_match_threshold: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            providers: ProviderConfig::default(),
            cache: CacheConfig::default(),
            city_match_threshold: 0.85,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let weather_base_url =
            std::env::var("WEATHER_BASE_URL").unwrap_or(defaults.providers.weather_base_url);
        let time_base_url =
            std::env::var("TIME_BASE_URL").unwrap_or(defaults.providers.time_base_url);
        let facts_base_url =
            std::env::var("FACTS_BASE_URL").unwrap_or(defaults.providers.facts_base_url);

        let request_timeout = std::env::var("HTTP_TIMEOUT_SECS")
            .ok()
            .map(|v| {
                v.parse::<u64>().map_err(|e| {
                    ConfigError::InvalidValue("HTTP_TIMEOUT_SECS".to_string(), format!("{}", e))
                })
            })
            .transpose()?
            .map(Duration::from_secs)
            .unwrap_or(defaults.providers.request_timeout);

        let max_attempts = std::env::var("HTTP_MAX_ATTEMPTS")
            .ok()
            .map(|v| {
                v.parse::<u32>().map_err(|e| {
                    ConfigError::InvalidValue("HTTP_MAX_ATTEMPTS".to_string(), format!("{}", e))
                })
            })
            .transpose()?
            .unwrap_or(defaults.providers.max_attempts);

        if max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "HTTP_MAX_ATTEMPTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let enabled = std::env::var("CACHE_ENABLED")
            .ok()
            .map(|v| {
                parse_bool(&v)
                    .map_err(|e| ConfigError::InvalidValue("CACHE_ENABLED".to_string(), e))
            })
            .transpose()?
            .unwrap_or(true);

        let city_match_threshold = std::env::var("CITY_MATCH_THRESHOLD")
            .ok()
            .map(|v| {
                v.parse::<f64>().map_err(|e| {
                    ConfigError::InvalidValue("CITY_MATCH_THRESHOLD".to_string(), format!("{}", e))
                })
            })
            .transpose()?
            .unwrap_or(defaults.city_match_threshold);

        if !(0.0..=1.0).contains(&city_match_threshold) {
            return Err(ConfigError::InvalidValue(
                "CITY_MATCH_THRESHOLD".to_string(),
                format!("expected a value in 0.0..=1.0, got {}", city_match_threshold),
            ));
        }

        Ok(Self {
            providers: ProviderConfig {
                weather_base_url,
                weather_api_key: std::env::var("OPENWEATHER_API_KEY").ok(),
                time_base_url,
                facts_base_url,
                facts_api_key: std::env::var("GEODB_API_KEY").ok(),
                request_timeout,
                max_attempts,
            },
            cache: CacheConfig {
                redis_url: std::env::var("REDIS_URL").ok(),
                enabled,
            },
            city_match_threshold,
        })
    }
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Ok(false),
        other => Err(format!("expected boolean-like value, got: {}", other)),
    }
}
