//! External source adapters.
//!
//! One adapter per data provider (weather, time zone, city facts, itinerary
//! generation). Each adapter normalizes its provider's network call into a
//! uniform request/response shape: it accepts a [`CityQuery`] and returns a
//! provider-independent JSON payload, failing with
//! [`UpstreamError`](crate::error::UpstreamError).
//!
//! Retry/backoff and timeouts live in the shared [`http`] plumbing;
//! city-name resolution in [`geocode`].

pub mod facts;
pub mod geocode;
pub mod http;
pub mod plan_visit;
pub mod time;
pub mod weather;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{ToolError, UpstreamError};

pub use facts::FactsAdapter;
pub use geocode::{City, CityResolver};
pub use http::ProviderClient;
pub use plan_visit::PlanVisitAdapter;
pub use time::TimeAdapter;
pub use weather::WeatherAdapter;

/// Validated tool arguments shared by every adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CityQuery {
    pub city: String,
    pub country: Option<String>,
}

impl CityQuery {
    /// Parse and validate a raw arguments object.
    pub fn from_arguments(arguments: &Value) -> Result<Self, ToolError> {
        let city = arguments
            .get("city")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments {
                message: "'city' must be a non-empty string".to_string(),
            })?;

        let country = arguments
            .get("country")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(Self {
            city: city.to_string(),
            country,
        })
    }

    /// Canonical arguments object, used for cache-key construction so that
    /// direct invocations and composite sub-calls share entries.
    pub fn as_arguments(&self) -> Value {
        json!({"city": self.city, "country": self.country})
    }
}

/// A normalized external data source.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Provider name for logs and trace events.
    fn name(&self) -> &'static str;

    /// Perform the provider call and return the normalized payload.
    async fn call(&self, query: &CityQuery) -> Result<Value, UpstreamError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_requires_a_city() {
        assert!(CityQuery::from_arguments(&json!({})).is_err());
        assert!(CityQuery::from_arguments(&json!({"city": ""})).is_err());
        assert!(CityQuery::from_arguments(&json!({"city": "   "})).is_err());
        assert!(CityQuery::from_arguments(&json!({"city": 42})).is_err());
    }

    #[test]
    fn query_trims_and_keeps_country() {
        let q = CityQuery::from_arguments(&json!({"city": " Tokyo ", "country": "JP"})).unwrap();
        assert_eq!(q.city, "Tokyo");
        assert_eq!(q.country.as_deref(), Some("JP"));

        let q = CityQuery::from_arguments(&json!({"city": "Tokyo", "country": ""})).unwrap();
        assert!(q.country.is_none());
    }

    #[test]
    fn canonical_arguments_preserve_city_and_country() {
        let q = CityQuery {
            city: "Paris".to_string(),
            country: None,
        };
        assert_eq!(q.as_arguments(), json!({"city": "Paris", "country": null}));
    }
}
