//! City-facts adapter (GeoDB-shaped provider).
//!
//! Without a provider API key, or when the provider returns no candidates,
//! the adapter serves the gazetteer's own data (coordinates, country, time
//! zone) so the tool still answers, just without population or region.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use crate::cache::key::fold;
use crate::config::ProviderConfig;
use crate::error::UpstreamError;

use super::geocode::{City, CityResolver};
use super::http::ProviderClient;
use super::{CityQuery, SourceAdapter};

pub struct FactsAdapter {
    client: Arc<ProviderClient>,
    base_url: String,
    api_key: Option<String>,
    resolver: Arc<CityResolver>,
}

impl FactsAdapter {
    pub fn new(
        config: &ProviderConfig,
        client: Arc<ProviderClient>,
        resolver: Arc<CityResolver>,
    ) -> Self {
        Self {
            client,
            base_url: config.facts_base_url.trim_end_matches('/').to_string(),
            api_key: config.facts_api_key.clone(),
            resolver,
        }
    }

    fn provider_host(&self) -> &str {
        self.base_url
            .trim_start_matches("https://")
            .trim_start_matches("http://")
    }
}

#[async_trait]
impl SourceAdapter for FactsAdapter {
    fn name(&self) -> &'static str {
        "facts"
    }

    async fn call(&self, query: &CityQuery) -> Result<Value, UpstreamError> {
        let city = self
            .resolver
            .resolve(&query.city, query.country.as_deref())?;

        let api_key = match self.api_key.as_deref() {
            Some(key) => key,
            None => return Ok(gazetteer_payload(city)),
        };

        let raw = self
            .client
            .get_json(
                &format!("{}/v1/geo/cities", self.base_url),
                &[
                    ("namePrefix", city.name.to_string()),
                    ("limit", "5".to_string()),
                    ("sort", "-population".to_string()),
                ],
                &[
                    ("X-RapidAPI-Key", api_key.to_string()),
                    ("X-RapidAPI-Host", self.provider_host().to_string()),
                ],
            )
            .await?;

        match best_candidate(city, &raw) {
            Some(candidate) => Ok(normalize_payload(city, candidate)),
            None => {
                warn!(city = city.name, "facts provider returned no candidates, serving gazetteer data");
                Ok(gazetteer_payload(city))
            }
        }
    }
}

/// Pick the candidate whose folded name matches the resolved city; the
/// provider sorts by population, so the first entry is the fallback.
fn best_candidate<'a>(city: &City, raw: &'a Value) -> Option<&'a Value> {
    let data = raw.get("data")?.as_array()?;
    data.iter()
        .find(|c| {
            c.get("name")
                .and_then(Value::as_str)
                .map(|n| fold(n) == fold(city.name))
                .unwrap_or(false)
        })
        .or_else(|| data.first())
}

fn normalize_payload(city: &City, candidate: &Value) -> Value {
    json!({
        "city": city.name,
        "country": candidate.get("country").and_then(Value::as_str).unwrap_or(city.country),
        "population": candidate.get("population").and_then(Value::as_u64),
        "region": candidate.get("region").and_then(Value::as_str),
        "latitude": candidate.get("latitude").and_then(Value::as_f64).unwrap_or(city.latitude),
        "longitude": candidate.get("longitude").and_then(Value::as_f64).unwrap_or(city.longitude),
        "elevation": candidate.get("elevationMeters").and_then(Value::as_i64),
        "timezone": city.timezone,
    })
}

fn gazetteer_payload(city: &City) -> Value {
    json!({
        "city": city.name,
        "country": city.country,
        "population": null,
        "region": null,
        "latitude": city.latitude,
        "longitude": city.longitude,
        "elevation": null,
        "timezone": city.timezone,
    })
}
