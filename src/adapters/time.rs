//! Local-time adapter (WorldTimeAPI-shaped provider).
//!
//! The provider is keyed by IANA time zone, so the call resolves the city
//! to its zone first and queries `/timezone/{zone}`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::ProviderConfig;
use crate::error::UpstreamError;

use super::geocode::{City, CityResolver};
use super::http::ProviderClient;
use super::{CityQuery, SourceAdapter};

pub struct TimeAdapter {
    client: Arc<ProviderClient>,
    base_url: String,
    resolver: Arc<CityResolver>,
}

impl TimeAdapter {
    pub fn new(
        config: &ProviderConfig,
        client: Arc<ProviderClient>,
        resolver: Arc<CityResolver>,
    ) -> Self {
        Self {
            client,
            base_url: config.time_base_url.trim_end_matches('/').to_string(),
            resolver,
        }
    }
}

#[async_trait]
impl SourceAdapter for TimeAdapter {
    fn name(&self) -> &'static str {
        "time"
    }

    async fn call(&self, query: &CityQuery) -> Result<Value, UpstreamError> {
        let city = self
            .resolver
            .resolve(&query.city, query.country.as_deref())?;

        let raw = self
            .client
            .get_json(
                &format!("{}/timezone/{}", self.base_url, city.timezone),
                &[],
                &[],
            )
            .await?;

        normalize_payload(city, &raw)
    }
}

fn normalize_payload(city: &City, raw: &Value) -> Result<Value, UpstreamError> {
    let datetime = raw
        .get("datetime")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("missing 'datetime'"))?;

    // "2024-05-01T14:03:21.123456+09:00" -> "2024-05-01 14:03:21"
    let current_time = datetime
        .split('.')
        .next()
        .unwrap_or(datetime)
        .replacen('T', " ", 1);

    let utc_offset = raw
        .get("utc_offset")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("missing 'utc_offset'"))?;

    let is_dst = raw.get("dst").and_then(Value::as_bool).unwrap_or(false);

    let timezone = raw
        .get("timezone")
        .and_then(Value::as_str)
        .unwrap_or(city.timezone);

    Ok(json!({
        "city": city.name,
        "timezone": timezone,
        "current_time": current_time,
        "utc_offset": utc_offset,
        "is_dst": is_dst,
    }))
}

fn malformed(detail: &str) -> UpstreamError {
    UpstreamError::unavailable(format!("malformed time payload: {}", detail))
}
