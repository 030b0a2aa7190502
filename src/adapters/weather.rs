//! Current-weather adapter (OpenWeatherMap-shaped provider).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::ProviderConfig;
use crate::error::UpstreamError;

use super::geocode::{City, CityResolver};
use super::http::ProviderClient;
use super::{CityQuery, SourceAdapter};

pub struct WeatherAdapter {
    client: Arc<ProviderClient>,
    base_url: String,
    api_key: Option<String>,
    resolver: Arc<CityResolver>,
}

impl WeatherAdapter {
    pub fn new(
        config: &ProviderConfig,
        client: Arc<ProviderClient>,
        resolver: Arc<CityResolver>,
    ) -> Self {
        Self {
            client,
            base_url: config.weather_base_url.trim_end_matches('/').to_string(),
            api_key: config.weather_api_key.clone(),
            resolver,
        }
    }
}

#[async_trait]
impl SourceAdapter for WeatherAdapter {
    fn name(&self) -> &'static str {
        "weather"
    }

    async fn call(&self, query: &CityQuery) -> Result<Value, UpstreamError> {
        let city = self
            .resolver
            .resolve(&query.city, query.country.as_deref())?;

        let api_key = self.api_key.as_deref().ok_or_else(|| {
            UpstreamError::invalid_input("weather provider API key is not configured")
        })?;

        let raw = self
            .client
            .get_json(
                &format!("{}/weather", self.base_url),
                &[
                    ("q", format!("{},{}", city.name, city.country_code)),
                    ("appid", api_key.to_string()),
                    ("units", "metric".to_string()),
                ],
                &[],
            )
            .await?;

        normalize_payload(city, &raw)
    }
}

fn normalize_payload(city: &City, raw: &Value) -> Result<Value, UpstreamError> {
    let main = raw
        .get("main")
        .ok_or_else(|| malformed("missing 'main'"))?;
    let temperature_c = require_f64(main, "temp")?;
    let feels_like_c = require_f64(main, "feels_like")?;
    let humidity = require_f64(main, "humidity")?;
    let pressure = require_f64(main, "pressure")?;

    let description = raw
        .get("weather")
        .and_then(|w| w.get(0))
        .and_then(|w| w.get("description"))
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("missing 'weather[0].description'"))?;

    let wind = raw.get("wind").cloned().unwrap_or_else(|| json!({}));
    let wind_speed_ms = wind.get("speed").and_then(Value::as_f64).unwrap_or(0.0);
    let wind_direction_deg = wind.get("deg").and_then(Value::as_f64);
    let visibility_m = raw.get("visibility").and_then(Value::as_f64);

    Ok(json!({
        "city": city.name,
        "country": city.country,
        "temperature_c": temperature_c,
        "feels_like_c": feels_like_c,
        "humidity": humidity,
        "pressure_hpa": pressure,
        "description": description,
        "wind_speed_ms": wind_speed_ms,
        "wind_direction_deg": wind_direction_deg,
        "visibility_m": visibility_m,
    }))
}

fn require_f64(value: &Value, field: &str) -> Result<f64, UpstreamError> {
    value
        .get(field)
        .and_then(Value::as_f64)
        .ok_or_else(|| malformed(&format!("missing '{}'", field)))
}

fn malformed(detail: &str) -> UpstreamError {
    UpstreamError::unavailable(format!("malformed weather payload: {}", detail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpstreamErrorKind;

    fn tokyo() -> &'static City {
        CityResolver::new(0.85).resolve("Tokyo", None).unwrap()
    }

    fn provider_payload() -> Value {
        json!({
            "name": "Tokyo",
            "sys": {"country": "JP"},
            "main": {"temp": 21.5, "feels_like": 22.0, "humidity": 65, "pressure": 1013},
            "weather": [{"description": "scattered clouds"}],
            "wind": {"speed": 3.2, "deg": 180},
            "visibility": 10000
        })
    }

    #[test]
    fn normalizes_provider_payload() {
        let payload = normalize_payload(tokyo(), &provider_payload()).unwrap();
        assert_eq!(payload["city"], "Tokyo");
        assert_eq!(payload["country"], "Japan");
        assert_eq!(payload["temperature_c"], 21.5);
        assert_eq!(payload["description"], "scattered clouds");
        assert_eq!(payload["wind_direction_deg"], 180.0);
        assert_eq!(payload["visibility_m"], 10000.0);
    }

    #[test]
    fn optional_wind_fields_degrade_gracefully() {
        let mut raw = provider_payload();
        raw.as_object_mut().unwrap().remove("wind");
        raw.as_object_mut().unwrap().remove("visibility");

        let payload = normalize_payload(tokyo(), &raw).unwrap();
        assert_eq!(payload["wind_speed_ms"], 0.0);
        assert!(payload["wind_direction_deg"].is_null());
        assert!(payload["visibility_m"].is_null());
    }

    #[test]
    fn missing_core_fields_are_malformed() {
        let err = normalize_payload(tokyo(), &json!({"weather": []})).unwrap_err();
        assert_eq!(err.kind, UpstreamErrorKind::Unavailable);

        let mut raw = provider_payload();
        raw["main"].as_object_mut().unwrap().remove("temp");
        assert!(normalize_payload(tokyo(), &raw).is_err());
    }

    #[tokio::test]
    async fn missing_api_key_fails_before_any_network_call() {
        let config = ProviderConfig::default();
        let client = Arc::new(ProviderClient::new(&config).unwrap());
        let adapter = WeatherAdapter::new(&config, client, Arc::new(CityResolver::new(0.85)));

        let query = CityQuery {
            city: "Tokyo".to_string(),
            country: None,
        };
        let err = adapter.call(&query).await.unwrap_err();
        assert_eq!(err.kind, UpstreamErrorKind::InvalidInput);
        assert!(!err.retryable());
    }
}
