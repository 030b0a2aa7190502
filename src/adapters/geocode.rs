//! City-name resolution.
//!
//! Providers want canonical names, country codes, coordinates or IANA time
//! zones, while callers type whatever they remember. Resolution runs against
//! an in-memory gazetteer of major cities: a case- and diacritic-insensitive
//! exact match first, then a Jaro-Winkler fuzzy match above a configurable
//! threshold. No match is a non-retryable `NotFound`.

use strsim::jaro_winkler;

use crate::cache::key::fold;
use crate::error::UpstreamError;

/// A gazetteer entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct City {
    pub name: &'static str,
    pub country: &'static str,
    pub country_code: &'static str,
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: &'static str,
}

#[rustfmt::skip]
static GAZETTEER: &[City] = &[
    City { name: "London", country: "United Kingdom", country_code: "GB", latitude: 51.5074, longitude: -0.1278, timezone: "Europe/London" },
    City { name: "Paris", country: "France", country_code: "FR", latitude: 48.8566, longitude: 2.3522, timezone: "Europe/Paris" },
    City { name: "Berlin", country: "Germany", country_code: "DE", latitude: 52.5200, longitude: 13.4050, timezone: "Europe/Berlin" },
    City { name: "Rome", country: "Italy", country_code: "IT", latitude: 41.9028, longitude: 12.4964, timezone: "Europe/Rome" },
    City { name: "Madrid", country: "Spain", country_code: "ES", latitude: 40.4168, longitude: -3.7038, timezone: "Europe/Madrid" },
    City { name: "Amsterdam", country: "Netherlands", country_code: "NL", latitude: 52.3676, longitude: 4.9041, timezone: "Europe/Amsterdam" },
    City { name: "New York", country: "United States", country_code: "US", latitude: 40.7128, longitude: -74.0060, timezone: "America/New_York" },
    City { name: "Los Angeles", country: "United States", country_code: "US", latitude: 34.0522, longitude: -118.2437, timezone: "America/Los_Angeles" },
    City { name: "Chicago", country: "United States", country_code: "US", latitude: 41.8781, longitude: -87.6298, timezone: "America/Chicago" },
    City { name: "Toronto", country: "Canada", country_code: "CA", latitude: 43.6532, longitude: -79.3832, timezone: "America/Toronto" },
    City { name: "Vancouver", country: "Canada", country_code: "CA", latitude: 49.2827, longitude: -123.1207, timezone: "America/Vancouver" },
    City { name: "Tokyo", country: "Japan", country_code: "JP", latitude: 35.6762, longitude: 139.6503, timezone: "Asia/Tokyo" },
    City { name: "Beijing", country: "China", country_code: "CN", latitude: 39.9042, longitude: 116.4074, timezone: "Asia/Shanghai" },
    City { name: "Shanghai", country: "China", country_code: "CN", latitude: 31.2304, longitude: 121.4737, timezone: "Asia/Shanghai" },
    City { name: "Hong Kong", country: "China", country_code: "HK", latitude: 22.3193, longitude: 114.1694, timezone: "Asia/Hong_Kong" },
    City { name: "Singapore", country: "Singapore", country_code: "SG", latitude: 1.3521, longitude: 103.8198, timezone: "Asia/Singapore" },
    City { name: "Mumbai", country: "India", country_code: "IN", latitude: 19.0760, longitude: 72.8777, timezone: "Asia/Kolkata" },
    City { name: "Delhi", country: "India", country_code: "IN", latitude: 28.7041, longitude: 77.1025, timezone: "Asia/Kolkata" },
    City { name: "Sydney", country: "Australia", country_code: "AU", latitude: -33.8688, longitude: 151.2093, timezone: "Australia/Sydney" },
    City { name: "Melbourne", country: "Australia", country_code: "AU", latitude: -37.8136, longitude: 144.9631, timezone: "Australia/Melbourne" },
    City { name: "Dubai", country: "United Arab Emirates", country_code: "AE", latitude: 25.2048, longitude: 55.2708, timezone: "Asia/Dubai" },
    City { name: "Moscow", country: "Russia", country_code: "RU", latitude: 55.7558, longitude: 37.6173, timezone: "Europe/Moscow" },
    City { name: "Istanbul", country: "Turkey", country_code: "TR", latitude: 41.0082, longitude: 28.9784, timezone: "Europe/Istanbul" },
    City { name: "Cairo", country: "Egypt", country_code: "EG", latitude: 30.0444, longitude: 31.2357, timezone: "Africa/Cairo" },
    City { name: "Lagos", country: "Nigeria", country_code: "NG", latitude: 6.5244, longitude: 3.3792, timezone: "Africa/Lagos" },
    City { name: "Johannesburg", country: "South Africa", country_code: "ZA", latitude: -26.2041, longitude: 28.0473, timezone: "Africa/Johannesburg" },
    City { name: "Nairobi", country: "Kenya", country_code: "KE", latitude: -1.2921, longitude: 36.8219, timezone: "Africa/Nairobi" },
    City { name: "São Paulo", country: "Brazil", country_code: "BR", latitude: -23.5505, longitude: -46.6333, timezone: "America/Sao_Paulo" },
    City { name: "Rio de Janeiro", country: "Brazil", country_code: "BR", latitude: -22.9068, longitude: -43.1729, timezone: "America/Sao_Paulo" },
    City { name: "Buenos Aires", country: "Argentina", country_code: "AR", latitude: -34.6037, longitude: -58.3816, timezone: "America/Argentina/Buenos_Aires" },
    City { name: "Mexico City", country: "Mexico", country_code: "MX", latitude: 19.4326, longitude: -99.1332, timezone: "America/Mexico_City" },
];

/// Resolves free-form city names against the gazetteer.
#[derive(Debug, Clone)]
pub struct CityResolver {
    threshold: f64,
}

impl CityResolver {
    /// `threshold` is the minimum Jaro-Winkler similarity for a fuzzy match.
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Resolve a city name, optionally narrowed by a country name or code.
    pub fn resolve(
        &self,
        city: &str,
        country: Option<&str>,
    ) -> Result<&'static City, UpstreamError> {
        let needle = fold(city);
        if needle.is_empty() {
            return Err(UpstreamError::invalid_input("city name is empty"));
        }
        let hint = country.map(fold).filter(|h| !h.is_empty());

        let candidates = GAZETTEER.iter().filter(|c| match &hint {
            Some(h) => fold(c.country) == *h || c.country_code.to_lowercase() == *h,
            None => true,
        });

        let mut best: Option<(&'static City, f64)> = None;
        for candidate in candidates {
            let name = fold(candidate.name);
            if name == needle {
                return Ok(candidate);
            }
            let score = jaro_winkler(&needle, &name);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((candidate, score));
            }
        }

        match best {
            Some((city_match, score)) if score >= self.threshold => Ok(city_match),
            _ => Err(UpstreamError::not_found(format!(
                "no city matching '{}'{}",
                city,
                country.map(|c| format!(" in '{}'", c)).unwrap_or_default()
            ))),
        }
    }
}
