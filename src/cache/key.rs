//! Cache key construction and argument normalization.
//!
//! Semantically identical requests must always produce an identical key, so
//! normalization (case folding, diacritic stripping, coordinate rounding,
//! argument ordering) happens here, before the key string is assembled -
//! never after.

use std::fmt;

use serde_json::Value;
use sha2::{Digest, Sha256};
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

const KEY_VERSION: &str = "v1";

/// Keys longer than this digest their argument tail instead of embedding it.
const MAX_KEY_BYTES: usize = 200;

/// Deterministic cache key for one tool call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build a key from a tool name and its arguments object.
    ///
    /// Null arguments are skipped so `{"city": "Tokyo", "country": null}`
    /// and `{"city": "Tokyo"}` map to the same key. Non-object argument
    /// payloads fall back to their folded JSON rendering.
    pub fn build(tool: &str, arguments: &Value) -> CacheKey {
        let tail = match arguments {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                let mut parts = Vec::with_capacity(keys.len());
                for k in keys {
                    let v = &map[k.as_str()];
                    if v.is_null() {
                        continue;
                    }
                    parts.push(format!("{}={}", k, normalize_value(v)));
                }
                parts.join("&")
            }
            other => normalize_value(other),
        };

        let key = format!("{}:{}:{}", tool, KEY_VERSION, tail);
        if key.len() > MAX_KEY_BYTES {
            let digest = Sha256::digest(tail.as_bytes());
            CacheKey(format!("{}:{}:sha256:{:x}", tool, KEY_VERSION, digest))
        } else {
            CacheKey(key)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Case-fold a string: NFKD decomposition, combining marks stripped,
/// lowercased, interior whitespace collapsed.
///
/// Shared with city-name resolution so that keys and gazetteer lookups
/// agree on what "the same name" means.
pub fn fold(text: &str) -> String {
    let stripped: String = text.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    stripped
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn normalize_value(value: &Value) -> String {
    match value {
        Value::String(s) => fold(s),
        // Coordinates and other floats round to 2 decimal places
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            Some(f) => format!("{:.2}", f),
            None => n.to_string(),
        },
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => fold(&other.to_string()),
    }
}
