//! Shared Serde deserializers
//!
//! Lenient deserializers for values that arrive from environment variables,
//! browser forms, or loosely typed upstream JSON:
//! - `null` / `""` → None
//! - String number `"48.14"` → Some(48.14)
//! - Native number `48.14` → Some(48.14)

use serde::{Deserialize, Deserializer};

// ============================================================================
// Default Value Functions (for serde #[serde(default = "...")] attributes)
// ============================================================================

/// Default value: true
pub fn bool_true() -> bool {
    true
}

/// Default value: false
pub fn bool_false() -> bool {
    false
}

// ============================================================================
// Custom Deserializers
// ============================================================================

/// Boolean from native booleans, 0/1, or "true"/"false"/"yes"/"no"
pub fn deserialize_bool_flexible<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrStringOrInt {
        Bool(bool),
        Int(i64),
        String(String),
    }

    match BoolOrStringOrInt::deserialize(deserializer)? {
        BoolOrStringOrInt::Bool(b) => Ok(b),
        BoolOrStringOrInt::Int(i) => match i {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(D::Error::custom(format!(
                "Invalid integer value {}, expected 0 or 1",
                i
            ))),
        },
        BoolOrStringOrInt::String(s) => {
            let t = s.trim();
            if t == "1" || t.eq_ignore_ascii_case("true") || t.eq_ignore_ascii_case("yes") {
                Ok(true)
            } else if t.is_empty()
                || t == "0"
                || t.eq_ignore_ascii_case("false")
                || t.eq_ignore_ascii_case("no")
            {
                Ok(false)
            } else {
                Err(D::Error::custom(format!(
                    "Invalid boolean value '{}', expected: 1/0, true/false, yes/no, or boolean",
                    s
                )))
            }
        },
    }
}

/// Optional f64 from null, empty string, numeric string, or native number
pub fn deserialize_optional_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrFloat {
        Float(f64),
        String(String),
    }

    match Option::<StringOrFloat>::deserialize(deserializer)? {
        None => Ok(None),
        Some(StringOrFloat::Float(f)) => Ok(Some(f)),
        Some(StringOrFloat::String(s)) => {
            let t = s.trim();
            if t.is_empty() {
                Ok(None)
            } else {
                t.parse::<f64>().map(Some).map_err(D::Error::custom)
            }
        },
    }
}
