//! Typed key/value sidecar attached to ledger entries, rounds, and items.
//!
//! Metadata is a map of string keys to primitive values. A small set of
//! well-known keys (currently `price_cents`) gets typed accessors and
//! validation; everything else is opaque passthrough that round-trips
//! through JSON untouched.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::Cents;

/// Well-known key: the resolved price of an item in cents.
pub const KEY_PRICE_CENTS: &str = "price_cents";

/// A primitive metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    /// Integer value.
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// Boolean value.
    Bool(bool),
    /// Text value.
    Text(String),
}

impl From<i64> for MetaValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for MetaValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Open-ended metadata payload with sorted, deterministic key order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, MetaValue>);

impl Metadata {
    /// Creates an empty metadata map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a key/value pair, replacing any existing value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<MetaValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Returns the value for `key`, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.0.get(key)
    }

    /// Returns true if the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Typed accessor for the well-known `price_cents` key.
    ///
    /// Accepts integer, float, and numeric-string encodings since callers
    /// feed metadata from arbitrary JSON. Non-positive and unparseable
    /// values read as `None`.
    #[must_use]
    pub fn price_cents(&self) -> Option<Cents> {
        let cents = match self.0.get(KEY_PRICE_CENTS)? {
            MetaValue::Int(v) => *v,
            #[allow(clippy::cast_possible_truncation)]
            MetaValue::Float(v) => *v as i64,
            MetaValue::Text(v) => v.trim().parse().ok()?,
            MetaValue::Bool(_) => return None,
        };
        (cents > 0).then_some(cents)
    }

    /// Sets the well-known `price_cents` key.
    pub fn set_price_cents(&mut self, cents: Cents) {
        self.insert(KEY_PRICE_CENTS, cents);
    }

    /// Serializes to a JSON object string.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "{}".to_string())
    }

    /// Parses from a JSON object string. Unknown value shapes (nested
    /// objects, arrays) are dropped rather than rejected: metadata is a
    /// sidecar, not a schema.
    #[must_use]
    pub fn from_json(raw: &str) -> Self {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) else {
            return Self::default();
        };
        let Some(object) = value.as_object() else {
            return Self::default();
        };

        let mut map = BTreeMap::new();
        for (key, value) in object {
            let converted = match value {
                serde_json::Value::Bool(b) => MetaValue::Bool(*b),
                serde_json::Value::String(s) => MetaValue::Text(s.clone()),
                serde_json::Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        MetaValue::Int(i)
                    } else if let Some(f) = n.as_f64() {
                        MetaValue::Float(f)
                    } else {
                        continue;
                    }
                }
                _ => continue,
            };
            map.insert(key.clone(), converted);
        }
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_roundtrip() {
        let meta = Metadata::new()
            .with("campaign_id", 42i64)
            .with("source", "case_open")
            .with("premium", true);

        let parsed = Metadata::from_json(&meta.to_json());
        assert_eq!(parsed, meta);
    }

    #[test]
    fn test_price_cents_accessor_accepts_loose_encodings() {
        let mut meta = Metadata::new();
        assert_eq!(meta.price_cents(), None);

        meta.set_price_cents(1250);
        assert_eq!(meta.price_cents(), Some(1250));

        let meta = Metadata::new().with(KEY_PRICE_CENTS, "890");
        assert_eq!(meta.price_cents(), Some(890));

        let meta = Metadata::new().with(KEY_PRICE_CENTS, MetaValue::Float(55.0));
        assert_eq!(meta.price_cents(), Some(55));

        let meta = Metadata::new().with(KEY_PRICE_CENTS, 0i64);
        assert_eq!(meta.price_cents(), None);

        let meta = Metadata::new().with(KEY_PRICE_CENTS, "not a number");
        assert_eq!(meta.price_cents(), None);
    }

    #[test]
    fn test_from_json_drops_nested_shapes() {
        let parsed = Metadata::from_json(r#"{"ok": 1, "nested": {"a": 1}, "list": [1, 2]}"#);
        assert_eq!(parsed.get("ok"), Some(&MetaValue::Int(1)));
        assert_eq!(parsed.get("nested"), None);
        assert_eq!(parsed.get("list"), None);
    }

    #[test]
    fn test_from_json_tolerates_garbage() {
        assert!(Metadata::from_json("not json").is_empty());
        assert!(Metadata::from_json("[1, 2, 3]").is_empty());
        assert!(Metadata::from_json("{}").is_empty());
    }
}
