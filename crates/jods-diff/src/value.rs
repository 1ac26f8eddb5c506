// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Tagged variant tree used as the snapshot representation (spec.md §3,
//! "Heterogeneous stores / dynamic keys" in §9).

use crate::CYCLE_SENTINEL;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A plain, acyclic, JSON-representable value.
///
/// Mappings preserve insertion order (the contract from spec.md §4.A: "a
/// stable key order... insertion order is the contract; sort is not
/// required but must be deterministic"), hence [`IndexMap`] rather than a
/// sorted `BTreeMap`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// JSON `null`.
    Null,
    /// Boolean scalar.
    Bool(bool),
    /// Numeric scalar. Stores everything as `f64`, matching the dynamic
    /// numeric type of the source system.
    Number(f64),
    /// String scalar.
    String(String),
    /// Ordered sequence. Diffed as a unit (spec.md §3: "the canonical
    /// encoding is `{__new: newSequence}`... atomic to guarantee index
    /// stability across receivers").
    Array(Vec<Value>),
    /// Insertion-ordered mapping with string keys.
    Object(IndexMap<String, Value>),
}

impl Value {
    /// Construct an empty object.
    #[must_use]
    pub fn object() -> Self {
        Value::Object(IndexMap::new())
    }

    /// Returns `true` if this value and `other` are structurally equal.
    ///
    /// Used by the signal kernel's write path to implement spec.md §4.C's
    /// no-op rule ("if new value equals old by reference equality for
    /// objects or value equality for primitives, no-op").
    #[must_use]
    pub fn deep_eq(&self, other: &Value) -> bool {
        self == other
    }

    /// View this value as an object's fields, if it is one.
    #[must_use]
    pub fn as_object(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// View this value as an array, if it is one.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// `true` for `Array`/`Object`, the two recursive variants.
    #[must_use]
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Array(_) | Value::Object(_))
    }

    /// The reserved circular-reference placeholder (spec.md §9).
    #[must_use]
    pub fn cycle_placeholder() -> Self {
        Value::String(CYCLE_SENTINEL.to_string())
    }

    /// Convert to a `serde_json::Value` for wire transport (jods-proto).
    ///
    /// # Errors
    /// Returns an error only if a contained number is non-finite, since
    /// JSON has no representation for `NaN`/`Infinity`.
    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Convert from a `serde_json::Value` received off the wire.
    ///
    /// # Errors
    /// Propagates any `serde_json` deserialization failure.
    pub fn from_json(json: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(json)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deep_eq_matches_structural_equality() {
        let a = Value::Object(IndexMap::from([("x".to_string(), Value::Number(1.0))]));
        let b = Value::Object(IndexMap::from([("x".to_string(), Value::Number(1.0))]));
        let c = Value::Object(IndexMap::from([("x".to_string(), Value::Number(2.0))]));
        assert!(a.deep_eq(&b));
        assert!(!a.deep_eq(&c));
    }

    #[test]
    fn json_round_trip_preserves_key_order() {
        let mut map = IndexMap::new();
        map.insert("z".to_string(), Value::Bool(true));
        map.insert("a".to_string(), Value::Number(2.0));
        let value = Value::Object(map);
        let json = value.to_json().expect("serialize");
        let back = Value::from_json(json).expect("deserialize");
        assert_eq!(value, back);
        if let Value::Object(m) = &back {
            let keys: Vec<_> = m.keys().collect();
            assert_eq!(keys, vec!["z", "a"]);
        } else {
            unreachable!("expected object");
        }
    }
}
