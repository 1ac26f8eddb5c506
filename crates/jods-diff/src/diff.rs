// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Structural differ (spec.md §4.B, §3 "Diff").

use crate::value::Value;
use indexmap::IndexMap;
use serde::de::Error as DeError;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A structural descriptor of the change between two [`Value`] snapshots.
///
/// Composes by application (`patch(patch(s, d1), d2)`), not by merge — see
/// spec.md §3.
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// `a` and `b` are structurally equal; wire form is `{}`.
    Empty,
    /// Object-vs-object recursive diff. Keys with an empty recursive diff
    /// are omitted, per spec.md §4.B.
    Object(IndexMap<String, FieldDiff>),
    /// Whole-array replacement; wire form is `{"__new": [...]}`.
    NewArray(Vec<Value>),
    /// Scalar replacement, a type change, or a container replaced outright;
    /// wire form is the raw value.
    Replace(Value),
}

/// Per-key entry inside an [`Diff::Object`] node.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldDiff {
    /// Key present only in the newer snapshot; wire form `{"__added": v}`.
    Added(Value),
    /// Key present only in the older snapshot; wire form `{"__removed": true}`.
    Removed,
    /// Key present in both, with a non-empty recursive diff.
    Nested(Diff),
}

impl Diff {
    /// `true` iff the two snapshots compared were structurally equal.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Diff::Empty => true,
            Diff::Object(fields) => fields.is_empty(),
            Diff::NewArray(_) | Diff::Replace(_) => false,
        }
    }
}

fn keys_union<'a>(
    a: &'a IndexMap<String, Value>,
    b: &'a IndexMap<String, Value>,
) -> Vec<&'a str> {
    let mut keys: Vec<&str> = a.keys().map(String::as_str).collect();
    for k in b.keys() {
        if !a.contains_key(k) {
            keys.push(k);
        }
    }
    keys
}

/// Compute the structural diff between two snapshots.
///
/// `diff(a, a) == Diff::Empty` for all `a` (spec.md §8).
#[must_use]
pub fn diff(a: &Value, b: &Value) -> Diff {
    if a.deep_eq(b) {
        return Diff::Empty;
    }
    match (a, b) {
        (Value::Object(ma), Value::Object(mb)) => {
            let mut fields = IndexMap::new();
            for key in keys_union(ma, mb) {
                match (ma.get(key), mb.get(key)) {
                    (Some(av), Some(bv)) => {
                        let rec = diff(av, bv);
                        if !rec.is_empty() {
                            fields.insert(key.to_string(), FieldDiff::Nested(rec));
                        }
                    }
                    (Some(_), None) => {
                        fields.insert(key.to_string(), FieldDiff::Removed);
                    }
                    (None, Some(bv)) => {
                        fields.insert(key.to_string(), FieldDiff::Added(bv.clone()));
                    }
                    (None, None) => {}
                }
            }
            Diff::Object(fields)
        }
        (Value::Array(_), Value::Array(b_items)) => Diff::NewArray(b_items.clone()),
        _ => Diff::Replace(b.clone()),
    }
}

// Wire encoding mirrors spec.md §6 exactly; modeled as a manual `Serialize`
// impl in the teacher's own style (`echo_session_proto::ErrorPayload` also
// hand-writes its `Serialize` rather than deriving it).
impl Serialize for Diff {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Diff::Empty => serializer.serialize_map(Some(0))?.end(),
            Diff::Object(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (key, field) in fields {
                    map.serialize_entry(key, field)?;
                }
                map.end()
            }
            Diff::NewArray(items) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("__new", items)?;
                map.end()
            }
            Diff::Replace(value) => value.serialize(serializer),
        }
    }
}

impl Serialize for FieldDiff {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            FieldDiff::Added(value) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("__added", value)?;
                map.end()
            }
            FieldDiff::Removed => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("__removed", &true)?;
                map.end()
            }
            FieldDiff::Nested(diff) => diff.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Diff {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let json = serde_json::Value::deserialize(deserializer)?;
        diff_from_json(json).map_err(DeError::custom)
    }
}

impl<'de> Deserialize<'de> for FieldDiff {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let json = serde_json::Value::deserialize(deserializer)?;
        field_from_json(json).map_err(DeError::custom)
    }
}

fn diff_from_json(json: serde_json::Value) -> Result<Diff, String> {
    match json {
        serde_json::Value::Object(map) if map.is_empty() => Ok(Diff::Empty),
        serde_json::Value::Object(map) if map.len() == 1 && map.contains_key("__new") => {
            let arr = map
                .get("__new")
                .and_then(|v| v.as_array())
                .ok_or("`__new` must be an array")?;
            let items = arr
                .iter()
                .cloned()
                .map(Value::from_json)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| e.to_string())?;
            Ok(Diff::NewArray(items))
        }
        serde_json::Value::Object(map) => {
            let mut fields = IndexMap::new();
            for (key, value) in map {
                if is_unknown_wrapper_key(&key) {
                    tracing::warn!(key = %key, "ignoring unknown wrapper key in diff");
                    continue;
                }
                fields.insert(key, field_from_json(value)?);
            }
            Ok(Diff::Object(fields))
        }
        other => {
            let value = Value::from_json(other).map_err(|e| e.to_string())?;
            Ok(Diff::Replace(value))
        }
    }
}

fn field_from_json(json: serde_json::Value) -> Result<FieldDiff, String> {
    if let serde_json::Value::Object(map) = &json {
        if map.len() == 1 {
            if let Some(added) = map.get("__added") {
                let value = Value::from_json(added.clone()).map_err(|e| e.to_string())?;
                return Ok(FieldDiff::Added(value));
            }
            if map.get("__removed").and_then(serde_json::Value::as_bool) == Some(true) {
                return Ok(FieldDiff::Removed);
            }
            if let Some((key, _)) = map.iter().next() {
                if is_unknown_wrapper_key(key) {
                    tracing::warn!(key = %key, "ignoring unknown wrapper key in diff");
                    return Ok(FieldDiff::Nested(Diff::Empty));
                }
            }
        }
    }
    diff_from_json(json).map(FieldDiff::Nested)
}

/// A key starting with the reserved `__` prefix that is not one of the
/// three recognized wrapper tags (spec.md §4.B).
fn is_unknown_wrapper_key(key: &str) -> bool {
    key.starts_with("__") && key != "__added" && key != "__removed" && key != "__new"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn obj(pairs: &[(&str, Value)]) -> Value {
        let mut map = IndexMap::new();
        for (k, v) in pairs {
            map.insert((*k).to_string(), v.clone());
        }
        Value::Object(map)
    }

    #[test]
    fn diff_of_equal_snapshots_is_empty() {
        let a = obj(&[("x", Value::Number(1.0))]);
        assert_eq!(diff(&a, &a), Diff::Empty);
    }

    #[test]
    fn diff_of_array_change_is_whole_array_replacement() {
        let a = obj(&[(
            "items",
            Value::Array(vec![Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)]),
        )]);
        let b = obj(&[(
            "items",
            Value::Array(vec![
                Value::Number(1.0),
                Value::Number(2.0),
                Value::Number(3.0),
                Value::Number(4.0),
            ]),
        )]);
        let d = diff(&a, &b);
        let json = serde_json::to_value(&d).expect("serialize");
        assert_eq!(json, serde_json::json!({"items": {"__new": [1.0, 2.0, 3.0, 4.0]}}));
    }

    #[test]
    fn diff_marks_added_and_removed_keys() {
        let a = obj(&[("keep", Value::Bool(true)), ("gone", Value::Number(1.0))]);
        let b = obj(&[("keep", Value::Bool(true)), ("fresh", Value::Number(2.0))]);
        let d = diff(&a, &b);
        match d {
            Diff::Object(fields) => {
                assert_eq!(fields.get("gone"), Some(&FieldDiff::Removed));
                assert_eq!(fields.get("fresh"), Some(&FieldDiff::Added(Value::Number(2.0))));
                assert!(!fields.contains_key("keep"));
            }
            _ => unreachable!("expected object diff"),
        }
    }

    #[test]
    fn unchanged_nested_keys_are_omitted() {
        let a = obj(&[("user", obj(&[("name", Value::from("A")), ("email", Value::from("a@x"))]))]);
        let b = obj(&[("user", obj(&[("name", Value::from("B")), ("email", Value::from("a@x"))]))]);
        let d = diff(&a, &b);
        match d {
            Diff::Object(fields) => match fields.get("user") {
                Some(FieldDiff::Nested(Diff::Object(user_fields))) => {
                    assert!(!user_fields.contains_key("email"));
                    assert_eq!(
                        user_fields.get("name"),
                        Some(&FieldDiff::Nested(Diff::Replace(Value::from("B"))))
                    );
                }
                other => unreachable!("unexpected: {other:?}"),
            },
            _ => unreachable!("expected object diff"),
        }
    }

    #[test]
    fn unknown_wrapper_keys_are_ignored_not_errored() {
        let json = serde_json::json!({"count": {"__mystery": 1}});
        let decoded: Diff = serde_json::from_value(json).expect("unknown keys are ignored, not fatal");
        match decoded {
            Diff::Object(fields) => {
                assert_eq!(fields.get("count"), Some(&FieldDiff::Nested(Diff::Empty)));
            }
            _ => unreachable!("expected object diff"),
        }
    }

    #[test]
    fn wire_round_trip_through_json() {
        let a = obj(&[("count", Value::Number(0.0))]);
        let b = obj(&[("count", Value::Number(1.0))]);
        let d = diff(&a, &b);
        let text = serde_json::to_string(&d).expect("serialize");
        let back: Diff = serde_json::from_str(&text).expect("deserialize");
        assert_eq!(d, back);
    }
}
