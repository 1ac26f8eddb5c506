// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Patch application (spec.md §4.B "patch").

use crate::diff::{Diff, FieldDiff};
use crate::error::PatchError;
use crate::value::Value;

/// A target that a [`Diff`] can be applied to.
///
/// `jods-store` implements this for `Store` so that writes go through the
/// signal kernel (one dirty mark per leaf, batched by the caller); this
/// crate stays free of any dependency on the store's cell machinery,
/// mirroring how `echo_graph::RenderGraph::apply_op` operates purely on
/// data with no knowledge of a surrounding transport or scheduler.
pub trait Patchable {
    /// Assign a scalar or added value at a path (sequence of object keys).
    fn assign(&mut self, path: &[String], value: Value);
    /// Remove the property at a path.
    fn remove(&mut self, path: &[String]);
    /// Replace the sequence slot at a path with a whole new array.
    fn replace_array(&mut self, path: &[String], items: Vec<Value>);
    /// Read the current value at a path, if present (used to detect shape
    /// mismatches before applying a nested diff).
    fn get(&self, path: &[String]) -> Option<Value>;
}

/// Apply `diff` to `target`.
///
/// Unknown wrapper keys are stripped to [`Diff::Empty`] at decode time
/// (see `jods_diff::diff`'s `Deserialize` impl) and logged via `tracing`
/// there, so `patch` itself only ever fails on a genuine shape mismatch.
///
/// Spec.md §4.B: "Wrapping: the entire patch runs inside a single batch on
/// the target store" — batching is the caller's responsibility (the
/// `Patchable` impl or its wrapper), since this crate has no notion of a
/// batch scope.
///
/// # Errors
/// Returns [`PatchError::ShapeMismatch`] when the diff expects an object at
/// a path where the store holds a scalar or array.
pub fn patch<T: Patchable>(target: &mut T, diff: &Diff) -> Result<(), PatchError> {
    apply_diff(target, &[], diff)
}

fn apply_diff<T: Patchable>(
    target: &mut T,
    path: &[String],
    diff: &Diff,
) -> Result<(), PatchError> {
    match diff {
        Diff::Empty => Ok(()),
        Diff::Object(fields) => {
            if matches!(target.get(path), Some(Value::Array(_) | Value::Number(_) | Value::String(_) | Value::Bool(_))) {
                return Err(PatchError::ShapeMismatch { path: path_to_string(path) });
            }
            for (key, field) in fields {
                let mut field_path = path.to_vec();
                field_path.push(key.clone());
                apply_field(target, &field_path, field)?;
            }
            Ok(())
        }
        Diff::NewArray(items) => {
            target.replace_array(path, items.clone());
            Ok(())
        }
        Diff::Replace(value) => {
            target.assign(path, value.clone());
            Ok(())
        }
    }
}

fn apply_field<T: Patchable>(
    target: &mut T,
    path: &[String],
    field: &FieldDiff,
) -> Result<(), PatchError> {
    match field {
        FieldDiff::Added(value) => {
            target.assign(path, value.clone());
            Ok(())
        }
        FieldDiff::Removed => {
            target.remove(path);
            Ok(())
        }
        FieldDiff::Nested(inner) => apply_diff(target, path, inner),
    }
}

fn path_to_string(path: &[String]) -> String {
    if path.is_empty() {
        "<root>".to_string()
    } else {
        path.join(".")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff;
    use indexmap::IndexMap;

    /// Minimal in-memory `Patchable` used to exercise the patcher in
    /// isolation from `jods-store`.
    #[derive(Debug, Default, PartialEq)]
    struct PlainStore {
        root: Value,
    }

    impl PlainStore {
        fn new(root: Value) -> Self {
            Self { root }
        }

        fn snapshot(&self) -> Value {
            self.root.clone()
        }

        fn navigate_mut<'a>(root: &'a mut Value, path: &[String]) -> Option<&'a mut IndexMap<String, Value>> {
            let mut cur = root;
            for (i, segment) in path.iter().enumerate() {
                let is_last = i + 1 == path.len();
                let Value::Object(map) = cur else {
                    return None;
                };
                if is_last {
                    return Some(map);
                }
                cur = map.entry(segment.clone()).or_insert_with(Value::object);
            }
            match cur {
                Value::Object(map) => Some(map),
                _ => None,
            }
        }
    }

    impl Patchable for PlainStore {
        fn assign(&mut self, path: &[String], value: Value) {
            if path.is_empty() {
                self.root = value;
                return;
            }
            let (last, parent_path) = path.split_last().expect("non-empty path");
            if let Some(map) = Self::navigate_mut(&mut self.root, parent_path) {
                map.insert(last.clone(), value);
            }
        }

        fn remove(&mut self, path: &[String]) {
            if path.is_empty() {
                return;
            }
            let (last, parent_path) = path.split_last().expect("non-empty path");
            if let Some(map) = Self::navigate_mut(&mut self.root, parent_path) {
                map.shift_remove(last);
            }
        }

        fn replace_array(&mut self, path: &[String], items: Vec<Value>) {
            self.assign(path, Value::Array(items));
        }

        fn get(&self, path: &[String]) -> Option<Value> {
            let mut cur = &self.root;
            for segment in path {
                cur = cur.as_object()?.get(segment)?;
            }
            Some(cur.clone())
        }
    }

    fn obj(pairs: &[(&str, Value)]) -> Value {
        let mut map = IndexMap::new();
        for (k, v) in pairs {
            map.insert((*k).to_string(), v.clone());
        }
        Value::Object(map)
    }

    #[test]
    fn round_trip_patch_matches_target_snapshot() {
        let s1 = obj(&[(
            "user",
            obj(&[("name", Value::from("A")), ("email", Value::from("a@x"))]),
        ), ("flags", Value::Array(vec![Value::Bool(true)]))]);
        let s2 = obj(&[(
            "user",
            obj(&[("name", Value::from("B")), ("email", Value::from("a@x"))]),
        ), ("flags", Value::Array(vec![Value::Bool(true), Value::Bool(false)]))]);

        let mut store = PlainStore::new(s1.clone());
        let d = diff(&s1, &s2);
        patch(&mut store, &d).expect("patch applies");
        assert_eq!(store.snapshot(), s2);
    }

    #[test]
    fn patching_scalar_with_object_diff_is_shape_mismatch() {
        let s1 = obj(&[("count", Value::Number(1.0))]);
        let mut store = PlainStore::new(s1);
        let mut fields = IndexMap::new();
        fields.insert("inner".to_string(), FieldDiff::Added(Value::Number(1.0)));
        let bogus = Diff::Object({
            let mut outer = IndexMap::new();
            outer.insert("count".to_string(), FieldDiff::Nested(Diff::Object(fields)));
            outer
        });
        let err = patch(&mut store, &bogus).expect_err("shape mismatch");
        assert_eq!(
            err,
            PatchError::ShapeMismatch {
                path: "count".to_string()
            }
        );
    }
}
