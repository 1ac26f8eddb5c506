// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Dotted-path matching shared by `jods-sync`'s `allowPaths`/`sensitiveKeys`
//! filtering on both the send and receive path (spec.md §4.F steps 3, 5).

use indexmap::IndexMap;
use jods_diff::{Diff, FieldDiff};

/// Split a dotted path spec (`"user.email"`) into segments. A bare `"*"`
/// segment matches any single key at that position.
#[must_use]
pub fn parse_path(spec: &str) -> Vec<String> {
    spec.split('.').map(str::to_string).collect()
}

/// Rejoin path segments for logging/diagnostics.
#[must_use]
pub fn path_to_string(path: &[String]) -> String {
    path.join(".")
}

/// `true` if every segment of `pattern` matches the corresponding segment of
/// `path` (a bare `"*"` segment matches anything) and `pattern` is no longer
/// than `path` — i.e. `pattern` names `path` or an ancestor of it.
fn is_prefix(pattern: &[String], path: &[String]) -> bool {
    pattern.len() <= path.len()
        && pattern
            .iter()
            .zip(path.iter())
            .all(|(p, s)| p == "*" || p == s)
}

/// `true` if `path` falls inside (or at) an allowed subtree, or is an
/// ancestor of one (so traversal can continue down to a deeper allowed
/// path). An empty `allow` list means "no restriction".
fn is_allowed(path: &[String], allow: &[Vec<String>]) -> bool {
    allow.is_empty() || allow.iter().any(|p| is_prefix(p, path) || is_prefix(path, p))
}

/// `true` if `path` falls inside (or at) a blacklisted subtree. Unlike
/// [`is_allowed`], an ancestor of a sensitive path is never itself
/// considered sensitive — blocking `user.password` must not also block
/// `user`, only the one subtree (spec.md §4.F: "can blank out subtrees
/// inside an allowed key").
fn is_sensitive(path: &[String], sensitive: &[Vec<String>]) -> bool {
    sensitive.iter().any(|p| is_prefix(p, path))
}

/// Scrub a diff down to only the keys permitted by `allow` and not excluded
/// by `sensitive`. Used identically on the send path (outbound filtering)
/// and the receive path (inbound filtering) — spec.md §4.F explicitly
/// shares the same three filters between both directions.
#[must_use]
pub fn filter_diff(diff: &Diff, allow: &[Vec<String>], sensitive: &[Vec<String>]) -> Diff {
    filter_at(diff, &[], allow, sensitive)
}

fn filter_at(diff: &Diff, prefix: &[String], allow: &[Vec<String>], sensitive: &[Vec<String>]) -> Diff {
    let Diff::Object(fields) = diff else {
        return diff.clone();
    };
    let mut out = IndexMap::new();
    for (key, field) in fields {
        let mut path = prefix.to_vec();
        path.push(key.clone());
        if is_sensitive(&path, sensitive) || !is_allowed(&path, allow) {
            continue;
        }
        let kept = match field {
            FieldDiff::Nested(inner) => {
                let inner = filter_at(inner, &path, allow, sensitive);
                if inner.is_empty() {
                    continue;
                }
                FieldDiff::Nested(inner)
            }
            other => other.clone(),
        };
        out.insert(key.clone(), kept);
    }
    Diff::Object(out)
}
