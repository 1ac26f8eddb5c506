// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `SyncMessage` and its JSON encode/decode pair.

use jods_diff::Diff;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The envelope sent over a sync transport (spec.md §6 step 6):
/// `{clientId, prefix?, timestamp, changes}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncMessage {
    /// Random id generated once per sync session, used for echo suppression.
    #[serde(rename = "clientId")]
    pub client_id: String,
    /// Optional namespace; when set, a receiver with a different configured
    /// prefix must reject the message.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub prefix: Option<String>,
    /// Caller-supplied timestamp (milliseconds since the Unix epoch);
    /// `jods-proto` never reads the clock itself.
    pub timestamp: u64,
    /// The structural diff being transmitted.
    pub changes: Diff,
}

/// Failures from [`encode`]/[`decode`].
#[derive(Debug, Error)]
pub enum ProtoError {
    /// The wire string was not valid JSON, or not a valid `SyncMessage`
    /// shape.
    #[error("malformed sync message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Serialize a message to its wire string.
///
/// # Errors
/// Never fails for a well-formed `SyncMessage` in practice; returns
/// [`ProtoError`] only if `serde_json` itself errors.
pub fn encode(message: &SyncMessage) -> Result<String, ProtoError> {
    Ok(serde_json::to_string(message)?)
}

/// Parse a wire string into a [`SyncMessage`].
///
/// # Errors
/// [`ProtoError::Malformed`] if `text` is not valid JSON or not a
/// `SyncMessage` shape.
pub fn decode(text: &str) -> Result<SyncMessage, ProtoError> {
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jods_diff::FieldDiff;
    use indexmap::IndexMap;

    #[test]
    fn round_trips_through_json() {
        let mut fields = IndexMap::new();
        fields.insert(
            "count".to_string(),
            FieldDiff::Nested(Diff::Replace(jods_diff::Value::Number(1.0))),
        );
        let msg = SyncMessage {
            client_id: "abc123".to_string(),
            prefix: Some("app".to_string()),
            timestamp: 1_700_000_000_000,
            changes: Diff::Object(fields),
        };
        let text = encode(&msg).expect("encode");
        let back = decode(&text).expect("decode");
        assert_eq!(msg, back);
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(decode("{not json").is_err());
    }

    #[test]
    fn omits_absent_prefix_from_the_wire() {
        let msg = SyncMessage {
            client_id: "abc".to_string(),
            prefix: None,
            timestamp: 0,
            changes: Diff::Empty,
        };
        let text = encode(&msg).expect("encode");
        assert!(!text.contains("prefix"));
    }
}
