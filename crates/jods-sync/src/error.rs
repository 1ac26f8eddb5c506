// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Non-fatal conditions surfaced to `SyncOptions::on_error` (spec.md §4.F:
//! malformed JSON, a thrown schema validator, both "go to `onError`" rather
//! than aborting the sync session).

use thiserror::Error;

/// Conditions `SyncEngine` reports rather than propagating — per spec.md
/// §4.F every one of these drops the offending message/send and keeps the
/// session running.
#[derive(Debug, Error)]
pub enum SyncError {
    /// `jods_proto::encode` failed on an outbound message.
    #[error("failed to encode outbound sync message: {0}")]
    Encode(jods_proto::ProtoError),
    /// `jods_proto::decode` failed on an inbound message.
    #[error("failed to decode inbound sync message: {0}")]
    Decode(jods_proto::ProtoError),
    /// The transport rejected a send.
    #[error("transport error: {0}")]
    Transport(String),
    /// The encoded outbound message exceeded `SyncOptions::max_message_size`.
    #[error("encoded message of {size} bytes exceeds max_message_size of {max}")]
    MessageTooLarge {
        /// The encoded size, in bytes.
        size: usize,
        /// The configured limit.
        max: usize,
    },
    /// `SyncOptions::validate_schema` rejected an inbound diff.
    #[error("schema validation rejected inbound diff: {0}")]
    SchemaValidation(String),
    /// Applying an inbound patch failed (shape mismatch).
    #[error("failed to apply inbound patch: {0}")]
    Patch(jods_diff::PatchError),
}
