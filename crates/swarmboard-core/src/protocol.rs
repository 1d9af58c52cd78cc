//! Wire protocol for peer-to-peer document replication.
//!
//! One JSON envelope per logical message, discriminated by the `t`
//! field. Messages ride the transport's ordered byte stream; framing is
//! the transport layer's concern.

use crate::document::Document;
use crate::objects::{DrawableObject, ObjectId, ObjectPatch, PeerId, Point};
use serde::{Deserialize, Serialize};

/// A single wire-transmissible document mutation (or handshake message).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "lowercase")]
pub enum WireMessage {
    /// Handshake greeting carrying the sender's full current snapshot.
    Hello { from: PeerId, doc: Document },
    /// Coarse-grained snapshot fallback, version-gated at the receiver.
    Full { snapshot: Document },
    /// Create a new object.
    Add { obj: DrawableObject },
    /// Partial field update, gated by per-object revision.
    Update { id: ObjectId, patch: ObjectPatch },
    /// Append one point to a stroke's point list.
    Patch { id: ObjectId, point: Point },
    /// Content-neutral revision bump.
    Touch { id: ObjectId },
    /// Position update, gated like `update`.
    Move { id: ObjectId, patch: ObjectPatch },
    /// Remove an object. Terminal.
    Delete { id: ObjectId },
    /// Empty the document.
    Clear,
}

/// Serialize a message for the wire.
pub fn encode(msg: &WireMessage) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(msg)
}

/// Decode an inbound payload. Malformed input yields `None`; callers
/// drop it silently so one bad peer cannot wedge the stream.
pub fn decode(bytes: &[u8]) -> Option<WireMessage> {
    serde_json::from_slice(bytes).ok()
}
