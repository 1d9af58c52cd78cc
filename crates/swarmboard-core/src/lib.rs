//! SwarmBoard Core Library
//!
//! Transport-agnostic synchronization engine for the SwarmBoard
//! collaborative whiteboard: document state, last-writer-wins conflict
//! resolution, undo/redo, the peer handshake and checkpointing.

pub mod broadcast;
pub mod checkpoint;
pub mod document;
pub mod engine;
pub mod history;
pub mod log;
pub mod objects;
pub mod protocol;
pub mod resolve;
pub mod session;

#[cfg(test)]
pub(crate) mod test_util;

pub use broadcast::{Broadcaster, Frame, Target};
pub use checkpoint::{CheckpointCoordinator, CheckpointRecord};
pub use document::{Document, DocumentStore};
pub use engine::Engine;
pub use history::{History, HistoryEntry};
pub use log::{CheckpointLog, FileLog, LogError, MemoryLog};
pub use objects::{DrawableObject, Geometry, ObjectId, ObjectPatch, PeerId, Point};
pub use protocol::WireMessage;
pub use resolve::resolve;
pub use session::{PeerState, Session};
