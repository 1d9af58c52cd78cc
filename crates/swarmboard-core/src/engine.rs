//! The synchronization engine: one explicit state object tying the
//! document store, history, broadcaster and session together.
//!
//! All mutation runs synchronously inside engine calls; the embedding
//! layer owns the suspension points (socket and storage I/O) and drives
//! the engine one event at a time, so no observer can witness a
//! half-applied mutation.

use crate::broadcast::{Broadcaster, Frame, Target};
use crate::checkpoint::CheckpointRecord;
use crate::document::{Document, DocumentStore};
use crate::history::{History, HistoryEntry};
use crate::objects::{DrawableObject, Geometry, ObjectId, ObjectPatch, PeerId, Point};
use crate::protocol::{self, WireMessage};
use crate::resolve::resolve;
use crate::session::Session;
use uuid::Uuid;

/// Whether a patch travels as `update` or `move` on the wire.
#[derive(Debug, Clone, Copy)]
enum PatchKind {
    Update,
    Move,
}

/// The per-process collaboration engine.
pub struct Engine {
    peer_id: PeerId,
    store: DocumentStore,
    history: History,
    broadcaster: Broadcaster,
    session: Session,
}

impl Engine {
    pub fn new() -> Self {
        Self::with_peer_id(Uuid::new_v4())
    }

    pub fn with_peer_id(peer_id: PeerId) -> Self {
        Self {
            peer_id,
            store: DocumentStore::new(),
            history: History::new(),
            broadcaster: Broadcaster::new(),
            session: Session::new(),
        }
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// Read-only view of the local document.
    pub fn document(&self) -> &Document {
        self.store.document()
    }

    pub fn version(&self) -> u64 {
        self.store.version()
    }

    pub fn peer_count(&self) -> usize {
        self.session.peer_count()
    }

    /// True when a mutation happened since the last call; the embedding
    /// layer turns this into its re-render signal.
    pub fn take_render_request(&mut self) -> bool {
        self.store.take_render_request()
    }

    /// Topmost object under the given position, if any.
    pub fn find_topmost_at(&self, position: Point, tolerance: f64) -> Option<ObjectId> {
        self.store.find_topmost_at(position, tolerance)
    }

    // --- Local mutations -------------------------------------------------

    /// Create and add a new object authored by this peer.
    pub fn create_object(&mut self, geometry: Geometry) -> ObjectId {
        let obj = DrawableObject::new(geometry, self.peer_id);
        let id = obj.id;
        self.add_object(obj);
        id
    }

    /// Add an object. Idempotent on the id; returns false when already
    /// present.
    pub fn add_object(&mut self, obj: DrawableObject) -> bool {
        if !self.store.insert(obj.clone()) {
            return false;
        }
        let index = self.document().order.len() - 1;
        self.history.push(HistoryEntry::Add {
            obj: Box::new(obj.clone()),
            index,
        });
        self.broadcaster.queue(WireMessage::Add { obj });
        true
    }

    /// Apply a partial patch to an object's fields.
    pub fn update_object(&mut self, id: ObjectId, patch: ObjectPatch) -> bool {
        self.apply_local_patch(id, patch, PatchKind::Update, true)
    }

    /// Move an object to a new origin.
    pub fn move_object(&mut self, id: ObjectId, x: f64, y: f64) -> bool {
        self.apply_local_patch(id, ObjectPatch::position(x, y), PatchKind::Move, true)
    }

    fn apply_local_patch(
        &mut self,
        id: ObjectId,
        patch: ObjectPatch,
        kind: PatchKind,
        record: bool,
    ) -> bool {
        let Some(before) = self.store.object(&id).map(|obj| obj.capture_before(&patch)) else {
            return false;
        };
        let Some(rev) = self.store.patch_local(&id, &patch) else {
            return false;
        };
        let stamped = patch.at_rev(rev);
        if record {
            self.history.push(HistoryEntry::Update {
                id,
                before,
                after: stamped.clone(),
            });
        }
        let msg = match kind {
            PatchKind::Update => WireMessage::Update { id, patch: stamped },
            PatchKind::Move => WireMessage::Move { id, patch: stamped },
        };
        self.broadcaster.queue(msg);
        true
    }

    /// Append a point to a stroke in progress.
    pub fn append_point(&mut self, id: ObjectId, point: Point) -> bool {
        if !self.store.append_point(&id, point) {
            return false;
        }
        self.history.push(HistoryEntry::AppendPoint { id, point });
        self.broadcaster.queue(WireMessage::Patch { id, point });
        true
    }

    /// Bump an object's revision without changing content. Not recorded
    /// in history.
    pub fn touch_object(&mut self, id: ObjectId) -> bool {
        if !self.store.touch(&id) {
            return false;
        }
        self.broadcaster.queue(WireMessage::Touch { id });
        true
    }

    /// Delete an object. No-op if absent.
    pub fn delete_object(&mut self, id: ObjectId) -> bool {
        let Some((obj, index)) = self.store.remove(&id) else {
            return false;
        };
        self.history.push(HistoryEntry::Delete {
            obj: Box::new(obj),
            index,
        });
        self.broadcaster.queue(WireMessage::Delete { id });
        true
    }

    /// Empty the document. The undo entry is a single pre-clear
    /// snapshot, which bounds undo-stack growth.
    pub fn clear_all(&mut self) {
        let before = self.store.clear();
        self.history.push(HistoryEntry::Clear { before });
        self.broadcaster.queue(WireMessage::Clear);
    }

    // --- Undo / redo -----------------------------------------------------

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Reverse the most recent local mutation, re-broadcasting the
    /// inverse so remote peers follow.
    pub fn undo(&mut self) -> bool {
        let Some(entry) = self.history.pop_undo() else {
            return false;
        };
        match &entry {
            HistoryEntry::Add { obj, .. } => {
                self.store.remove(&obj.id);
                self.broadcaster.queue(WireMessage::Delete { id: obj.id });
            }
            HistoryEntry::Update { id, before, .. } => {
                if let Some(rev) = self.store.patch_local(id, before) {
                    self.broadcaster.queue(WireMessage::Update {
                        id: *id,
                        patch: before.clone().at_rev(rev),
                    });
                }
            }
            HistoryEntry::AppendPoint { id, .. } => {
                // No wire operation removes a point; fall back to the
                // coarse snapshot to keep peers converging.
                if self.store.pop_point(id).is_some() {
                    self.queue_full();
                }
            }
            HistoryEntry::Delete { obj, index } => {
                if self.store.insert_at((**obj).clone(), *index) {
                    self.broadcaster.queue(WireMessage::Add {
                        obj: (**obj).clone(),
                    });
                }
            }
            HistoryEntry::Clear { before } => {
                let mut restored = before.clone();
                restored.version = self.store.version().max(before.version) + 1;
                self.store.replace_with(restored);
                self.queue_full();
            }
        }
        self.history.push_redo(entry);
        true
    }

    /// Reapply the most recently undone mutation.
    pub fn redo(&mut self) -> bool {
        let Some(entry) = self.history.pop_redo() else {
            return false;
        };
        match &entry {
            HistoryEntry::Add { obj, index } => {
                if self.store.insert_at((**obj).clone(), *index) {
                    self.broadcaster.queue(WireMessage::Add {
                        obj: (**obj).clone(),
                    });
                }
            }
            HistoryEntry::Update { id, after, .. } => {
                if let Some(rev) = self.store.patch_local(id, after) {
                    self.broadcaster.queue(WireMessage::Update {
                        id: *id,
                        patch: after.clone().at_rev(rev),
                    });
                }
            }
            HistoryEntry::AppendPoint { id, point } => {
                if self.store.append_point(id, *point) {
                    self.broadcaster.queue(WireMessage::Patch {
                        id: *id,
                        point: *point,
                    });
                }
            }
            HistoryEntry::Delete { obj, .. } => {
                if self.store.remove(&obj.id).is_some() {
                    self.broadcaster.queue(WireMessage::Delete { id: obj.id });
                }
            }
            HistoryEntry::Clear { .. } => {
                self.store.clear();
                self.broadcaster.queue(WireMessage::Clear);
            }
        }
        self.history.restore_undo(entry);
        true
    }

    // --- Connection lifecycle --------------------------------------------

    /// A transport connection opened: register the peer and greet it
    /// with our full current snapshot.
    pub fn handle_connect(&mut self, peer: PeerId) {
        self.session.connect(peer);
        self.broadcaster.queue_to(
            Target::Peer(peer),
            WireMessage::Hello {
                from: self.peer_id,
                doc: self.document().clone(),
            },
        );
        self.session.mark_hello_sent(&peer);
        log::info!("peer {} connected ({} active)", peer, self.peer_count());
    }

    /// A transport connection closed or errored: drop the peer. The
    /// document keeps everything already merged.
    pub fn handle_disconnect(&mut self, peer: PeerId) {
        if self.session.disconnect(&peer) {
            log::info!("peer {} disconnected ({} active)", peer, self.peer_count());
        }
    }

    /// Route one inbound payload from a peer link. Malformed payloads
    /// are dropped silently.
    pub fn handle_message(&mut self, from: PeerId, bytes: &[u8]) {
        let Some(msg) = protocol::decode(bytes) else {
            log::debug!("dropping undecodable payload from {}", from);
            return;
        };
        match msg {
            WireMessage::Hello { from: sender, doc } => {
                let their_version = doc.version;
                self.store.accept_snapshot(&doc);
                // Whichever side is behind catches up; most-advanced
                // state propagates transitively across the mesh.
                if self.store.version() > their_version {
                    self.broadcaster.queue_to(
                        Target::Peer(from),
                        WireMessage::Full {
                            snapshot: self.document().clone(),
                        },
                    );
                }
                self.session.mark_synced(&from);
                log::debug!(
                    "handshake with {} (peer id {}): theirs v{}, ours v{}",
                    from,
                    sender,
                    their_version,
                    self.store.version()
                );
            }
            other => {
                resolve(&mut self.store, &other);
            }
        }
    }

    /// Drain the outbound frames produced since the last call.
    pub fn take_outgoing(&mut self) -> Vec<Frame> {
        self.broadcaster.flush();
        self.broadcaster.take_frames()
    }

    // --- Checkpoint integration ------------------------------------------

    /// Additively merge a restored checkpoint record: only missing
    /// objects are filled in, live state is never regressed.
    pub fn restore_from(&mut self, record: &CheckpointRecord) {
        self.store.merge_additive(&record.to_document());
    }

    fn queue_full(&mut self) {
        self.broadcaster.queue(WireMessage::Full {
            snapshot: self.document().clone(),
        });
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
