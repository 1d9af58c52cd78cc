//! Last-writer-wins conflict resolution for inbound operations.
//!
//! Every remote mutation passes through [`resolve`] before it reaches
//! the document store. Stale mutations are defined no-ops, not errors:
//! they are dropped silently and leave both the document version and the
//! object revision untouched.

use crate::document::DocumentStore;
use crate::protocol::WireMessage;

/// Apply an inbound operation against the store, gated by per-object
/// revisions (fine-grained ops) or the document version (snapshots).
/// Returns true when the document changed.
pub fn resolve(store: &mut DocumentStore, msg: &WireMessage) -> bool {
    match msg {
        // Idempotent create: a duplicate delivery finds the id present
        // and changes nothing.
        WireMessage::Add { obj } => store.insert(obj.clone()),

        // Accept iff the incoming revision is at least ours. A tie is
        // accepted: concurrent same-revision edits converge to whichever
        // arrives last.
        WireMessage::Update { id, patch } | WireMessage::Move { id, patch } => {
            match store.object(id) {
                Some(local) if patch.rev >= local.revision => store.patch_remote(id, patch),
                Some(local) => {
                    log::debug!(
                        "dropping stale update for {}: incoming rev {} < local {}",
                        id,
                        patch.rev,
                        local.revision
                    );
                    false
                }
                None => false,
            }
        }

        // Tail-appends and touches are monotonic, not state replaces:
        // always accepted when the target exists, bumping its revision.
        WireMessage::Patch { id, point } => store.append_point(id, *point),
        WireMessage::Touch { id } => store.touch(id),

        // Delete is terminal: a later lower-revision update referencing
        // the missing id is a no-op, so deletion cannot be out-raced
        // back to life.
        WireMessage::Delete { id } => store.remove(id).is_some(),

        WireMessage::Clear => {
            store.clear();
            true
        }

        // Coarse-grained convergence fallback, version-gated.
        WireMessage::Full { snapshot } => store.accept_snapshot(snapshot),

        // A greeting obliges the receiver to reply with `full` when it
        // is strictly ahead, and only the engine can send; route hello
        // through `Engine::handle_message`. This arm applies just the
        // snapshot-merge half so a direct call stays safe.
        WireMessage::Hello { doc, .. } => store.accept_snapshot(doc),
    }
}
