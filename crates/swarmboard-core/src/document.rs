//! The shared document and the store that owns it.
//!
//! All version and revision counters change inside [`DocumentStore`]
//! mutation entry points and nowhere else; the revision resolver and the
//! history manager both depend on that.

use crate::objects::{DrawableObject, ObjectId, ObjectPatch, Point};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Aggregate document state: the object map, paint order and the
/// whole-document version counter.
///
/// `version` compares snapshot freshness between peers. It is never used
/// for per-object conflict resolution; that is what object revisions do.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub objects: HashMap<ObjectId, DrawableObject>,
    pub order: Vec<ObjectId>,
    pub version: u64,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Objects in paint order (back to front).
    pub fn objects_ordered(&self) -> impl Iterator<Item = &DrawableObject> {
        self.order.iter().filter_map(|id| self.objects.get(id))
    }
}

/// Exclusive owner of the local [`Document`].
///
/// Every mutation marks the document dirty so the embedding layer can
/// request a re-render after draining events.
#[derive(Debug, Default)]
pub struct DocumentStore {
    doc: Document,
    render_pending: bool,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(doc: Document) -> Self {
        Self {
            doc,
            render_pending: false,
        }
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn version(&self) -> u64 {
        self.doc.version
    }

    pub fn object(&self, id: &ObjectId) -> Option<&DrawableObject> {
        self.doc.objects.get(id)
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.doc.objects.contains_key(id)
    }

    /// Take the pending render request, if any.
    pub fn take_render_request(&mut self) -> bool {
        std::mem::take(&mut self.render_pending)
    }

    fn mark_dirty(&mut self) {
        self.render_pending = true;
    }

    /// Insert a new object at the top of the paint order.
    ///
    /// Idempotent: returns false and leaves the document untouched when
    /// the id is already present, which covers duplicate delivery.
    pub fn insert(&mut self, obj: DrawableObject) -> bool {
        if self.doc.objects.contains_key(&obj.id) {
            return false;
        }
        self.doc.order.push(obj.id);
        self.doc.objects.insert(obj.id, obj);
        self.doc.version += 1;
        self.mark_dirty();
        true
    }

    /// Re-insert an object at a given paint-order position (undo of a
    /// delete). Clamped to the current order length.
    pub fn insert_at(&mut self, obj: DrawableObject, index: usize) -> bool {
        if self.doc.objects.contains_key(&obj.id) {
            return false;
        }
        let index = index.min(self.doc.order.len());
        self.doc.order.insert(index, obj.id);
        self.doc.objects.insert(obj.id, obj);
        self.doc.version += 1;
        self.mark_dirty();
        true
    }

    /// Apply a locally originated patch. Bumps the object revision by 1
    /// and returns the new revision for broadcasting.
    pub fn patch_local(&mut self, id: &ObjectId, patch: &ObjectPatch) -> Option<u64> {
        let obj = self.doc.objects.get_mut(id)?;
        obj.apply_patch(patch);
        obj.revision += 1;
        let rev = obj.revision;
        self.doc.version += 1;
        self.mark_dirty();
        Some(rev)
    }

    /// Apply an accepted remote patch. The object takes the originating
    /// peer's revision stamp.
    pub fn patch_remote(&mut self, id: &ObjectId, patch: &ObjectPatch) -> bool {
        let Some(obj) = self.doc.objects.get_mut(id) else {
            return false;
        };
        obj.apply_patch(patch);
        obj.revision = patch.rev;
        self.doc.version += 1;
        self.mark_dirty();
        true
    }

    /// Append a point to a stroke. A monotonic tail-append: both the
    /// local and the remote path bump the revision by 1.
    pub fn append_point(&mut self, id: &ObjectId, point: Point) -> bool {
        let Some(obj) = self.doc.objects.get_mut(id) else {
            return false;
        };
        if !obj.push_point(point) {
            return false;
        }
        obj.revision += 1;
        self.doc.version += 1;
        self.mark_dirty();
        true
    }

    /// Remove the last point of a stroke (undo of an append).
    pub fn pop_point(&mut self, id: &ObjectId) -> Option<Point> {
        let obj = self.doc.objects.get_mut(id)?;
        let point = obj.pop_point()?;
        obj.revision += 1;
        self.doc.version += 1;
        self.mark_dirty();
        Some(point)
    }

    /// Bump an object's revision without changing content.
    pub fn touch(&mut self, id: &ObjectId) -> bool {
        let Some(obj) = self.doc.objects.get_mut(id) else {
            return false;
        };
        obj.revision += 1;
        self.doc.version += 1;
        self.mark_dirty();
        true
    }

    /// Remove an object, returning it with its paint-order position.
    /// No-op if absent.
    pub fn remove(&mut self, id: &ObjectId) -> Option<(DrawableObject, usize)> {
        let obj = self.doc.objects.remove(id)?;
        let index = self
            .doc
            .order
            .iter()
            .position(|oid| oid == id)
            .unwrap_or(self.doc.order.len());
        self.doc.order.retain(|oid| oid != id);
        self.doc.version += 1;
        self.mark_dirty();
        Some((obj, index))
    }

    /// Empty the document, returning the pre-clear state for undo.
    pub fn clear(&mut self) -> Document {
        let before = self.doc.clone();
        self.doc.objects = HashMap::new();
        self.doc.order = Vec::new();
        self.doc.version += 1;
        self.mark_dirty();
        before
    }

    /// Replace the whole document from an accepted snapshot.
    pub fn replace_with(&mut self, snapshot: Document) {
        self.doc = snapshot;
        self.mark_dirty();
    }

    /// Version-gated snapshot acceptance: the coarse-grained fallback
    /// that guarantees convergence when fine-grained operations were
    /// lost. Returns false (no change at all) unless the snapshot is
    /// strictly fresher.
    pub fn accept_snapshot(&mut self, snapshot: &Document) -> bool {
        if snapshot.version <= self.doc.version {
            return false;
        }
        self.replace_with(snapshot.clone());
        true
    }

    /// Additive merge used by checkpoint restore: only ids absent from
    /// the current map are added, never overwritten, so replaying
    /// history cannot regress state accepted from live operations.
    pub fn merge_additive(&mut self, snapshot: &Document) {
        for id in &snapshot.order {
            if let Some(obj) = snapshot.objects.get(id) {
                if !self.doc.objects.contains_key(id) {
                    self.doc.objects.insert(*id, obj.clone());
                    self.doc.order.push(*id);
                }
            }
        }
        self.doc.version = self.doc.version.max(snapshot.version) + 1;
        self.mark_dirty();
    }

    /// Topmost object whose geometry hits the given position.
    pub fn find_topmost_at(&self, position: Point, tolerance: f64) -> Option<ObjectId> {
        self.doc
            .order
            .iter()
            .rev()
            .find(|id| {
                self.doc
                    .objects
                    .get(*id)
                    .map(|obj| obj.hit_test(position, tolerance))
                    .unwrap_or(false)
            })
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::Geometry;
    use uuid::Uuid;

    fn rect(x: f64, y: f64, w: f64, h: f64) -> DrawableObject {
        DrawableObject::new(Geometry::Rectangle { x, y, w, h }, Uuid::new_v4())
    }

    fn assert_invariants(doc: &Document) {
        assert_eq!(doc.order.len(), doc.objects.len());
        for id in &doc.order {
            assert!(doc.objects.contains_key(id));
        }
        let mut seen = std::collections::HashSet::new();
        for id in &doc.order {
            assert!(seen.insert(*id), "duplicate id in order");
        }
    }

    #[test]
    fn test_insert_is_idempotent() {
        let mut store = DocumentStore::new();
        let obj = rect(0.0, 0.0, 10.0, 10.0);

        assert!(store.insert(obj.clone()));
        let after_first = store.document().clone();

        assert!(!store.insert(obj));
        assert_eq!(store.document(), &after_first);
        assert_invariants(store.document());
    }

    #[test]
    fn test_version_bumps_on_every_mutation() {
        let mut store = DocumentStore::new();
        let obj = rect(0.0, 0.0, 10.0, 10.0);
        let id = obj.id;

        store.insert(obj);
        assert_eq!(store.version(), 1);

        store.patch_local(&id, &ObjectPatch::resize(20.0, 20.0));
        assert_eq!(store.version(), 2);

        store.touch(&id);
        assert_eq!(store.version(), 3);

        store.remove(&id);
        assert_eq!(store.version(), 4);

        store.clear();
        assert_eq!(store.version(), 5);
    }

    #[test]
    fn test_patch_local_bumps_revision() {
        let mut store = DocumentStore::new();
        let obj = rect(0.0, 0.0, 10.0, 10.0);
        let id = obj.id;
        store.insert(obj);

        let rev = store.patch_local(&id, &ObjectPatch::resize(20.0, 5.0));
        assert_eq!(rev, Some(1));
        assert_eq!(store.object(&id).unwrap().revision, 1);

        let rev = store.patch_local(&id, &ObjectPatch::position(3.0, 3.0));
        assert_eq!(rev, Some(2));
    }

    #[test]
    fn test_patch_remote_takes_incoming_revision() {
        let mut store = DocumentStore::new();
        let obj = rect(0.0, 0.0, 10.0, 10.0);
        let id = obj.id;
        store.insert(obj);

        assert!(store.patch_remote(&id, &ObjectPatch::resize(20.0, 5.0).at_rev(7)));
        assert_eq!(store.object(&id).unwrap().revision, 7);
    }

    #[test]
    fn test_patch_missing_object_is_noop() {
        let mut store = DocumentStore::new();
        let id = Uuid::new_v4();
        assert_eq!(store.patch_local(&id, &ObjectPatch::default()), None);
        assert!(!store.patch_remote(&id, &ObjectPatch::default()));
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn test_remove_keeps_order_and_map_aligned() {
        let mut store = DocumentStore::new();
        let a = rect(0.0, 0.0, 1.0, 1.0);
        let b = rect(1.0, 1.0, 1.0, 1.0);
        let c = rect(2.0, 2.0, 1.0, 1.0);
        let (ida, idb, idc) = (a.id, b.id, c.id);
        store.insert(a);
        store.insert(b);
        store.insert(c);

        let (removed, index) = store.remove(&idb).unwrap();
        assert_eq!(removed.id, idb);
        assert_eq!(index, 1);
        assert_eq!(store.document().order, vec![ida, idc]);
        assert_invariants(store.document());

        assert!(store.remove(&idb).is_none());
    }

    #[test]
    fn test_insert_at_restores_paint_position() {
        let mut store = DocumentStore::new();
        let a = rect(0.0, 0.0, 1.0, 1.0);
        let b = rect(1.0, 1.0, 1.0, 1.0);
        let (ida, idb) = (a.id, b.id);
        store.insert(a);
        store.insert(b);

        let (removed, index) = store.remove(&ida).unwrap();
        store.insert_at(removed, index);
        assert_eq!(store.document().order, vec![ida, idb]);
        assert_invariants(store.document());
    }

    #[test]
    fn test_clear_returns_pre_clear_state() {
        let mut store = DocumentStore::new();
        store.insert(rect(0.0, 0.0, 1.0, 1.0));
        let before = store.clear();

        assert_eq!(before.len(), 1);
        assert!(store.document().is_empty());
        assert_eq!(store.version(), 2);
    }

    #[test]
    fn test_accept_snapshot_gates_on_version() {
        let mut store = DocumentStore::new();
        store.insert(rect(0.0, 0.0, 1.0, 1.0));
        let local = store.document().clone();

        // Same version: rejected, nothing changes.
        let mut stale = Document::new();
        stale.version = local.version;
        assert!(!store.accept_snapshot(&stale));
        assert_eq!(store.document(), &local);

        // Fresher version: whole document replaced.
        let mut fresh = Document::new();
        fresh.version = local.version + 1;
        assert!(store.accept_snapshot(&fresh));
        assert!(store.document().is_empty());
        assert_eq!(store.version(), fresh.version);
    }

    #[test]
    fn test_merge_additive_never_overwrites() {
        let mut store = DocumentStore::new();
        let mut a = rect(0.0, 0.0, 1.0, 1.0);
        a.revision = 3;
        let live = a.clone();
        store.insert(a);

        let mut stale_a = live.clone();
        stale_a.revision = 0;
        let b = rect(5.0, 5.0, 1.0, 1.0);
        let idb = b.id;

        let mut snapshot = Document::new();
        snapshot.order = vec![stale_a.id, idb];
        snapshot.objects.insert(stale_a.id, stale_a);
        snapshot.objects.insert(idb, b);
        snapshot.version = 10;

        store.merge_additive(&snapshot);

        assert_eq!(store.object(&live.id).unwrap().revision, 3);
        assert!(store.contains(&idb));
        assert_eq!(store.version(), 11);
        assert_invariants(store.document());
    }

    #[test]
    fn test_find_topmost_prefers_front_of_order() {
        let mut store = DocumentStore::new();
        let back = rect(0.0, 0.0, 100.0, 100.0);
        let front = rect(25.0, 25.0, 100.0, 100.0);
        let (back_id, front_id) = (back.id, front.id);
        store.insert(back);
        store.insert(front);

        assert_eq!(
            store.find_topmost_at(Point::new(50.0, 50.0), 0.0),
            Some(front_id)
        );
        assert_eq!(
            store.find_topmost_at(Point::new(10.0, 10.0), 0.0),
            Some(back_id)
        );
        assert_eq!(store.find_topmost_at(Point::new(500.0, 500.0), 0.0), None);
    }

    #[test]
    fn test_render_request_set_by_mutations() {
        let mut store = DocumentStore::new();
        assert!(!store.take_render_request());

        store.insert(rect(0.0, 0.0, 1.0, 1.0));
        assert!(store.take_render_request());
        assert!(!store.take_render_request());
    }
}
