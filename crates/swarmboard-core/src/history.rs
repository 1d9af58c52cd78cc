//! Local undo/redo stacks.
//!
//! Entries record enough "before" state to reverse a mutation. They are
//! kept locally and never transmitted; undoing replays the inverse
//! through the engine's local mutation path, which re-broadcasts it as a
//! fresh operation.

use crate::document::Document;
use crate::objects::{DrawableObject, ObjectId, ObjectPatch, Point};

/// Maximum number of undo entries to keep.
const MAX_UNDO_HISTORY: usize = 50;

/// One recorded local mutation, named by the forward operation.
#[derive(Debug, Clone)]
pub enum HistoryEntry {
    /// An object was added (undo: delete it).
    Add {
        obj: Box<DrawableObject>,
        index: usize,
    },
    /// An object was patched (undo: apply `before`, redo: `after`).
    Update {
        id: ObjectId,
        before: ObjectPatch,
        after: ObjectPatch,
    },
    /// A point was appended to a stroke (undo: pop it).
    AppendPoint { id: ObjectId, point: Point },
    /// An object was deleted (undo: re-insert at its old position).
    Delete {
        obj: Box<DrawableObject>,
        index: usize,
    },
    /// The document was cleared (undo: restore the pre-clear state).
    Clear { before: Document },
}

/// Linear undo/redo history.
#[derive(Debug, Default)]
pub struct History {
    undo: Vec<HistoryEntry>,
    redo: Vec<HistoryEntry>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new locally originated mutation. Clears the redo stack,
    /// standard linear history semantics.
    pub fn push(&mut self, entry: HistoryEntry) {
        self.undo.push(entry);
        self.redo.clear();
        if self.undo.len() > MAX_UNDO_HISTORY {
            self.undo.remove(0);
        }
    }

    pub fn pop_undo(&mut self) -> Option<HistoryEntry> {
        self.undo.pop()
    }

    pub fn pop_redo(&mut self) -> Option<HistoryEntry> {
        self.redo.pop()
    }

    /// Park an undone entry for redo.
    pub fn push_redo(&mut self, entry: HistoryEntry) {
        self.redo.push(entry);
    }

    /// Return a redone entry to the undo stack without disturbing the
    /// remaining redo entries.
    pub fn restore_undo(&mut self, entry: HistoryEntry) {
        self.undo.push(entry);
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn touch_entry() -> HistoryEntry {
        HistoryEntry::AppendPoint {
            id: Uuid::new_v4(),
            point: Point::new(0.0, 0.0),
        }
    }

    #[test]
    fn test_push_clears_redo() {
        let mut history = History::new();
        history.push(touch_entry());
        let entry = history.pop_undo().unwrap();
        history.push_redo(entry);
        assert!(history.can_redo());

        history.push(touch_entry());
        assert!(!history.can_redo());
        assert!(history.can_undo());
    }

    #[test]
    fn test_restore_undo_keeps_redo() {
        let mut history = History::new();
        history.push(touch_entry());
        history.push(touch_entry());

        let entry = history.pop_undo().unwrap();
        history.push_redo(entry);
        let entry = history.pop_undo().unwrap();
        history.push_redo(entry);

        let redone = history.pop_redo().unwrap();
        history.restore_undo(redone);
        assert!(history.can_redo());
        assert!(history.can_undo());
    }

    #[test]
    fn test_undo_stack_is_capped() {
        let mut history = History::new();
        for _ in 0..(MAX_UNDO_HISTORY + 10) {
            history.push(touch_entry());
        }
        let mut count = 0;
        while history.pop_undo().is_some() {
            count += 1;
        }
        assert_eq!(count, MAX_UNDO_HISTORY);
    }
}
