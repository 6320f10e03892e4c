//! Coalescing undo/redo history.
//!
//! Snapshots are deep value copies of `(tree, selection)` taken *before*
//! an edit applies, so undoing restores the exact pre-edit state and no
//! snapshot ever aliases the live tree. Rapid edits of the same kind
//! within the coalescing window share one pending entry; the pending
//! entry's pre-state is the state before the *first* of them, which makes
//! a burst of typing undo as a single step.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::controllers::EditKind;
use crate::cursor::Selection;
use crate::tree::DocumentTree;

/// An immutable copy of the document state at a commit point.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub tree: DocumentTree,
    pub selection: Selection,
}

impl Snapshot {
    pub fn capture(tree: &DocumentTree, selection: &Selection) -> Self {
        Self {
            tree: tree.clone(),
            selection: *selection,
        }
    }
}

#[derive(Debug)]
struct Pending {
    snapshot: Snapshot,
    kind: EditKind,
    last_touch: Instant,
}

/// Bounded undo/redo stacks with a coalescing pending buffer.
#[derive(Debug)]
pub struct History {
    undo: VecDeque<Snapshot>,
    redo: VecDeque<Snapshot>,
    pending: Option<Pending>,
    depth: usize,
    coalesce_window: Duration,
}

impl History {
    pub const DEFAULT_DEPTH: usize = 100;
    pub const DEFAULT_COALESCE_WINDOW: Duration = Duration::from_millis(1000);

    pub fn new(depth: usize, coalesce_window: Duration) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: VecDeque::new(),
            pending: None,
            depth: depth.max(1),
            coalesce_window,
        }
    }

    /// Commit `snapshot` immediately: any pending entry and the redo stack
    /// are flushed first.
    pub fn push(&mut self, snapshot: Snapshot) {
        self.commit_pending();
        self.redo.clear();
        self.push_undo(snapshot);
    }

    /// Buffer `snapshot` as a coalescable entry of `kind`.
    ///
    /// A pending entry of the same kind touched within the window absorbs
    /// the edit (its pre-state already covers it); anything else commits
    /// the old pending entry and starts fresh.
    pub fn push_pending(&mut self, snapshot: Snapshot, kind: EditKind) {
        self.push_pending_at(snapshot, kind, Instant::now());
    }

    /// Clock-injected variant of [`push_pending`](Self::push_pending);
    /// the coalescing boundary is a tunable, and tests drive it directly.
    pub fn push_pending_at(&mut self, snapshot: Snapshot, kind: EditKind, now: Instant) {
        self.redo.clear();
        match &mut self.pending {
            Some(pending)
                if pending.kind == kind
                    && now.saturating_duration_since(pending.last_touch)
                        <= self.coalesce_window =>
            {
                pending.last_touch = now;
            }
            _ => {
                self.commit_pending();
                self.pending = Some(Pending {
                    snapshot,
                    kind,
                    last_touch: now,
                });
            }
        }
    }

    /// Materialize the pending entry onto the undo stack, if any. Called
    /// on structural edits, selection jumps, undo/redo and idle flushes.
    pub fn commit_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            self.push_undo(pending.snapshot);
        }
    }

    /// Step back: returns the snapshot to restore, storing `current` on
    /// the redo stack. `None` when there is nothing to undo.
    pub fn undo(&mut self, current: Snapshot) -> Option<Snapshot> {
        self.commit_pending();
        let snapshot = self.undo.pop_back()?;
        self.redo.push_back(current);
        Some(snapshot)
    }

    /// Step forward again after an undo. `None` when the redo stack is
    /// empty.
    pub fn redo(&mut self, current: Snapshot) -> Option<Snapshot> {
        self.commit_pending();
        let snapshot = self.redo.pop_back()?;
        self.undo.push_back(current);
        Some(snapshot)
    }

    pub fn can_undo(&self) -> bool {
        self.pending.is_some() || !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len() + usize::from(self.pending.is_some())
    }

    fn push_undo(&mut self, snapshot: Snapshot) {
        if self.undo.len() == self.depth {
            // Oldest entry falls off the bounded stack
            self.undo.pop_front();
        }
        self.undo.push_back(snapshot);
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DEPTH, Self::DEFAULT_COALESCE_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Block;
    use pretty_assertions::assert_eq;

    fn snapshot_with_text(text: &str) -> Snapshot {
        let mut tree = DocumentTree::new();
        let root = tree.root();
        let p = tree.append_child(root, Block::paragraph(text)).unwrap();
        Snapshot {
            selection: Selection::collapsed_at(p, 0),
            tree,
        }
    }

    #[test]
    fn test_undo_on_empty_history_is_noop() {
        let mut history = History::default();
        assert!(history.undo(snapshot_with_text("live")).is_none());
        assert!(history.redo(snapshot_with_text("live")).is_none());
    }

    #[test]
    fn test_push_then_undo_then_redo() {
        let mut history = History::default();
        let before = snapshot_with_text("before");
        let after = snapshot_with_text("after");

        history.push(before.clone());
        let restored = history.undo(after.clone()).unwrap();
        assert_eq!(restored, before);

        let redone = history.redo(restored).unwrap();
        assert_eq!(redone, after);
    }

    #[test]
    fn test_push_clears_redo_stack() {
        let mut history = History::default();
        history.push(snapshot_with_text("one"));
        history.undo(snapshot_with_text("two")).unwrap();
        assert!(history.can_redo());

        history.push(snapshot_with_text("three"));
        assert!(!history.can_redo());
    }

    #[test]
    fn test_same_kind_edits_within_window_coalesce() {
        // Typing "a", "b", "c" inside the window is one
        // undo step back to the pre-"a" state.
        let mut history = History::default();
        let start = Instant::now();
        let pre_a = snapshot_with_text("");

        history.push_pending_at(pre_a.clone(), EditKind::InsertText, start);
        history.push_pending_at(
            snapshot_with_text("a"),
            EditKind::InsertText,
            start + Duration::from_millis(100),
        );
        history.push_pending_at(
            snapshot_with_text("ab"),
            EditKind::InsertText,
            start + Duration::from_millis(200),
        );

        assert_eq!(history.undo_depth(), 1);
        let restored = history.undo(snapshot_with_text("abc")).unwrap();
        assert_eq!(restored, pre_a);
        assert!(!history.can_undo());
    }

    #[test]
    fn test_window_expiry_starts_a_new_entry() {
        let mut history = History::new(10, Duration::from_millis(500));
        let start = Instant::now();

        history.push_pending_at(snapshot_with_text(""), EditKind::InsertText, start);
        history.push_pending_at(
            snapshot_with_text("a"),
            EditKind::InsertText,
            start + Duration::from_secs(2),
        );

        assert_eq!(history.undo_depth(), 2);
    }

    #[test]
    fn test_kind_change_commits_previous_pending() {
        let mut history = History::default();
        let start = Instant::now();

        history.push_pending_at(snapshot_with_text(""), EditKind::InsertText, start);
        history.push_pending_at(
            snapshot_with_text("ab"),
            EditKind::DeleteBackward,
            start + Duration::from_millis(50),
        );

        assert_eq!(history.undo_depth(), 2);
    }

    #[test]
    fn test_depth_bound_evicts_oldest() {
        let mut history = History::new(3, Duration::ZERO);
        for i in 0..5 {
            history.push(snapshot_with_text(&format!("{i}")));
        }
        assert_eq!(history.undo_depth(), 3);

        // The oldest surviving entry is "2"
        let mut last = None;
        let mut current = snapshot_with_text("live");
        while let Some(s) = history.undo(current.clone()) {
            last = Some(s.clone());
            current = s;
        }
        let tree = last.unwrap().tree;
        let key = tree.text_block_keys()[0];
        assert_eq!(tree.get(key).unwrap().text, "2");
    }

    #[test]
    fn test_snapshots_do_not_alias_the_live_tree() {
        let mut tree = DocumentTree::new();
        let root = tree.root();
        let p = tree.append_child(root, Block::paragraph("original")).unwrap();
        let selection = Selection::collapsed_at(p, 0);

        let mut history = History::default();
        history.push(Snapshot::capture(&tree, &selection));

        // Mutate the live tree after the snapshot was stored
        tree.get_mut(p).unwrap().text.push_str(" mutated");

        let restored = history.undo(Snapshot::capture(&tree, &selection)).unwrap();
        assert_eq!(restored.tree.get(p).unwrap().text, "original");
    }
}
