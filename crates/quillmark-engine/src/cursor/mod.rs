//! Cursor and selection algebra.
//!
//! Positions are `(block key, byte offset)` pairs; ordering questions are
//! answered structurally from the tree's preorder addresses, never from a
//! rendering surface. Cursors are built speculatively by the input layer,
//! so every consumer revalidates with [`Selection::is_valid`] and treats an
//! unknown key as a no-op.

mod extract;

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::tree::{BlockKey, DocumentTree};

pub use extract::{extract_range_blocks, extract_range_html, extract_range_text, BlockTemplate};

/// A single caret position: a block plus a byte offset into its text.
///
/// Offsets are byte offsets and must sit on a char boundary of the block's
/// text; all mutation paths keep them that way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caret {
    pub block: BlockKey,
    pub offset: usize,
}

impl Caret {
    pub fn new(block: BlockKey, offset: usize) -> Self {
        Self { block, offset }
    }

    pub fn is_valid(&self, tree: &DocumentTree) -> bool {
        tree.get(self.block)
            .is_some_and(|b| b.kind.is_text_bearing() && self.offset <= b.text.len())
    }
}

/// A selection: `anchor` is where the gesture started, `focus` where it
/// currently is. `start`/`end` in document order are derived on demand via
/// [`Selection::ordered`], never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: Caret,
    pub focus: Caret,
}

impl Selection {
    pub fn new(anchor: Caret, focus: Caret) -> Self {
        Self { anchor, focus }
    }

    /// A collapsed selection (plain caret).
    pub fn caret(position: Caret) -> Self {
        Self {
            anchor: position,
            focus: position,
        }
    }

    pub fn collapsed_at(block: BlockKey, offset: usize) -> Self {
        Self::caret(Caret::new(block, offset))
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    pub fn is_valid(&self, tree: &DocumentTree) -> bool {
        self.anchor.is_valid(tree) && self.focus.is_valid(tree)
    }

    /// Reorder anchor/focus into document order.
    ///
    /// Same block: plain offset comparison. Different blocks: structural
    /// preorder comparison. If either key is unknown the gesture order is
    /// returned unchanged; callers have already checked validity.
    pub fn ordered(&self, tree: &DocumentTree) -> (Caret, Caret) {
        if self.anchor.block == self.focus.block {
            if self.anchor.offset <= self.focus.offset {
                return (self.anchor, self.focus);
            }
            return (self.focus, self.anchor);
        }
        match compare_block_order(tree, self.anchor.block, self.focus.block) {
            Some(Ordering::Greater) => (self.focus, self.anchor),
            _ => (self.anchor, self.focus),
        }
    }
}

/// Which of two blocks comes first in document preorder.
///
/// Deterministic and transitive: the comparison walks the tree's structural
/// addresses (child indices from the root), so it needs no view surface.
/// An ancestor precedes its descendants. Equal keys compare equal; unknown
/// keys yield `None`.
pub fn compare_block_order(
    tree: &DocumentTree,
    a: BlockKey,
    b: BlockKey,
) -> Option<Ordering> {
    if a == b {
        return Some(Ordering::Equal);
    }
    let path_a = tree.path_from_root(a).ok()?;
    let path_b = tree.path_from_root(b).ok()?;
    // Lexicographic comparison of preorder addresses; a strict prefix means
    // "ancestor", which sorts first.
    Some(path_a.cmp(&path_b))
}
