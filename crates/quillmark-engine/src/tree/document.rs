use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::block::{Block, BlockKey, BlockKind, BlockTag};

/// Errors from structural tree operations.
///
/// These are sentinels, not failures of the pipeline: callers treat
/// `UnknownKey` as a benign no-op (cursors are built speculatively) and the
/// incompatible-transform variants as "try the next fallback".
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("unknown block key: {0}")]
    UnknownKey(BlockKey),
    #[error("the root block cannot be moved or removed")]
    RootImmovable,
    #[error("cannot merge {second:?} into {first:?}")]
    IncompatibleMerge { first: BlockTag, second: BlockTag },
    #[error("cannot split a {0:?} block")]
    NotSplittable(BlockTag),
    #[error("{0:?} is not a container block")]
    NotAContainer(BlockTag),
}

/// A subtree detached from the document.
///
/// Blocks keep their keys, so reattaching (e.g. drag of a list item, cut
/// followed by paste of structured content) preserves identity. The first
/// entry is the subtree root with `parent` cleared.
#[derive(Debug, Clone)]
pub struct DetachedSubtree {
    pub(crate) blocks: Vec<Block>,
}

impl DetachedSubtree {
    pub fn root_key(&self) -> BlockKey {
        self.blocks[0].key
    }
}

/// The document: an arena of blocks plus a distinguished root.
///
/// The arena map *is* the key→block index required for O(1) lookup; the
/// tree shape lives in each block's `parent`/`children` keys. All
/// structural operations preserve the invariants:
///
/// - acyclic, with `children` in document order
/// - every non-root block has exactly one parent whose `children` contain
///   it exactly once
/// - keys are unique for the lifetime of the document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentTree {
    root: BlockKey,
    arena: HashMap<BlockKey, Block>,
}

impl DocumentTree {
    /// Create a tree holding only the root container.
    pub fn new() -> Self {
        let root = Block::new(BlockKind::Document, "");
        let root_key = root.key;
        let mut arena = HashMap::new();
        arena.insert(root_key, root);
        Self {
            root: root_key,
            arena,
        }
    }

    /// Create a tree with a single empty paragraph, the starting state of
    /// a fresh document.
    pub fn empty_document() -> Self {
        let mut tree = Self::new();
        let root = tree.root;
        tree.append_child(root, Block::paragraph(""))
            .expect("root always exists");
        tree
    }

    pub fn root(&self) -> BlockKey {
        self.root
    }

    pub fn contains(&self, key: BlockKey) -> bool {
        self.arena.contains_key(&key)
    }

    /// O(1) block lookup via the arena index.
    pub fn get(&self, key: BlockKey) -> Option<&Block> {
        self.arena.get(&key)
    }

    pub fn get_mut(&mut self, key: BlockKey) -> Option<&mut Block> {
        self.arena.get_mut(&key)
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.len() <= 1
    }

    fn require(&self, key: BlockKey) -> Result<&Block, TreeError> {
        self.arena.get(&key).ok_or(TreeError::UnknownKey(key))
    }

    /// Index of `key` within its parent's children.
    pub fn child_index(&self, key: BlockKey) -> Result<usize, TreeError> {
        let block = self.require(key)?;
        let parent = block.parent.ok_or(TreeError::RootImmovable)?;
        let siblings = &self.require(parent)?.children;
        siblings
            .iter()
            .position(|&k| k == key)
            .ok_or(TreeError::UnknownKey(key))
    }

    pub fn insert_before(&mut self, block: Block, reference: BlockKey) -> Result<BlockKey, TreeError> {
        let index = self.child_index(reference)?;
        let parent = self.require(reference)?.parent.expect("checked above");
        self.insert_at(parent, index, block)
    }

    pub fn insert_after(&mut self, block: Block, reference: BlockKey) -> Result<BlockKey, TreeError> {
        let index = self.child_index(reference)?;
        let parent = self.require(reference)?.parent.expect("checked above");
        self.insert_at(parent, index + 1, block)
    }

    pub fn append_child(&mut self, parent: BlockKey, block: Block) -> Result<BlockKey, TreeError> {
        let index = self.require(parent)?.children.len();
        self.insert_at(parent, index, block)
    }

    fn insert_at(
        &mut self,
        parent: BlockKey,
        index: usize,
        mut block: Block,
    ) -> Result<BlockKey, TreeError> {
        let key = block.key;
        debug_assert!(!self.arena.contains_key(&key), "duplicate block key");
        block.parent = Some(parent);
        self.arena.insert(key, block);
        let parent_block = self.arena.get_mut(&parent).ok_or(TreeError::UnknownKey(parent))?;
        parent_block.children.insert(index, key);
        Ok(key)
    }

    /// Detach `key` and its subtree, removing the blocks from the arena but
    /// keeping them intact for reattachment.
    pub fn detach(&mut self, key: BlockKey) -> Result<DetachedSubtree, TreeError> {
        if key == self.root {
            return Err(TreeError::RootImmovable);
        }
        let index = self.child_index(key)?;
        let parent = self.require(key)?.parent.expect("non-root has parent");
        self.arena
            .get_mut(&parent)
            .expect("parent exists")
            .children
            .remove(index);

        let mut blocks = Vec::new();
        self.extract_subtree(key, &mut blocks);
        blocks[0].parent = None;
        Ok(DetachedSubtree { blocks })
    }

    fn extract_subtree(&mut self, key: BlockKey, out: &mut Vec<Block>) {
        if let Some(block) = self.arena.remove(&key) {
            let children = block.children.clone();
            out.push(block);
            for child in children {
                self.extract_subtree(child, out);
            }
        }
    }

    /// Remove `key` and drop its subtree entirely.
    pub fn remove(&mut self, key: BlockKey) -> Result<(), TreeError> {
        self.detach(key).map(|_| ())
    }

    pub fn attach_before(
        &mut self,
        subtree: DetachedSubtree,
        reference: BlockKey,
    ) -> Result<BlockKey, TreeError> {
        let index = self.child_index(reference)?;
        let parent = self.require(reference)?.parent.expect("checked above");
        self.attach_at(parent, index, subtree)
    }

    pub fn attach_after(
        &mut self,
        subtree: DetachedSubtree,
        reference: BlockKey,
    ) -> Result<BlockKey, TreeError> {
        let index = self.child_index(reference)?;
        let parent = self.require(reference)?.parent.expect("checked above");
        self.attach_at(parent, index + 1, subtree)
    }

    pub fn attach_child(
        &mut self,
        parent: BlockKey,
        subtree: DetachedSubtree,
    ) -> Result<BlockKey, TreeError> {
        let index = self.require(parent)?.children.len();
        self.attach_at(parent, index, subtree)
    }

    fn attach_at(
        &mut self,
        parent: BlockKey,
        index: usize,
        subtree: DetachedSubtree,
    ) -> Result<BlockKey, TreeError> {
        if !self.require(parent)?.kind.is_container() {
            return Err(TreeError::NotAContainer(self.require(parent)?.kind.tag()));
        }
        let root_key = subtree.root_key();
        for mut block in subtree.blocks {
            if block.key == root_key {
                block.parent = Some(parent);
            }
            debug_assert!(!self.arena.contains_key(&block.key), "duplicate block key");
            self.arena.insert(block.key, block);
        }
        self.arena
            .get_mut(&parent)
            .expect("parent exists")
            .children
            .insert(index, root_key);
        Ok(root_key)
    }

    /// Replace a block's kind in place, keeping key, text and children.
    ///
    /// Used by the inline pattern recognizer ("# " turns a paragraph into a
    /// heading) where identity must survive the conversion.
    pub fn replace_kind(&mut self, key: BlockKey, kind: BlockKind) -> Result<(), TreeError> {
        let block = self.arena.get_mut(&key).ok_or(TreeError::UnknownKey(key))?;
        block.kind = kind;
        Ok(())
    }

    /// Split a text-bearing block at `offset` (bytes, on a char boundary).
    ///
    /// The left half keeps the original key and `text[..offset]`; the right
    /// half is a fresh sibling of the same kind with `text[offset..]`. For
    /// list items the nested children follow the right half, so a nested
    /// list stays under the item that now precedes it.
    pub fn split(&mut self, key: BlockKey, offset: usize) -> Result<BlockKey, TreeError> {
        let block = self.require(key)?;
        if !block.kind.is_text_bearing() || matches!(block.kind, BlockKind::FrontMatter) {
            return Err(TreeError::NotSplittable(block.kind.tag()));
        }
        let kind = block.kind.clone();
        let offset = offset.min(block.text.len());

        let block = self.arena.get_mut(&key).expect("checked above");
        let right_text = block.text.split_off(offset);
        let moved_children = std::mem::take(&mut block.children);

        let mut right = Block::new(kind, right_text);
        right.children = moved_children.clone();
        let right_key = self.insert_after(right, key)?;
        for child in moved_children {
            if let Some(c) = self.arena.get_mut(&child) {
                c.parent = Some(right_key);
            }
        }
        Ok(right_key)
    }

    /// Merge `second` into `first`: append text and children, remove
    /// `second`. Inverse of [`split`](Self::split) where kinds are
    /// compatible. Returns the byte offset in `first` where the merged text
    /// begins, which is where the caret lands after a Backspace merge.
    pub fn merge(&mut self, first: BlockKey, second: BlockKey) -> Result<usize, TreeError> {
        if first == second {
            return Err(TreeError::UnknownKey(second));
        }
        let first_kind = self.require(first)?.kind.clone();
        let second_block = self.require(second)?;
        if !first_kind.can_merge_with(&second_block.kind) {
            return Err(TreeError::IncompatibleMerge {
                first: first_kind.tag(),
                second: second_block.kind.tag(),
            });
        }

        let second_text = second_block.text.clone();
        let moved_children = second_block.children.clone();

        // Clear the donor's children before detaching so they are not
        // dropped with it.
        self.arena.get_mut(&second).expect("checked").children.clear();
        self.detach(second)?;

        let first_block = self.arena.get_mut(&first).expect("checked");
        let offset = first_block.text.len();
        first_block.text.push_str(&second_text);
        first_block.children.extend(moved_children.iter().copied());
        for child in moved_children {
            if let Some(c) = self.arena.get_mut(&child) {
                c.parent = Some(first);
            }
        }
        Ok(offset)
    }

    /// Child indices from the root down to `key`; the preorder address
    /// used for document-order comparison.
    pub fn path_from_root(&self, key: BlockKey) -> Result<Vec<usize>, TreeError> {
        let mut path = Vec::new();
        let mut current = key;
        while current != self.root {
            path.push(self.child_index(current)?);
            current = self.require(current)?.parent.expect("non-root has parent");
        }
        path.reverse();
        Ok(path)
    }

    /// All keys in document (preorder) order, root excluded.
    pub fn preorder_keys(&self) -> Vec<BlockKey> {
        let mut out = Vec::with_capacity(self.arena.len());
        let mut stack: Vec<BlockKey> = Vec::new();
        if let Some(root) = self.get(self.root) {
            stack.extend(root.children.iter().rev());
        }
        while let Some(key) = stack.pop() {
            out.push(key);
            if let Some(block) = self.get(key) {
                stack.extend(block.children.iter().rev());
            }
        }
        out
    }

    /// Text-bearing blocks in document order.
    pub fn text_block_keys(&self) -> Vec<BlockKey> {
        self.preorder_keys()
            .into_iter()
            .filter(|&k| self.get(k).is_some_and(|b| b.kind.is_text_bearing()))
            .collect()
    }

    /// The first text-bearing block inside `key`'s subtree (including
    /// `key` itself).
    pub fn first_text_descendant(&self, key: BlockKey) -> Option<BlockKey> {
        let block = self.get(key)?;
        if block.kind.is_text_bearing() {
            return Some(key);
        }
        block
            .children
            .iter()
            .find_map(|&child| self.first_text_descendant(child))
    }

    /// The last text-bearing block inside `key`'s subtree.
    pub fn last_text_descendant(&self, key: BlockKey) -> Option<BlockKey> {
        let block = self.get(key)?;
        if let Some(found) = block
            .children
            .iter()
            .rev()
            .find_map(|&child| self.last_text_descendant(child))
        {
            return Some(found);
        }
        if block.kind.is_text_bearing() {
            Some(key)
        } else {
            None
        }
    }

    /// The previous text-bearing block in document order, if any.
    pub fn prev_text_block(&self, key: BlockKey) -> Option<BlockKey> {
        let keys = self.text_block_keys();
        let pos = keys.iter().position(|&k| k == key)?;
        if pos == 0 { None } else { Some(keys[pos - 1]) }
    }

    /// The next text-bearing block in document order, if any.
    pub fn next_text_block(&self, key: BlockKey) -> Option<BlockKey> {
        let keys = self.text_block_keys();
        let pos = keys.iter().position(|&k| k == key)?;
        keys.get(pos + 1).copied()
    }

    /// Verify the structural invariants; test helper, panics on violation.
    #[cfg(test)]
    pub fn check_invariants(&self) {
        use std::collections::HashSet;

        let mut seen = HashSet::new();
        let mut stack = vec![self.root];
        while let Some(key) = stack.pop() {
            assert!(seen.insert(key), "cycle or duplicate child link at {key}");
            let block = self.get(key).expect("child key present in arena");
            for &child in &block.children {
                let child_block = self.get(child).expect("child in arena");
                assert_eq!(child_block.parent, Some(key), "parent back-link broken");
                stack.push(child);
            }
        }
        assert_eq!(seen.len(), self.arena.len(), "orphan blocks in arena");
    }
}

impl Default for DocumentTree {
    fn default() -> Self {
        Self::empty_document()
    }
}
