//! Patch operations handed to the view surface.
//!
//! Patches are applied in order. `Mount` introduces a key the surface has
//! not seen; every other op references a key that is already mounted. The
//! surface reads the node's current content from the renderer's vnode map
//! when it applies `SetText`/`SetAttrs`.

use crate::render::vnode::VirtualNode;
use crate::tree::BlockKey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOp {
    /// Attach a new node under `parent`, before sibling `before`
    /// (`None` appends).
    Mount {
        key: BlockKey,
        parent: BlockKey,
        before: Option<BlockKey>,
    },
    /// Remove a node and its subtree from the surface.
    Unmount(BlockKey),
    /// The node's text content (inline tokens) changed.
    SetText(BlockKey),
    /// The node's attributes changed (tag changes surface as attrs too).
    SetAttrs(BlockKey),
    /// The node's child list changed order or membership.
    ReorderChildren(BlockKey),
}

/// Emit the minimal ops that turn `old` into `new` for one block.
/// `None` for `old` means the block was never mounted.
pub(super) fn diff_node(old: Option<&VirtualNode>, new: &VirtualNode, ops: &mut Vec<PatchOp>) {
    let Some(old) = old else {
        // Mounting is the caller's job (it knows the insertion point);
        // a fresh node needs no further ops.
        return;
    };
    if old.tag != new.tag || old.attrs != new.attrs {
        ops.push(PatchOp::SetAttrs(new.key));
    }
    if old.text_hash != new.text_hash || old.inline != new.inline {
        ops.push(PatchOp::SetText(new.key));
    }
    if old.children != new.children {
        ops.push(PatchOp::ReorderChildren(new.key));
    }
}
