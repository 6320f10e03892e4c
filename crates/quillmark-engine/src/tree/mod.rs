//! The block document tree.
//!
//! Blocks live in an arena keyed by [`BlockKey`]; the tree shape is held as
//! parent/child key links inside each [`Block`]. Structural operations
//! (insert, detach, split, merge) all live on [`DocumentTree`] and fail with
//! [`TreeError`] sentinels rather than panicking, so controllers can fall
//! back when a transform is illegal for the block kinds involved.

mod block;
mod document;

pub use block::{Block, BlockKey, BlockKind, BlockTag, CellAlign};
pub use document::{DetachedSubtree, DocumentTree, TreeError};
