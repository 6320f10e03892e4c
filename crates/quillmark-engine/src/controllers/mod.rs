//! Mutation controllers.
//!
//! One handler per input class, dispatched through a `(block tag, event
//! kind)` capability table rather than a type hierarchy. Each handler is a
//! single atomic transition: it validates the cursor, mutates the tree,
//! moves the selection, and reports the dirty range for the renderer. A
//! cursor pointing at an unknown block makes the whole event a benign
//! no-op; illegal structural transforms fall back without touching the
//! tree.

mod backspace;
mod clipboard;
mod delete_forward;
mod enter;
mod input;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::cursor::{Caret, Selection};
use crate::tree::{BlockKey, BlockTag, DocumentTree};

pub use clipboard::PasteContent;

/// The closed set of input event classes the kernel accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Char,
    Enter,
    Backspace,
    Delete,
    Paste,
    Cut,
}

/// Event payload; which variant is populated depends on [`EventKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    None,
    Char(char),
    Text(String),
    Paste(PasteContent),
}

/// A discrete input event from the external input/selection layer.
#[derive(Debug, Clone, PartialEq)]
pub struct InputEvent {
    pub kind: EventKind,
    pub payload: EventPayload,
}

impl InputEvent {
    pub fn character(c: char) -> Self {
        Self {
            kind: EventKind::Char,
            payload: EventPayload::Char(c),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Char,
            payload: EventPayload::Text(text.into()),
        }
    }

    pub fn enter() -> Self {
        Self {
            kind: EventKind::Enter,
            payload: EventPayload::None,
        }
    }

    pub fn backspace() -> Self {
        Self {
            kind: EventKind::Backspace,
            payload: EventPayload::None,
        }
    }

    pub fn delete() -> Self {
        Self {
            kind: EventKind::Delete,
            payload: EventPayload::None,
        }
    }

    pub fn paste(content: PasteContent) -> Self {
        Self {
            kind: EventKind::Paste,
            payload: EventPayload::Paste(content),
        }
    }

    pub fn cut() -> Self {
        Self {
            kind: EventKind::Cut,
            payload: EventPayload::None,
        }
    }
}

/// Classification of an applied edit, used by history coalescing: rapid
/// edits of the same kind extend one pending undo entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    InsertText,
    DeleteBackward,
    DeleteForward,
    Structural,
}

/// The minimal contiguous span of blocks that changed and must be
/// re-rendered. `Single` covers the block and its descendants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyRange {
    None,
    Single(BlockKey),
    Span { start: BlockKey, end: BlockKey },
    Full,
}

impl DirtyRange {
    pub fn is_none(&self) -> bool {
        matches!(self, DirtyRange::None)
    }
}

/// What a controller did: the dirty range, the edit classification, and
/// (for cut) the extracted clipboard text.
#[derive(Debug, Clone, PartialEq)]
pub struct EditOutcome {
    pub dirty: DirtyRange,
    pub kind: EditKind,
    pub clipboard: Option<String>,
}

impl EditOutcome {
    pub fn noop() -> Self {
        Self {
            dirty: DirtyRange::None,
            kind: EditKind::Structural,
            clipboard: None,
        }
    }

    pub fn new(dirty: DirtyRange, kind: EditKind) -> Self {
        Self {
            dirty,
            kind,
            clipboard: None,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.dirty.is_none() && self.clipboard.is_none()
    }
}

/// Contract violations between the event producer and the controllers.
///
/// These are programming errors (wrong payload variant for the event
/// kind), not editing failures; editing failures degrade to no-ops.
#[derive(Debug, thiserror::Error)]
pub enum EditError {
    #[error("event {kind:?} carried an incompatible payload")]
    PayloadMismatch { kind: EventKind },
    #[error("no handler registered for event {0:?}")]
    UnhandledEvent(EventKind),
}

/// Mutable state a handler operates on: the tree plus the live selection.
pub struct EditContext<'a> {
    pub tree: &'a mut DocumentTree,
    pub selection: &'a mut Selection,
}

pub type EditHandler = fn(&mut EditContext, &InputEvent) -> Result<EditOutcome, EditError>;

/// Dispatch table mapping `(block tag, event kind)` to a handler.
///
/// Lookup tries the exact pair first, then the event kind's default. Block
/// kinds with special behavior (list items and table cells on Enter, code
/// blocks on Enter and Char) register overrides; everything else shares the
/// generic text handlers.
pub struct HandlerRegistry {
    handlers: HashMap<(BlockTag, EventKind), EditHandler>,
    defaults: HashMap<EventKind, EditHandler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            defaults: HashMap::new(),
        }
    }

    /// The standard capability table for the built-in block set.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register_default(EventKind::Char, input::handle_char);
        registry.register_default(EventKind::Enter, enter::handle_enter);
        registry.register_default(EventKind::Backspace, backspace::handle_backspace);
        registry.register_default(EventKind::Delete, delete_forward::handle_delete);
        registry.register_default(EventKind::Paste, clipboard::handle_paste);
        registry.register_default(EventKind::Cut, clipboard::handle_cut);

        registry.register(BlockTag::ListItem, EventKind::Enter, enter::handle_enter_list_item);
        registry.register(BlockTag::TableCell, EventKind::Enter, enter::handle_enter_table_cell);
        registry.register(BlockTag::CodeBlock, EventKind::Enter, enter::handle_enter_code_block);
        registry.register(BlockTag::CodeBlock, EventKind::Char, input::handle_char_verbatim);
        registry.register(BlockTag::FrontMatter, EventKind::Char, input::handle_char_verbatim);
        registry
    }

    pub fn register(&mut self, tag: BlockTag, kind: EventKind, handler: EditHandler) {
        self.handlers.insert((tag, kind), handler);
    }

    pub fn register_default(&mut self, kind: EventKind, handler: EditHandler) {
        self.defaults.insert(kind, handler);
    }

    pub fn resolve(&self, tag: BlockTag, kind: EventKind) -> Option<EditHandler> {
        self.handlers
            .get(&(tag, kind))
            .or_else(|| self.defaults.get(&kind))
            .copied()
    }

    /// Dispatch an event against the block currently under the caret.
    pub fn dispatch(
        &self,
        ctx: &mut EditContext,
        event: &InputEvent,
    ) -> Result<EditOutcome, EditError> {
        let Some(block) = ctx.tree.get(ctx.selection.focus.block) else {
            // Speculative cursor against a block that no longer exists
            return Ok(EditOutcome::noop());
        };
        let handler = self
            .resolve(block.kind.tag(), event.kind)
            .ok_or(EditError::UnhandledEvent(event.kind))?;
        handler(ctx, event)
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

// ---------------------------------------------------------------------------
// Shared helpers used by several controllers
// ---------------------------------------------------------------------------

/// Insert `text` into the block at `caret`, returning the caret after the
/// insertion. Caller has validated the caret.
pub(crate) fn insert_text_at(tree: &mut DocumentTree, caret: Caret, text: &str) -> Caret {
    if let Some(block) = tree.get_mut(caret.block) {
        let offset = caret.offset.min(block.text.len());
        block.text.insert_str(offset, text);
        Caret::new(caret.block, offset + text.len())
    } else {
        caret
    }
}

/// Remove container ancestors that no longer hold any text-bearing block,
/// walking up from `from` until the root or a non-empty container.
pub(crate) fn prune_empty_containers(tree: &mut DocumentTree, from: BlockKey) {
    let mut current = Some(from);
    while let Some(key) = current {
        if key == tree.root() {
            break;
        }
        let Some(block) = tree.get(key) else { break };
        if !block.kind.is_container() || tree.first_text_descendant(key).is_some() {
            break;
        }
        let parent = block.parent;
        let _ = tree.remove(key);
        current = parent;
    }
}

/// Delete the blocks and text covered by the active selection, collapsing
/// the caret to the selection start. Returns the dirty range, or `None`
/// when the selection was collapsed or invalid.
pub(crate) fn delete_selection(ctx: &mut EditContext) -> Option<DirtyRange> {
    if ctx.selection.is_collapsed() || !ctx.selection.is_valid(ctx.tree) {
        return None;
    }
    let (start, end) = ctx.selection.ordered(ctx.tree);

    if start.block == end.block {
        let block = ctx.tree.get_mut(start.block)?;
        block.text.replace_range(start.offset..end.offset, "");
        *ctx.selection = Selection::caret(start);
        return Some(DirtyRange::Single(start.block));
    }

    let keys = ctx.tree.text_block_keys();
    let from = keys.iter().position(|&k| k == start.block)?;
    let to = keys.iter().position(|&k| k == end.block)?;

    // Trim the boundary blocks, drop everything strictly between.
    if let Some(block) = ctx.tree.get_mut(start.block) {
        block.text.truncate(start.offset);
    }
    if let Some(block) = ctx.tree.get_mut(end.block) {
        block.text.replace_range(..end.offset.min(block.text.len()), "");
    }
    for &key in &keys[from + 1..to] {
        let parent = ctx.tree.get(key).and_then(|b| b.parent);
        let _ = ctx.tree.remove(key);
        if let Some(parent) = parent {
            prune_empty_containers(ctx.tree, parent);
        }
    }

    // Join the two boundary blocks when their kinds allow it; otherwise
    // both survive trimmed.
    let end_parent = ctx.tree.get(end.block).and_then(|b| b.parent);
    if ctx.tree.merge(start.block, end.block).is_ok()
        && let Some(parent) = end_parent
    {
        prune_empty_containers(ctx.tree, parent);
    }

    *ctx.selection = Selection::caret(start);
    Some(DirtyRange::Single(start.block))
}
