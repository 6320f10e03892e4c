//! Backspace semantics.
//!
//! With a selection active the whole range goes. A caret past offset 0
//! deletes one char. At offset 0 the order of fallbacks is: unwrap a sole
//! child out of its blockquote, merge into the previous text block when the
//! kinds allow it, lift a first list item out as a paragraph, and otherwise
//! just move the caret to the end of the unmergeable previous block.

use crate::controllers::{
    delete_selection, prune_empty_containers, DirtyRange, EditContext, EditError, EditKind,
    EditOutcome, InputEvent,
};
use crate::cursor::Selection;
use crate::tree::BlockKind;

pub(super) fn handle_backspace(
    ctx: &mut EditContext,
    _event: &InputEvent,
) -> Result<EditOutcome, EditError> {
    if !ctx.selection.is_collapsed() {
        return Ok(match delete_selection(ctx) {
            Some(dirty) => EditOutcome::new(dirty, EditKind::Structural),
            None => EditOutcome::noop(),
        });
    }

    let caret = ctx.selection.focus;
    if !caret.is_valid(ctx.tree) {
        return Ok(EditOutcome::noop());
    }
    let key = caret.block;

    if caret.offset > 0 {
        // Plain character deletion, respecting char boundaries
        let block = ctx.tree.get_mut(key).expect("validated");
        let removed = block.text[..caret.offset]
            .chars()
            .next_back()
            .map_or(0, char::len_utf8);
        let new_offset = caret.offset - removed;
        block.text.replace_range(new_offset..caret.offset, "");
        *ctx.selection = Selection::collapsed_at(key, new_offset);
        return Ok(EditOutcome::new(
            DirtyRange::Single(key),
            EditKind::DeleteBackward,
        ));
    }

    // Offset 0: structural fallback chain.
    let block = ctx.tree.get(key).expect("validated");
    let kind = block.kind.clone();
    let parent = block.parent;

    // Sole child of a blockquote unwraps out of the container.
    if let Some(container) = parent
        && let Some(parent_block) = ctx.tree.get(container)
        && parent_block.kind == BlockKind::BlockQuote
        && parent_block.children.len() == 1
    {
        let Ok(subtree) = ctx.tree.detach(key) else {
            return Ok(EditOutcome::noop());
        };
        if ctx.tree.attach_before(subtree, container).is_err() {
            return Ok(EditOutcome::noop());
        }
        let _ = ctx.tree.remove(container);
        *ctx.selection = Selection::collapsed_at(key, 0);
        return Ok(EditOutcome::new(DirtyRange::Single(key), EditKind::Structural));
    }

    let prev = ctx.tree.prev_text_block(key);

    // Merge into the previous text block when the kinds are compatible.
    if let Some(prev) = prev
        && let Some(prev_block) = ctx.tree.get(prev)
        && prev_block.kind.can_merge_with(&kind)
    {
        let old_parent = parent;
        match ctx.tree.merge(prev, key) {
            Ok(offset) => {
                if let Some(old_parent) = old_parent {
                    prune_empty_containers(ctx.tree, old_parent);
                }
                *ctx.selection = Selection::collapsed_at(prev, offset);
                return Ok(EditOutcome::new(
                    DirtyRange::Single(prev),
                    EditKind::Structural,
                ));
            }
            Err(_) => return Ok(EditOutcome::noop()),
        }
    }

    // A first list item with nothing to merge into converts back to a
    // paragraph lifted out before its list.
    if matches!(kind, BlockKind::ListItem { .. })
        && let Some(list) = parent
    {
        let Ok(subtree) = ctx.tree.detach(key) else {
            return Ok(EditOutcome::noop());
        };
        if ctx.tree.attach_before(subtree, list).is_err() {
            return Ok(EditOutcome::noop());
        }
        let _ = ctx.tree.replace_kind(key, BlockKind::Paragraph);
        prune_empty_containers(ctx.tree, list);
        *ctx.selection = Selection::collapsed_at(key, 0);
        return Ok(EditOutcome::new(DirtyRange::Single(key), EditKind::Structural));
    }

    // Incompatible previous block (e.g. code fence above a paragraph):
    // leave the tree untouched, just land the caret at its end.
    if let Some(prev) = prev {
        let end = ctx.tree.get(prev).map_or(0, |b| b.text.len());
        *ctx.selection = Selection::collapsed_at(prev, end);
    }
    Ok(EditOutcome::noop())
}
