//! Forward delete: the mirror of Backspace, operating ahead of the caret.

use crate::controllers::{
    delete_selection, prune_empty_containers, DirtyRange, EditContext, EditError, EditKind,
    EditOutcome, InputEvent,
};
use crate::cursor::Selection;

pub(super) fn handle_delete(
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
    let text_len = ctx.tree.get(key).expect("validated").text.len();

    if caret.offset < text_len {
        let block = ctx.tree.get_mut(key).expect("validated");
        let removed = block.text[caret.offset..]
            .chars()
            .next()
            .map_or(0, char::len_utf8);
        block.text.replace_range(caret.offset..caret.offset + removed, "");
        // Caret stays put for a forward delete
        return Ok(EditOutcome::new(
            DirtyRange::Single(key),
            EditKind::DeleteForward,
        ));
    }

    // End of block: pull the next text block into this one.
    let Some(next) = ctx.tree.next_text_block(key) else {
        return Ok(EditOutcome::noop());
    };
    let next_parent = ctx.tree.get(next).and_then(|b| b.parent);
    match ctx.tree.merge(key, next) {
        Ok(_) => {
            if let Some(parent) = next_parent {
                prune_empty_containers(ctx.tree, parent);
            }
            Ok(EditOutcome::new(DirtyRange::Single(key), EditKind::Structural))
        }
        // Incompatible neighbor: leave both blocks alone, park the caret
        // at the start of the next one.
        Err(_) => {
            *ctx.selection = Selection::collapsed_at(next, 0);
            Ok(EditOutcome::noop())
        }
    }
}
