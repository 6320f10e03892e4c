//! Enter key semantics per block kind.
//!
//! The generic handler splits the block at the caret. List items add the
//! "double Enter exits the list" rule, table cells navigate or grow the
//! table, and code blocks take a literal newline with the current line's
//! indentation instead of splitting.

use crate::controllers::{
    delete_selection, insert_text_at, prune_empty_containers, DirtyRange, EditContext, EditError,
    EditKind, EditOutcome, InputEvent,
};
use crate::cursor::{Caret, Selection};
use crate::tree::{Block, BlockKind, CellAlign};

/// Generic Enter: split the caret block into two siblings, caret at the
/// start of the right half.
pub(super) fn handle_enter(
    ctx: &mut EditContext,
    _event: &InputEvent,
) -> Result<EditOutcome, EditError> {
    delete_selection(ctx);
    let caret = ctx.selection.focus;
    if !caret.is_valid(ctx.tree) {
        return Ok(EditOutcome::noop());
    }
    match ctx.tree.split(caret.block, caret.offset) {
        Ok(right) => {
            *ctx.selection = Selection::collapsed_at(right, 0);
            Ok(EditOutcome::new(
                DirtyRange::Span {
                    start: caret.block,
                    end: right,
                },
                EditKind::Structural,
            ))
        }
        // Unsplittable block (thematic break, front matter): leave it alone
        Err(_) => Ok(EditOutcome::noop()),
    }
}

/// Enter in a list item: a new sibling item, except that Enter on an empty
/// item converts it back to a paragraph lifted out after the list. Pressing
/// Enter twice therefore exits the list, and an emptied list disappears.
pub(super) fn handle_enter_list_item(
    ctx: &mut EditContext,
    event: &InputEvent,
) -> Result<EditOutcome, EditError> {
    delete_selection(ctx);
    let caret = ctx.selection.focus;
    if !caret.is_valid(ctx.tree) {
        return Ok(EditOutcome::noop());
    }
    let key = caret.block;
    let Some(block) = ctx.tree.get(key) else {
        return Ok(EditOutcome::noop());
    };

    if block.text.is_empty() && block.children.is_empty() {
        // Exit the list: the item becomes a paragraph placed after it
        let Some(list) = block.parent else {
            return Ok(EditOutcome::noop());
        };
        let Ok(item) = ctx.tree.detach(key) else {
            return Ok(EditOutcome::noop());
        };
        if ctx.tree.attach_after(item, list).is_err() {
            return Ok(EditOutcome::noop());
        }
        let _ = ctx.tree.replace_kind(key, BlockKind::Paragraph);
        prune_empty_containers(ctx.tree, list);
        *ctx.selection = Selection::collapsed_at(key, 0);
        let dirty = if ctx.tree.contains(list) {
            DirtyRange::Span {
                start: list,
                end: key,
            }
        } else {
            DirtyRange::Single(key)
        };
        return Ok(EditOutcome::new(dirty, EditKind::Structural));
    }

    handle_enter(ctx, event)
}

/// Enter in a table cell: advance to the next cell, or append a fresh row
/// when the caret sits in the last cell of the last row.
pub(super) fn handle_enter_table_cell(
    ctx: &mut EditContext,
    _event: &InputEvent,
) -> Result<EditOutcome, EditError> {
    let caret = ctx.selection.focus;
    if !caret.is_valid(ctx.tree) {
        return Ok(EditOutcome::noop());
    }
    let cell = caret.block;
    let Some(row) = ctx.tree.get(cell).and_then(|b| b.parent) else {
        return Ok(EditOutcome::noop());
    };
    let Some(table) = ctx.tree.get(row).and_then(|b| b.parent) else {
        return Ok(EditOutcome::noop());
    };
    let Ok(cell_index) = ctx.tree.child_index(cell) else {
        return Ok(EditOutcome::noop());
    };
    let Ok(row_index) = ctx.tree.child_index(row) else {
        return Ok(EditOutcome::noop());
    };

    let row_cells = ctx.tree.get(row).map(|b| b.children.clone()).unwrap_or_default();
    if let Some(&next_cell) = row_cells.get(cell_index + 1) {
        *ctx.selection = Selection::collapsed_at(next_cell, 0);
        return Ok(EditOutcome::new(DirtyRange::None, EditKind::Structural));
    }

    let table_rows = ctx.tree.get(table).map(|b| b.children.clone()).unwrap_or_default();
    if let Some(&next_row) = table_rows.get(row_index + 1) {
        if let Some(first_cell) = ctx.tree.get(next_row).and_then(|b| b.children.first().copied()) {
            *ctx.selection = Selection::collapsed_at(first_cell, 0);
            return Ok(EditOutcome::new(DirtyRange::None, EditKind::Structural));
        }
        return Ok(EditOutcome::noop());
    }

    // Last cell of the last row: grow the table by one row, preserving
    // each column's alignment.
    let aligns: Vec<CellAlign> = row_cells
        .iter()
        .map(|&k| match ctx.tree.get(k).map(|b| &b.kind) {
            Some(BlockKind::TableCell { align }) => *align,
            _ => CellAlign::None,
        })
        .collect();
    let Ok(new_row) = ctx.tree.append_child(table, Block::new(BlockKind::TableRow, "")) else {
        return Ok(EditOutcome::noop());
    };
    let mut first_new_cell = None;
    for align in aligns {
        if let Ok(cell_key) = ctx
            .tree
            .append_child(new_row, Block::new(BlockKind::TableCell { align }, ""))
        {
            first_new_cell.get_or_insert(cell_key);
        }
    }
    if let Some(target) = first_new_cell {
        *ctx.selection = Selection::collapsed_at(target, 0);
    }
    Ok(EditOutcome::new(DirtyRange::Single(table), EditKind::Structural))
}

/// Enter in a code block: a literal line break plus the current line's
/// leading indentation; the block never splits.
pub(super) fn handle_enter_code_block(
    ctx: &mut EditContext,
    _event: &InputEvent,
) -> Result<EditOutcome, EditError> {
    delete_selection(ctx);
    let caret = ctx.selection.focus;
    if !caret.is_valid(ctx.tree) {
        return Ok(EditOutcome::noop());
    }
    let Some(block) = ctx.tree.get(caret.block) else {
        return Ok(EditOutcome::noop());
    };
    let offset = caret.offset.min(block.text.len());
    let line_start = block.text[..offset].rfind('\n').map_or(0, |i| i + 1);
    let indent: String = block.text[line_start..offset]
        .chars()
        .take_while(|&c| c == ' ' || c == '\t')
        .collect();

    let insertion = format!("\n{indent}");
    let after = insert_text_at(ctx.tree, Caret::new(caret.block, offset), &insertion);
    *ctx.selection = Selection::caret(after);
    Ok(EditOutcome::new(
        DirtyRange::Single(caret.block),
        EditKind::InsertText,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::{EditContext, HandlerRegistry, InputEvent};
    use crate::cursor::Selection;
    use crate::tree::{Block, BlockKey, BlockKind, DocumentTree};
    use pretty_assertions::assert_eq;

    fn press_enter(tree: &mut DocumentTree, selection: &mut Selection) {
        let registry = HandlerRegistry::standard();
        let mut ctx = EditContext {
            tree: &mut *tree,
            selection: &mut *selection,
        };
        registry.dispatch(&mut ctx, &InputEvent::enter()).unwrap();
    }

    #[test]
    fn test_enter_splits_paragraph_at_caret() {
        // "HelloWorld" with caret at 5 becomes "Hello" and
        // "World", caret at the start of the second.
        let mut tree = DocumentTree::new();
        let root = tree.root();
        let p = tree.append_child(root, Block::paragraph("HelloWorld")).unwrap();
        let mut selection = Selection::collapsed_at(p, 5);

        press_enter(&mut tree, &mut selection);

        let keys = tree.text_block_keys();
        assert_eq!(keys.len(), 2);
        assert_eq!(tree.get(keys[0]).unwrap().text, "Hello");
        assert_eq!(tree.get(keys[1]).unwrap().text, "World");
        assert_eq!(selection, Selection::collapsed_at(keys[1], 0));
        tree.check_invariants();
    }

    #[test]
    fn test_enter_in_list_item_creates_sibling_item() {
        let mut tree = DocumentTree::new();
        let root = tree.root();
        let list = tree
            .append_child(root, Block::new(BlockKind::List { ordered: false }, ""))
            .unwrap();
        let item = tree
            .append_child(list, Block::new(BlockKind::ListItem { task: None }, "ab"))
            .unwrap();
        let mut selection = Selection::collapsed_at(item, 1);

        press_enter(&mut tree, &mut selection);

        let items = tree.get(list).unwrap().children.clone();
        assert_eq!(items.len(), 2);
        assert_eq!(tree.get(items[0]).unwrap().text, "a");
        assert_eq!(tree.get(items[1]).unwrap().text, "b");
        assert_eq!(tree.get(items[1]).unwrap().kind, BlockKind::ListItem { task: None });
        tree.check_invariants();
    }

    #[test]
    fn test_double_enter_exits_list() {
        // Sole empty list item + Enter leaves a plain empty
        // paragraph and no list.
        let mut tree = DocumentTree::new();
        let root = tree.root();
        let list = tree
            .append_child(root, Block::new(BlockKind::List { ordered: false }, ""))
            .unwrap();
        let item = tree
            .append_child(list, Block::new(BlockKind::ListItem { task: None }, ""))
            .unwrap();
        let mut selection = Selection::collapsed_at(item, 0);

        press_enter(&mut tree, &mut selection);

        assert!(!tree.contains(list), "emptied list should be removed");
        let block = tree.get(item).unwrap();
        assert_eq!(block.kind, BlockKind::Paragraph);
        assert_eq!(block.text, "");
        assert_eq!(block.parent, Some(root));
        assert_eq!(selection, Selection::collapsed_at(item, 0));
        tree.check_invariants();
    }

    #[test]
    fn test_enter_on_last_empty_item_keeps_earlier_items() {
        let mut tree = DocumentTree::new();
        let root = tree.root();
        let list = tree
            .append_child(root, Block::new(BlockKind::List { ordered: false }, ""))
            .unwrap();
        let first = tree
            .append_child(list, Block::new(BlockKind::ListItem { task: None }, "kept"))
            .unwrap();
        let empty = tree
            .append_child(list, Block::new(BlockKind::ListItem { task: None }, ""))
            .unwrap();
        let mut selection = Selection::collapsed_at(empty, 0);

        press_enter(&mut tree, &mut selection);

        assert!(tree.contains(list));
        assert_eq!(tree.get(list).unwrap().children, vec![first]);
        assert_eq!(tree.get(empty).unwrap().kind, BlockKind::Paragraph);
        assert_eq!(tree.get(empty).unwrap().parent, Some(root));
        tree.check_invariants();
    }

    fn build_table(tree: &mut DocumentTree, rows: usize, cols: usize) -> (BlockKey, Vec<Vec<BlockKey>>) {
        let root = tree.root();
        let table = tree.append_child(root, Block::new(BlockKind::Table, "")).unwrap();
        let mut cells = Vec::new();
        for r in 0..rows {
            let row = tree.append_child(table, Block::new(BlockKind::TableRow, "")).unwrap();
            let mut row_cells = Vec::new();
            for c in 0..cols {
                let cell = tree
                    .append_child(
                        row,
                        Block::new(
                            BlockKind::TableCell { align: CellAlign::None },
                            format!("r{r}c{c}"),
                        ),
                    )
                    .unwrap();
                row_cells.push(cell);
            }
            cells.push(row_cells);
        }
        (table, cells)
    }

    #[test]
    fn test_enter_moves_to_next_cell() {
        let mut tree = DocumentTree::new();
        let (_, cells) = build_table(&mut tree, 2, 2);
        let mut selection = Selection::collapsed_at(cells[0][0], 4);

        press_enter(&mut tree, &mut selection);
        assert_eq!(selection, Selection::collapsed_at(cells[0][1], 0));

        press_enter(&mut tree, &mut selection);
        assert_eq!(selection, Selection::collapsed_at(cells[1][0], 0));
    }

    #[test]
    fn test_enter_in_last_cell_appends_row() {
        let mut tree = DocumentTree::new();
        let (table, cells) = build_table(&mut tree, 1, 3);
        let mut selection = Selection::collapsed_at(cells[0][2], 4);

        press_enter(&mut tree, &mut selection);

        let rows = tree.get(table).unwrap().children.clone();
        assert_eq!(rows.len(), 2);
        let new_cells = tree.get(rows[1]).unwrap().children.clone();
        assert_eq!(new_cells.len(), 3);
        assert_eq!(selection, Selection::collapsed_at(new_cells[0], 0));
        tree.check_invariants();
    }

    #[test]
    fn test_enter_in_code_block_keeps_indentation() {
        let mut tree = DocumentTree::new();
        let root = tree.root();
        let code = tree
            .append_child(
                root,
                Block::new(
                    BlockKind::CodeBlock { language: Some("rust".into()) },
                    "fn main() {\n    let x = 1;",
                ),
            )
            .unwrap();
        let text_len = tree.get(code).unwrap().text.len();
        let mut selection = Selection::collapsed_at(code, text_len);

        press_enter(&mut tree, &mut selection);

        let block = tree.get(code).unwrap();
        assert_eq!(block.text, "fn main() {\n    let x = 1;\n    ");
        assert_eq!(selection, Selection::collapsed_at(code, block.text.len()));
        // Still one single code block
        assert_eq!(tree.text_block_keys().len(), 1);
    }

    #[test]
    fn test_enter_on_thematic_break_is_noop() {
        let mut tree = DocumentTree::new();
        let root = tree.root();
        let hr = tree.append_child(root, Block::new(BlockKind::ThematicBreak, "")).unwrap();
        let mut selection = Selection::collapsed_at(hr, 0);

        let before = tree.clone();
        press_enter(&mut tree, &mut selection);
        assert_eq!(tree, before);
    }
}
