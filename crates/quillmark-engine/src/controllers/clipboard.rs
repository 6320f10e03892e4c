//! Paste and cut.
//!
//! Paste accepts either plain text or a pre-segmented list of block
//! templates from the external paste-normalization collaborator. Rich
//! content that cannot be mapped onto the block set degrades to plain
//! text; structured paste mid-block splits the host. Cut extracts the
//! selection as text and then deletes it.

use serde::{Deserialize, Serialize};

use crate::controllers::{
    delete_selection, insert_text_at, DirtyRange, EditContext, EditError, EditKind, EditOutcome,
    EventPayload, InputEvent,
};
use crate::cursor::{extract_range_text, BlockTemplate, Caret, Selection};
use crate::tree::{Block, BlockKey, BlockKind, DocumentTree};

/// Externally supplied clipboard content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PasteContent {
    PlainText(String),
    Blocks(Vec<BlockTemplate>),
}

pub(super) fn handle_paste(
    ctx: &mut EditContext,
    event: &InputEvent,
) -> Result<EditOutcome, EditError> {
    let EventPayload::Paste(content) = &event.payload else {
        return Err(EditError::PayloadMismatch { kind: event.kind });
    };

    delete_selection(ctx);
    let caret = ctx.selection.focus;
    if !caret.is_valid(ctx.tree) {
        return Ok(EditOutcome::noop());
    }

    let host_kind = ctx.tree.get(caret.block).expect("validated").kind.clone();
    match content {
        PasteContent::PlainText(text) => paste_plain_text(ctx, caret, text, &host_kind),
        PasteContent::Blocks(templates) => {
            // Rich paste into a verbatim block cannot be mapped; fall back
            // to its flattened text.
            if matches!(host_kind, BlockKind::CodeBlock { .. } | BlockKind::FrontMatter) {
                let flattened = flatten_templates(templates);
                return paste_plain_text(ctx, caret, &flattened, &host_kind);
            }
            paste_blocks(ctx, caret, templates)
        }
    }
}

pub(super) fn handle_cut(
    ctx: &mut EditContext,
    _event: &InputEvent,
) -> Result<EditOutcome, EditError> {
    if ctx.selection.is_collapsed() || !ctx.selection.is_valid(ctx.tree) {
        return Ok(EditOutcome::noop());
    }
    let (start, end) = ctx.selection.ordered(ctx.tree);
    let text = extract_range_text(ctx.tree, &start, &end);
    let dirty = delete_selection(ctx).unwrap_or(DirtyRange::None);
    Ok(EditOutcome {
        dirty,
        kind: EditKind::Structural,
        clipboard: Some(text),
    })
}

/// Insert plain text at the caret. Single-line text lands inside the host
/// block; multi-line text splits the host and fills the gap with
/// paragraphs (or stays verbatim inside a code block).
fn paste_plain_text(
    ctx: &mut EditContext,
    caret: Caret,
    text: &str,
    host_kind: &BlockKind,
) -> Result<EditOutcome, EditError> {
    if matches!(host_kind, BlockKind::CodeBlock { .. } | BlockKind::FrontMatter)
        || !text.contains('\n')
    {
        let after = insert_text_at(ctx.tree, caret, text);
        *ctx.selection = Selection::caret(after);
        return Ok(EditOutcome::new(
            DirtyRange::Single(caret.block),
            EditKind::Structural,
        ));
    }

    let mut lines = text.split('\n');
    let first = lines.next().unwrap_or_default();

    let after_first = insert_text_at(ctx.tree, caret, first);
    let Ok(right) = ctx.tree.split(caret.block, after_first.offset) else {
        // Unsplittable host: keep everything inline as a single insertion
        let rest: String = text[first.len()..].replace('\n', " ");
        let after = insert_text_at(ctx.tree, after_first, &rest);
        *ctx.selection = Selection::caret(after);
        return Ok(EditOutcome::new(
            DirtyRange::Single(caret.block),
            EditKind::Structural,
        ));
    };

    let mut anchor = caret.block;
    let mut last_caret = Caret::new(right, 0);
    for line in lines {
        let para = Block::paragraph(line);
        let para_key = para.key;
        if ctx.tree.insert_after(para, anchor).is_ok() {
            anchor = para_key;
            last_caret = Caret::new(para_key, line.len());
        }
    }
    // The trailing split half absorbs the final pasted line
    let final_offset = last_caret.offset;
    if let Ok(offset) = ctx.tree.merge(last_caret.block, right) {
        debug_assert_eq!(offset, final_offset);
    }
    *ctx.selection = Selection::caret(last_caret);
    Ok(EditOutcome::new(
        DirtyRange::Span {
            start: caret.block,
            end: last_caret.block,
        },
        EditKind::Structural,
    ))
}

/// Insert structured templates at the caret, splitting the host when the
/// insertion point is mid-text.
fn paste_blocks(
    ctx: &mut EditContext,
    caret: Caret,
    templates: &[BlockTemplate],
) -> Result<EditOutcome, EditError> {
    if templates.is_empty() {
        return Ok(EditOutcome::noop());
    }

    let host = caret.block;
    let host_len = ctx.tree.get(host).map_or(0, |b| b.text.len());
    let mid_text = caret.offset > 0 && caret.offset < host_len;
    if mid_text && ctx.tree.split(host, caret.offset).is_err() {
        // Unsplittable host: degrade to flattened text
        let flattened = flatten_templates(templates);
        let host_kind = ctx.tree.get(host).expect("validated").kind.clone();
        return paste_plain_text(ctx, caret, &flattened, &host_kind);
    }

    let mut anchor = host;
    let mut last_text_key = None;
    let mut index = 0;
    while index < templates.len() {
        // Bare list items arrive flat from range extraction; group each
        // run of them under one list container.
        if matches!(templates[index].kind, BlockKind::ListItem { .. }) {
            let run_end = templates[index..]
                .iter()
                .position(|t| !matches!(t.kind, BlockKind::ListItem { .. }))
                .map_or(templates.len(), |n| index + n);
            let list = Block::new(BlockKind::List { ordered: false }, "");
            let list_key = list.key;
            if ctx.tree.insert_after(list, anchor).is_ok() {
                for template in &templates[index..run_end] {
                    if let Some(key) = instantiate(ctx.tree, list_key, template) {
                        last_text_key = Some(key);
                    }
                }
                anchor = list_key;
            }
            index = run_end;
            continue;
        }

        let mapped = map_template(&templates[index]);
        let block = Block::new(mapped.kind, mapped.text.clone());
        let block_key = block.key;
        if ctx.tree.insert_after(block, anchor).is_ok() {
            for child in &mapped.children {
                instantiate(ctx.tree, block_key, child);
            }
            if ctx
                .tree
                .get(block_key)
                .is_some_and(|b| b.kind.is_text_bearing())
            {
                last_text_key = Some(block_key);
            } else if let Some(text_key) = ctx.tree.last_text_descendant(block_key) {
                last_text_key = Some(text_key);
            }
            anchor = block_key;
        }
        index += 1;
    }

    if let Some(last) = last_text_key {
        let offset = ctx.tree.get(last).map_or(0, |b| b.text.len());
        *ctx.selection = Selection::collapsed_at(last, offset);
    }

    // An empty host paragraph adds nothing around a structured paste
    if host_len == 0
        && caret.offset == 0
        && ctx
            .tree
            .get(host)
            .is_some_and(|b| b.kind == BlockKind::Paragraph && b.text.is_empty())
    {
        let _ = ctx.tree.remove(host);
    }

    Ok(EditOutcome::new(DirtyRange::Full, EditKind::Structural))
}

/// Recursively instantiate a template under `parent` with fresh keys.
/// Returns the key of the deepest text-bearing block created.
fn instantiate(tree: &mut DocumentTree, parent: BlockKey, template: &BlockTemplate) -> Option<BlockKey> {
    let mapped = map_template(template);
    let block = Block::new(mapped.kind, mapped.text.clone());
    let key = tree.append_child(parent, block).ok()?;
    let mut last = tree.get(key).filter(|b| b.kind.is_text_bearing()).map(|b| b.key);
    for child in &mapped.children {
        if let Some(k) = instantiate(tree, key, child) {
            last = Some(k);
        }
    }
    last
}

/// Map a template onto the block-type set, degrading kinds that make no
/// sense outside their original context (stray table cells, rows).
fn map_template(template: &BlockTemplate) -> BlockTemplate {
    match template.kind {
        BlockKind::TableCell { .. } | BlockKind::TableRow | BlockKind::Document => BlockTemplate {
            kind: BlockKind::Paragraph,
            text: template.text.clone(),
            children: template.children.clone(),
        },
        _ => template.clone(),
    }
}

fn flatten_templates(templates: &[BlockTemplate]) -> String {
    fn collect(template: &BlockTemplate, out: &mut Vec<String>) {
        if template.kind.is_text_bearing() || !template.text.is_empty() {
            out.push(template.text.clone());
        }
        for child in &template.children {
            collect(child, out);
        }
    }
    let mut lines = Vec::new();
    for template in templates {
        collect(template, &mut lines);
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::{EditContext, HandlerRegistry, InputEvent};
    use pretty_assertions::assert_eq;

    fn dispatch(tree: &mut DocumentTree, selection: &mut Selection, event: InputEvent) -> EditOutcome {
        let registry = HandlerRegistry::standard();
        let mut ctx = EditContext {
            tree: &mut *tree,
            selection: &mut *selection,
        };
        registry.dispatch(&mut ctx, &event).unwrap()
    }

    #[test]
    fn test_paste_single_line_inserts_inline() {
        let mut tree = DocumentTree::new();
        let root = tree.root();
        let p = tree.append_child(root, Block::paragraph("ad")).unwrap();
        let mut selection = Selection::collapsed_at(p, 1);

        dispatch(
            &mut tree,
            &mut selection,
            InputEvent::paste(PasteContent::PlainText("bc".into())),
        );
        assert_eq!(tree.get(p).unwrap().text, "abcd");
        assert_eq!(selection, Selection::collapsed_at(p, 3));
    }

    #[test]
    fn test_paste_multiline_splits_host() {
        let mut tree = DocumentTree::new();
        let root = tree.root();
        let p = tree.append_child(root, Block::paragraph("startend")).unwrap();
        let mut selection = Selection::collapsed_at(p, 5);

        dispatch(
            &mut tree,
            &mut selection,
            InputEvent::paste(PasteContent::PlainText("one\ntwo\nthree".into())),
        );

        let texts: Vec<String> = tree
            .text_block_keys()
            .iter()
            .map(|&k| tree.get(k).unwrap().text.clone())
            .collect();
        assert_eq!(texts, vec!["startone", "two", "threeend"]);
        let caret = selection.focus;
        assert_eq!(tree.get(caret.block).unwrap().text, "threeend");
        assert_eq!(caret.offset, 5);
        tree.check_invariants();
    }

    #[test]
    fn test_paste_into_code_block_stays_verbatim() {
        let mut tree = DocumentTree::new();
        let root = tree.root();
        let code = tree
            .append_child(root, Block::new(BlockKind::CodeBlock { language: None }, ""))
            .unwrap();
        let mut selection = Selection::collapsed_at(code, 0);

        dispatch(
            &mut tree,
            &mut selection,
            InputEvent::paste(PasteContent::PlainText("line1\nline2".into())),
        );
        assert_eq!(tree.get(code).unwrap().text, "line1\nline2");
        assert_eq!(tree.text_block_keys().len(), 1);
    }

    #[test]
    fn test_paste_blocks_inserts_structure() {
        let mut tree = DocumentTree::new();
        let root = tree.root();
        let p = tree.append_child(root, Block::paragraph("")).unwrap();
        let mut selection = Selection::collapsed_at(p, 0);

        let templates = vec![
            BlockTemplate::new(BlockKind::Heading { level: 2 }, "Title"),
            BlockTemplate::paragraph("Body text"),
        ];
        dispatch(
            &mut tree,
            &mut selection,
            InputEvent::paste(PasteContent::Blocks(templates)),
        );

        let keys = tree.text_block_keys();
        assert_eq!(keys.len(), 2, "empty host paragraph replaced by paste");
        assert_eq!(tree.get(keys[0]).unwrap().kind, BlockKind::Heading { level: 2 });
        assert_eq!(tree.get(keys[1]).unwrap().text, "Body text");
        assert_eq!(selection, Selection::collapsed_at(keys[1], 9));
        tree.check_invariants();
    }

    #[test]
    fn test_paste_bare_list_items_get_wrapped_in_a_list() {
        let mut tree = DocumentTree::new();
        let root = tree.root();
        let p = tree.append_child(root, Block::paragraph("")).unwrap();
        let mut selection = Selection::collapsed_at(p, 0);

        let templates = vec![
            BlockTemplate::new(BlockKind::ListItem { task: None }, "one"),
            BlockTemplate::new(BlockKind::ListItem { task: None }, "two"),
        ];
        dispatch(
            &mut tree,
            &mut selection,
            InputEvent::paste(PasteContent::Blocks(templates)),
        );

        let items = tree.text_block_keys();
        assert_eq!(items.len(), 2);
        let list = tree.get(items[0]).unwrap().parent.unwrap();
        assert_eq!(tree.get(list).unwrap().kind, BlockKind::List { ordered: false });
        assert_eq!(tree.get(list).unwrap().children.len(), 2);
        tree.check_invariants();
    }

    #[test]
    fn test_paste_rich_content_into_code_block_degrades_to_text() {
        let mut tree = DocumentTree::new();
        let root = tree.root();
        let code = tree
            .append_child(root, Block::new(BlockKind::CodeBlock { language: None }, ""))
            .unwrap();
        let mut selection = Selection::collapsed_at(code, 0);

        let templates = vec![
            BlockTemplate::new(BlockKind::Heading { level: 1 }, "Title"),
            BlockTemplate::paragraph("Body"),
        ];
        dispatch(
            &mut tree,
            &mut selection,
            InputEvent::paste(PasteContent::Blocks(templates)),
        );
        assert_eq!(tree.get(code).unwrap().text, "Title\nBody");
        assert_eq!(tree.text_block_keys().len(), 1);
    }

    #[test]
    fn test_cut_returns_text_and_deletes_range() {
        let mut tree = DocumentTree::new();
        let root = tree.root();
        let a = tree.append_child(root, Block::paragraph("alpha")).unwrap();
        let b = tree.append_child(root, Block::paragraph("beta")).unwrap();
        let mut selection = Selection::new(Caret::new(a, 2), Caret::new(b, 2));

        let outcome = dispatch(&mut tree, &mut selection, InputEvent::cut());
        assert_eq!(outcome.clipboard.as_deref(), Some("pha\nbe"));
        assert_eq!(tree.get(a).unwrap().text, "alta");
        assert!(!tree.contains(b));
        assert_eq!(selection, Selection::collapsed_at(a, 2));
    }

    #[test]
    fn test_cut_with_collapsed_selection_is_noop() {
        let mut tree = DocumentTree::new();
        let root = tree.root();
        let p = tree.append_child(root, Block::paragraph("text")).unwrap();
        let mut selection = Selection::collapsed_at(p, 2);

        let outcome = dispatch(&mut tree, &mut selection, InputEvent::cut());
        assert!(outcome.is_noop());
        assert!(outcome.clipboard.is_none());
        assert_eq!(tree.get(p).unwrap().text, "text");
    }
}
