//! Character input and the inline pattern recognizer.
//!
//! Every insertion into a plain paragraph is followed by one pass over the
//! block's leading text against a fixed, ordered rule set. The first rule
//! that matches converts the block in place (the key survives), consumes
//! the marker text, and re-anchors the caret at the same logical offset in
//! what remains. At most one rule fires per keystroke; no match leaves the
//! block a paragraph.
//!
//! Markers that extend an already-fired rule convert in a second stage:
//! `- ` becomes a bullet item at the space, and a `[x] ` then typed at the
//! start of the item upgrades it to a task. A fence's info line likewise
//! stays open after ``` fires: until any text lands in the code block,
//! typed language characters extend the language.

use std::sync::LazyLock;

use regex::Regex;

use crate::controllers::{
    delete_selection, insert_text_at, DirtyRange, EditContext, EditError, EditKind, EditOutcome,
    EventPayload, InputEvent,
};
use crate::cursor::Selection;
use crate::tree::{Block, BlockKey, BlockKind};

static RE_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6}) (.*)$").expect("valid regex"));
static RE_TASK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-*+] \[([ xX])\] (.*)$").expect("valid regex"));
static RE_BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-*+] (.*)$").expect("valid regex"));
static RE_ORDERED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,9})[.)] (.*)$").expect("valid regex"));
static RE_BLOCKQUOTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^> (.*)$").expect("valid regex"));
static RE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:`{3}|~{3})([A-Za-z0-9_+-]*)[ \t]*$").expect("valid regex"));
static RE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:-{3,}|\*{3,}|_{3,})$").expect("valid regex"));
static RE_TASK_BOX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[([ xX])\] (.*)$").expect("valid regex"));

/// Generic character handler: delete any active selection, insert at the
/// caret, then run the pattern recognizer on paragraphs.
pub(super) fn handle_char(
    ctx: &mut EditContext,
    event: &InputEvent,
) -> Result<EditOutcome, EditError> {
    insert_payload(ctx, event, true)
}

/// Verbatim variant for code blocks and front matter: characters land in
/// the text untouched, markers never convert the block.
pub(super) fn handle_char_verbatim(
    ctx: &mut EditContext,
    event: &InputEvent,
) -> Result<EditOutcome, EditError> {
    // A fence fresh from the recognizer is still on its info line: while
    // the block's text is empty, language characters extend the language.
    if let EventPayload::Char(c) = &event.payload
        && (c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '-'))
    {
        let c = *c;
        delete_selection(ctx);
        let caret = ctx.selection.focus;
        if !caret.is_valid(ctx.tree) {
            return Ok(EditOutcome::noop());
        }
        if let Some(block) = ctx.tree.get_mut(caret.block)
            && block.text.is_empty()
            && let BlockKind::CodeBlock { language } = &mut block.kind
        {
            language.get_or_insert_with(String::new).push(c);
            *ctx.selection = Selection::collapsed_at(caret.block, 0);
            return Ok(EditOutcome::new(
                DirtyRange::Single(caret.block),
                EditKind::InsertText,
            ));
        }
    }
    insert_payload(ctx, event, false)
}

fn insert_payload(
    ctx: &mut EditContext,
    event: &InputEvent,
    recognize: bool,
) -> Result<EditOutcome, EditError> {
    let mut buf = [0u8; 4];
    let text: &str = match &event.payload {
        EventPayload::Char(c) => c.encode_utf8(&mut buf),
        EventPayload::Text(text) => text.as_str(),
        _ => return Err(EditError::PayloadMismatch { kind: event.kind }),
    };

    delete_selection(ctx);
    let caret = ctx.selection.focus;
    if !caret.is_valid(ctx.tree) {
        return Ok(EditOutcome::noop());
    }

    let after = insert_text_at(ctx.tree, caret, text);
    *ctx.selection = Selection::caret(after);

    if recognize && let Some(outcome) = recognize_pattern(ctx, after.block) {
        return Ok(outcome);
    }

    Ok(EditOutcome::new(
        DirtyRange::Single(after.block),
        EditKind::InsertText,
    ))
}

/// Dispatch recognition on the block the caret landed in. Paragraphs take
/// the full rule set; a plain bullet item watches for the checkbox that
/// would have made it a task.
fn recognize_pattern(ctx: &mut EditContext, key: BlockKey) -> Option<EditOutcome> {
    match ctx.tree.get(key)?.kind {
        BlockKind::Paragraph => recognize_paragraph(ctx, key),
        BlockKind::ListItem { task: None } => recognize_task_box(ctx, key),
        _ => None,
    }
}

/// Run the ordered marker rules against the paragraph's text. First match
/// wins; returns `None` when the text stays a plain paragraph.
fn recognize_paragraph(ctx: &mut EditContext, key: BlockKey) -> Option<EditOutcome> {
    let text = ctx.tree.get(key)?.text.clone();

    if let Some(caps) = RE_HEADING.captures(&text) {
        let level = caps[1].len() as u8;
        let rest = caps[2].to_string();
        let consumed = text.len() - rest.len();
        retag_with_text(ctx, key, BlockKind::Heading { level }, rest, consumed);
        return Some(EditOutcome::new(DirtyRange::Single(key), EditKind::Structural));
    }

    // A full task marker appearing at once (an edit completing the line
    // rather than typing it left to right) must be tried before the plain
    // bullet rule it extends.
    if let Some(caps) = RE_TASK.captures(&text) {
        let checked = &caps[1] != " ";
        let rest = caps[2].to_string();
        let consumed = text.len() - rest.len();
        let list = wrap_in_list(
            ctx,
            key,
            BlockKind::List { ordered: false },
            BlockKind::ListItem {
                task: Some(checked),
            },
            rest,
            consumed,
        )?;
        return Some(EditOutcome::new(DirtyRange::Single(list), EditKind::Structural));
    }

    if let Some(caps) = RE_BULLET.captures(&text) {
        let rest = caps[1].to_string();
        let consumed = text.len() - rest.len();
        let list = wrap_in_list(
            ctx,
            key,
            BlockKind::List { ordered: false },
            BlockKind::ListItem { task: None },
            rest,
            consumed,
        )?;
        return Some(EditOutcome::new(DirtyRange::Single(list), EditKind::Structural));
    }

    if let Some(caps) = RE_ORDERED.captures(&text) {
        let rest = caps[2].to_string();
        let consumed = text.len() - rest.len();
        let list = wrap_in_list(
            ctx,
            key,
            BlockKind::List { ordered: true },
            BlockKind::ListItem { task: None },
            rest,
            consumed,
        )?;
        return Some(EditOutcome::new(DirtyRange::Single(list), EditKind::Structural));
    }

    if let Some(caps) = RE_BLOCKQUOTE.captures(&text) {
        let rest = caps[1].to_string();
        let consumed = text.len() - rest.len();
        let quote = wrap_in_container(ctx, key, BlockKind::BlockQuote, rest, consumed)?;
        return Some(EditOutcome::new(DirtyRange::Single(quote), EditKind::Structural));
    }

    if let Some(caps) = RE_FENCE.captures(&text) {
        let language = match &caps[1] {
            "" => None,
            lang => Some(lang.to_string()),
        };
        retag_with_text(ctx, key, BlockKind::CodeBlock { language }, String::new(), text.len());
        return Some(EditOutcome::new(DirtyRange::Single(key), EditKind::Structural));
    }

    if RE_BREAK.is_match(&text) {
        retag_with_text(ctx, key, BlockKind::ThematicBreak, String::new(), text.len());
        // A break is not editable, so the caret needs a fresh paragraph
        let para = Block::paragraph("");
        let para_key = para.key;
        if ctx.tree.insert_after(para, key).is_ok() {
            *ctx.selection = Selection::collapsed_at(para_key, 0);
            return Some(EditOutcome::new(
                DirtyRange::Span {
                    start: key,
                    end: para_key,
                },
                EditKind::Structural,
            ));
        }
        return Some(EditOutcome::new(DirtyRange::Single(key), EditKind::Structural));
    }

    None
}

/// Second-stage task rule: a checkbox typed at the head of a plain bullet
/// item retags it in place.
fn recognize_task_box(ctx: &mut EditContext, key: BlockKey) -> Option<EditOutcome> {
    let text = ctx.tree.get(key)?.text.clone();
    let caps = RE_TASK_BOX.captures(&text)?;
    let checked = &caps[1] != " ";
    let rest = caps[2].to_string();
    let consumed = text.len() - rest.len();
    retag_with_text(
        ctx,
        key,
        BlockKind::ListItem {
            task: Some(checked),
        },
        rest,
        consumed,
    );
    Some(EditOutcome::new(DirtyRange::Single(key), EditKind::Structural))
}

/// In-place conversion: same key, new kind, marker text consumed, caret
/// re-anchored into the remaining text.
fn retag_with_text(
    ctx: &mut EditContext,
    key: BlockKey,
    kind: BlockKind,
    rest: String,
    consumed: usize,
) {
    let _ = ctx.tree.replace_kind(key, kind);
    if let Some(block) = ctx.tree.get_mut(key) {
        block.text = rest;
    }
    let offset = ctx.selection.focus.offset.saturating_sub(consumed);
    let max = ctx.tree.get(key).map_or(0, |b| b.text.len());
    *ctx.selection = Selection::collapsed_at(key, offset.min(max));
}

/// Convert the paragraph into a list item and wrap it in a list container,
/// reusing the preceding sibling list when it is of the same ordering.
/// Returns the key of the list container the item ended up in.
fn wrap_in_list(
    ctx: &mut EditContext,
    key: BlockKey,
    list_kind: BlockKind,
    item_kind: BlockKind,
    rest: String,
    consumed: usize,
) -> Option<BlockKey> {
    let prev_sibling = previous_sibling(ctx.tree, key);
    let join_previous = prev_sibling
        .and_then(|k| ctx.tree.get(k))
        .is_some_and(|b| b.kind == list_kind);

    let list = if join_previous {
        prev_sibling.expect("checked above")
    } else {
        ctx.tree.insert_before(Block::new(list_kind, ""), key).ok()?
    };

    let item = ctx.tree.detach(key).ok()?;
    ctx.tree.attach_child(list, item).ok()?;
    retag_with_text(ctx, key, item_kind, rest, consumed);
    Some(list)
}

/// Wrap the paragraph in a container (blockquote), keeping it a paragraph.
fn wrap_in_container(
    ctx: &mut EditContext,
    key: BlockKey,
    container_kind: BlockKind,
    rest: String,
    consumed: usize,
) -> Option<BlockKey> {
    let container = ctx
        .tree
        .insert_before(Block::new(container_kind, ""), key)
        .ok()?;
    let para = ctx.tree.detach(key).ok()?;
    ctx.tree.attach_child(container, para).ok()?;
    if let Some(block) = ctx.tree.get_mut(key) {
        block.text = rest;
    }
    let offset = ctx.selection.focus.offset.saturating_sub(consumed);
    *ctx.selection = Selection::collapsed_at(key, offset);
    Some(container)
}

fn previous_sibling(tree: &crate::tree::DocumentTree, key: BlockKey) -> Option<BlockKey> {
    let index = tree.child_index(key).ok()?;
    if index == 0 {
        return None;
    }
    let parent = tree.get(key)?.parent?;
    tree.get(parent)?.children.get(index - 1).copied()
}
