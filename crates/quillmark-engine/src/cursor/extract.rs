//! Range extraction for copy/cut and export collaborators.
//!
//! Flattens every text-bearing block between two carets (inclusive of
//! partially covered boundary blocks) into plain text, escaped HTML, or
//! structured block templates that paste can re-instantiate with fresh keys.

use serde::{Deserialize, Serialize};

use crate::cursor::Caret;
use crate::tree::{BlockKind, DocumentTree};

/// A keyless copy of a block, used as clipboard/paste payload.
///
/// Templates deliberately carry no [`BlockKey`](crate::tree::BlockKey):
/// instantiating one always draws fresh keys, preserving key uniqueness no
/// matter how often the same content is pasted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockTemplate {
    pub kind: BlockKind,
    pub text: String,
    pub children: Vec<BlockTemplate>,
}

impl BlockTemplate {
    pub fn new(kind: BlockKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            children: Vec::new(),
        }
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::new(BlockKind::Paragraph, text)
    }
}

/// The text-bearing slices covered by `[start, end]`, in document order.
/// Boundary blocks contribute partial text; interior blocks contribute all
/// of it. Returns an empty vec when either caret is invalid.
fn covered_slices(
    tree: &DocumentTree,
    start: &Caret,
    end: &Caret,
) -> Vec<(BlockKind, String)> {
    if !start.is_valid(tree) || !end.is_valid(tree) {
        return Vec::new();
    }
    if start.block == end.block {
        let block = tree.get(start.block).expect("validated");
        let lo = start.offset.min(end.offset);
        let hi = start.offset.max(end.offset).min(block.text.len());
        return vec![(block.kind.clone(), block.text[lo..hi].to_string())];
    }

    let keys = tree.text_block_keys();
    let Some(from) = keys.iter().position(|&k| k == start.block) else {
        return Vec::new();
    };
    let Some(to) = keys.iter().position(|&k| k == end.block) else {
        return Vec::new();
    };
    let (from, to, first, last) = if from <= to {
        (from, to, start, end)
    } else {
        (to, from, end, start)
    };

    let mut out = Vec::new();
    for &key in &keys[from..=to] {
        let block = tree.get(key).expect("listed");
        let text = if key == first.block {
            block.text[first.offset.min(block.text.len())..].to_string()
        } else if key == last.block {
            block.text[..last.offset.min(block.text.len())].to_string()
        } else {
            block.text.clone()
        };
        out.push((block.kind.clone(), text));
    }
    out
}

/// Flatten the range into plain text, one line per block.
pub fn extract_range_text(tree: &DocumentTree, start: &Caret, end: &Caret) -> String {
    covered_slices(tree, start, end)
        .into_iter()
        .map(|(_, text)| text)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Flatten the range into minimal structural HTML with escaped content.
pub fn extract_range_html(tree: &DocumentTree, start: &Caret, end: &Caret) -> String {
    let mut html = String::new();
    for (kind, text) in covered_slices(tree, start, end) {
        let escaped = html_escape::encode_text(&text);
        match kind {
            BlockKind::Heading { level } => {
                html.push_str(&format!("<h{level}>{escaped}</h{level}>\n"));
            }
            BlockKind::ListItem { .. } => {
                html.push_str(&format!("<li>{escaped}</li>\n"));
            }
            BlockKind::TableCell { .. } => {
                html.push_str(&format!("<td>{escaped}</td>\n"));
            }
            BlockKind::CodeBlock { .. } => {
                html.push_str(&format!("<pre><code>{escaped}</code></pre>\n"));
            }
            BlockKind::HtmlBlock => {
                // Raw HTML passes through unescaped
                html.push_str(&text);
                html.push('\n');
            }
            _ => {
                html.push_str(&format!("<p>{escaped}</p>\n"));
            }
        }
    }
    html
}

/// Flatten the range into keyless block templates for cut/paste.
pub fn extract_range_blocks(tree: &DocumentTree, start: &Caret, end: &Caret) -> Vec<BlockTemplate> {
    covered_slices(tree, start, end)
        .into_iter()
        .map(|(kind, text)| BlockTemplate::new(kind, text))
        .collect()
}
