use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for a block.
///
/// Keys are process-unique and never reused, even across undo/redo replays:
/// restoring a snapshot restores the original keys, and any newly created
/// block always draws a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockKey(Uuid);

impl BlockKey {
    pub fn new() -> Self {
        BlockKey(Uuid::new_v4())
    }
}

impl Default for BlockKey {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BlockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short form is enough for logs and debug dumps
        write!(f, "{}", &self.0.simple().to_string()[..8])
    }
}

/// Horizontal alignment of a table cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CellAlign {
    #[default]
    None,
    Left,
    Center,
    Right,
}

/// The kind of a block, with type-specific data carried in the variant.
///
/// This is the tagged-union replacement for a per-type class hierarchy:
/// controllers and the renderer dispatch on the data-free [`BlockTag`]
/// discriminant, while the variant payload holds heading level, list
/// ordering, code language and so on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockKind {
    /// Root container of the document; exactly one per tree.
    Document,
    /// Plain paragraph (default when nothing else matches).
    Paragraph,
    /// ATX heading with level 1..=6.
    Heading { level: u8 },
    /// List container wrapping list items.
    List { ordered: bool },
    /// Individual list item; `task` is `Some(checked)` for task items.
    ListItem { task: Option<bool> },
    /// Table container wrapping rows.
    Table,
    /// Table row wrapping cells.
    TableRow,
    /// Table cell.
    TableCell { align: CellAlign },
    /// Fenced code block; `language` drives math/diagram rendering too.
    CodeBlock { language: Option<String> },
    /// Blockquote container.
    BlockQuote,
    /// Raw HTML block.
    HtmlBlock,
    /// Thematic break (`---`); carries no text.
    ThematicBreak,
    /// YAML front matter at the start of the document.
    FrontMatter,
}

/// Data-free discriminant of [`BlockKind`], used as a dispatch key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockTag {
    Document,
    Paragraph,
    Heading,
    List,
    ListItem,
    Table,
    TableRow,
    TableCell,
    CodeBlock,
    BlockQuote,
    HtmlBlock,
    ThematicBreak,
    FrontMatter,
}

impl BlockKind {
    pub fn tag(&self) -> BlockTag {
        match self {
            BlockKind::Document => BlockTag::Document,
            BlockKind::Paragraph => BlockTag::Paragraph,
            BlockKind::Heading { .. } => BlockTag::Heading,
            BlockKind::List { .. } => BlockTag::List,
            BlockKind::ListItem { .. } => BlockTag::ListItem,
            BlockKind::Table => BlockTag::Table,
            BlockKind::TableRow => BlockTag::TableRow,
            BlockKind::TableCell { .. } => BlockTag::TableCell,
            BlockKind::CodeBlock { .. } => BlockTag::CodeBlock,
            BlockKind::BlockQuote => BlockTag::BlockQuote,
            BlockKind::HtmlBlock => BlockTag::HtmlBlock,
            BlockKind::ThematicBreak => BlockTag::ThematicBreak,
            BlockKind::FrontMatter => BlockTag::FrontMatter,
        }
    }

    /// Whether this block may hold child blocks. List items are both text
    /// bearing and containers: their children are nested lists.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            BlockKind::Document
                | BlockKind::List { .. }
                | BlockKind::ListItem { .. }
                | BlockKind::Table
                | BlockKind::TableRow
                | BlockKind::BlockQuote
        )
    }

    /// Whether this block carries editable text.
    ///
    /// List items carry their own text; their `children` hold nested lists.
    pub fn is_text_bearing(&self) -> bool {
        matches!(
            self,
            BlockKind::Paragraph
                | BlockKind::Heading { .. }
                | BlockKind::ListItem { .. }
                | BlockKind::TableCell { .. }
                | BlockKind::CodeBlock { .. }
                | BlockKind::HtmlBlock
                | BlockKind::FrontMatter
        )
    }

    /// Void blocks carry neither text nor children and cannot be split.
    pub fn is_void(&self) -> bool {
        matches!(self, BlockKind::ThematicBreak)
    }

    /// Whether a following block of kind `other` may be merged into this one.
    ///
    /// Paragraphs merge into headings and list items (the usual result of
    /// Backspace at a block boundary). Code, HTML and front matter only
    /// accept their own kind, front matter never merges at all.
    pub fn can_merge_with(&self, other: &BlockKind) -> bool {
        if !self.is_text_bearing() || !other.is_text_bearing() {
            return false;
        }
        match (self, other) {
            (BlockKind::FrontMatter, _) | (_, BlockKind::FrontMatter) => false,
            (BlockKind::CodeBlock { .. }, BlockKind::CodeBlock { .. }) => true,
            (BlockKind::CodeBlock { .. }, _) | (_, BlockKind::CodeBlock { .. }) => false,
            (BlockKind::HtmlBlock, BlockKind::HtmlBlock) => true,
            (BlockKind::HtmlBlock, _) | (_, BlockKind::HtmlBlock) => false,
            _ => true,
        }
    }
}

/// A node in the document tree.
///
/// Blocks live in the [`DocumentTree`](super::DocumentTree) arena and refer
/// to each other by key; `parent`/`children` are keys, never owning
/// references, so the arena map doubles as the O(1) key lookup index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub key: BlockKey,
    pub kind: BlockKind,
    /// Raw source text for text-bearing blocks; empty for containers.
    pub text: String,
    /// Ordered child keys (document order).
    pub children: Vec<BlockKey>,
    /// Enclosing block; `None` only for the root.
    pub parent: Option<BlockKey>,
}

impl Block {
    pub fn new(kind: BlockKind, text: impl Into<String>) -> Self {
        Self {
            key: BlockKey::new(),
            kind,
            text: text.into(),
            children: Vec::new(),
            parent: None,
        }
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::new(BlockKind::Paragraph, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_keys_are_unique() {
        let keys: Vec<BlockKey> = (0..1000).map(|_| BlockKey::new()).collect();
        let mut deduped = keys.clone();
        deduped.sort_by_key(|k| format!("{k:?}"));
        deduped.dedup();
        assert_eq!(deduped.len(), keys.len());
    }

    #[test]
    fn test_container_and_text_bearing_are_disjoint_except_list_item() {
        let kinds = [
            BlockKind::Document,
            BlockKind::Paragraph,
            BlockKind::Heading { level: 2 },
            BlockKind::List { ordered: false },
            BlockKind::ListItem { task: None },
            BlockKind::Table,
            BlockKind::TableRow,
            BlockKind::TableCell {
                align: CellAlign::None,
            },
            BlockKind::CodeBlock { language: None },
            BlockKind::BlockQuote,
            BlockKind::HtmlBlock,
            BlockKind::ThematicBreak,
            BlockKind::FrontMatter,
        ];
        for kind in kinds {
            // Void blocks are neither containers nor text bearing
            if kind.is_void() {
                assert!(!kind.is_container());
                assert!(!kind.is_text_bearing());
            }
        }
    }

    #[test]
    fn test_merge_compatibility() {
        let para = BlockKind::Paragraph;
        let heading = BlockKind::Heading { level: 1 };
        let code = BlockKind::CodeBlock { language: None };
        let item = BlockKind::ListItem { task: None };

        assert!(para.can_merge_with(&para));
        assert!(heading.can_merge_with(&para));
        assert!(item.can_merge_with(&item));
        assert!(code.can_merge_with(&code));
        assert!(!code.can_merge_with(&para));
        assert!(!para.can_merge_with(&code));
        assert!(!BlockKind::BlockQuote.can_merge_with(&para));
        assert!(!BlockKind::FrontMatter.can_merge_with(&BlockKind::FrontMatter));
    }
}
