//! Markdown → block tree, driven by `pulldown-cmark` events.
//!
//! Inline markup is kept as raw markdown inside each block's text (the
//! renderer's scanner re-tokenizes it), so the builder re-emits the
//! delimiters as it walks inline start/end tags.

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

use crate::tree::{Block, BlockKey, BlockKind, CellAlign, DocumentTree};

pub fn parse_markdown(text: &str) -> DocumentTree {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_YAML_STYLE_METADATA_BLOCKS);

    let mut builder = TreeBuilder::new();
    for event in Parser::new_ext(text, options) {
        builder.handle(event);
    }
    builder.finish()
}

struct TreeBuilder {
    tree: DocumentTree,
    /// Open containers, innermost last; index 0 is the root.
    containers: Vec<BlockKey>,
    /// Open text-bearing leaf (or list item) accumulating text.
    current: Option<BlockKey>,
    aligns: Vec<CellAlign>,
    cell_index: usize,
    /// Destination URLs for link/image tags currently open.
    link_targets: Vec<String>,
}

impl TreeBuilder {
    fn new() -> Self {
        let tree = DocumentTree::new();
        let root = tree.root();
        Self {
            tree,
            containers: vec![root],
            current: None,
            aligns: Vec::new(),
            cell_index: 0,
            link_targets: Vec::new(),
        }
    }

    fn finish(mut self) -> DocumentTree {
        let root = self.tree.root();
        if self
            .tree
            .get(root)
            .is_some_and(|block| block.children.is_empty())
        {
            // An editable document always has at least one block
            let _ = self.tree.append_child(root, Block::paragraph(""));
        }
        self.tree
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => self.push_text(&text),
            Event::Code(code) => {
                self.push_text("`");
                self.push_text(&code);
                self.push_text("`");
            }
            Event::Html(html) | Event::InlineHtml(html) => self.push_text(&html),
            Event::SoftBreak | Event::HardBreak => self.push_text(" "),
            Event::Rule => {
                self.append_block(BlockKind::ThematicBreak);
            }
            Event::TaskListMarker(done) => {
                if let Some(item) = self.current {
                    let _ = self
                        .tree
                        .replace_kind(item, BlockKind::ListItem { task: Some(done) });
                }
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag) {
        match tag {
            Tag::Paragraph => {
                // A list item's paragraph text folds into the item itself;
                // a second paragraph in a loose item joins with a space.
                if let Some(&top) = self.containers.last()
                    && let Some(block) = self.tree.get(top)
                    && matches!(block.kind, BlockKind::ListItem { .. })
                {
                    if !block.text.is_empty()
                        && let Some(item) = self.tree.get_mut(top)
                    {
                        item.text.push(' ');
                    }
                    self.current = Some(top);
                } else {
                    self.open_leaf(BlockKind::Paragraph);
                }
            }
            Tag::Heading { level, .. } => self.open_leaf(BlockKind::Heading {
                level: level as u8,
            }),
            Tag::BlockQuote(_) => self.open_container(BlockKind::BlockQuote),
            Tag::CodeBlock(kind) => {
                let language = match kind {
                    CodeBlockKind::Fenced(info) => {
                        info.split_whitespace().next().map(str::to_string)
                    }
                    CodeBlockKind::Indented => None,
                };
                self.open_leaf(BlockKind::CodeBlock { language });
            }
            Tag::HtmlBlock => self.open_leaf(BlockKind::HtmlBlock),
            Tag::List(start) => self.open_container(BlockKind::List {
                ordered: start.is_some(),
            }),
            Tag::Item => {
                if let Some(key) = self.append_block(BlockKind::ListItem { task: None }) {
                    self.containers.push(key);
                    self.current = Some(key);
                }
            }
            Tag::Table(aligns) => {
                self.aligns = aligns.iter().map(|a| cell_align(*a)).collect();
                self.open_container(BlockKind::Table);
            }
            Tag::TableHead | Tag::TableRow => {
                self.open_container(BlockKind::TableRow);
                self.cell_index = 0;
            }
            Tag::TableCell => {
                let align = self
                    .aligns
                    .get(self.cell_index)
                    .copied()
                    .unwrap_or(CellAlign::None);
                self.open_leaf(BlockKind::TableCell { align });
            }
            Tag::MetadataBlock(_) => self.open_leaf(BlockKind::FrontMatter),
            Tag::Emphasis => self.push_text("*"),
            Tag::Strong => self.push_text("**"),
            Tag::Strikethrough => self.push_text("~~"),
            Tag::Link { dest_url, .. } => {
                self.push_text("[");
                self.link_targets.push(dest_url.to_string());
            }
            Tag::Image { dest_url, .. } => {
                self.push_text("![");
                self.link_targets.push(dest_url.to_string());
            }
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph | TagEnd::Heading(_) => self.current = None,
            TagEnd::CodeBlock | TagEnd::HtmlBlock | TagEnd::MetadataBlock(_) => {
                self.trim_trailing_newline();
                self.current = None;
            }
            TagEnd::BlockQuote(_)
            | TagEnd::List(_)
            | TagEnd::Table
            | TagEnd::TableHead
            | TagEnd::TableRow => {
                self.containers.pop();
            }
            TagEnd::Item => {
                self.containers.pop();
                self.current = None;
            }
            TagEnd::TableCell => {
                self.current = None;
                self.cell_index += 1;
            }
            TagEnd::Emphasis => self.push_text("*"),
            TagEnd::Strong => self.push_text("**"),
            TagEnd::Strikethrough => self.push_text("~~"),
            TagEnd::Link | TagEnd::Image => {
                let url = self.link_targets.pop().unwrap_or_default();
                self.push_text("](");
                self.push_text(&url);
                self.push_text(")");
            }
            _ => {}
        }
    }

    fn open_leaf(&mut self, kind: BlockKind) {
        self.current = self.append_block(kind);
    }

    fn open_container(&mut self, kind: BlockKind) {
        if let Some(key) = self.append_block(kind) {
            self.containers.push(key);
        }
    }

    fn append_block(&mut self, kind: BlockKind) -> Option<BlockKey> {
        let parent = *self.containers.last()?;
        self.tree.append_child(parent, Block::new(kind, "")).ok()
    }

    fn push_text(&mut self, text: &str) {
        if let Some(key) = self.current
            && let Some(block) = self.tree.get_mut(key)
        {
            block.text.push_str(text);
        }
    }

    fn trim_trailing_newline(&mut self) {
        if let Some(key) = self.current
            && let Some(block) = self.tree.get_mut(key)
            && block.text.ends_with('\n')
        {
            block.text.pop();
        }
    }
}

fn cell_align(align: pulldown_cmark::Alignment) -> CellAlign {
    match align {
        pulldown_cmark::Alignment::None => CellAlign::None,
        pulldown_cmark::Alignment::Left => CellAlign::Left,
        pulldown_cmark::Alignment::Center => CellAlign::Center,
        pulldown_cmark::Alignment::Right => CellAlign::Right,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn top_level(tree: &DocumentTree) -> Vec<&Block> {
        tree.get(tree.root())
            .unwrap()
            .children
            .iter()
            .map(|&k| tree.get(k).unwrap())
            .collect()
    }

    #[test]
    fn test_parse_empty_input_yields_one_empty_paragraph() {
        let tree = parse_markdown("");
        let blocks = top_level(&tree);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, BlockKind::Paragraph);
        assert_eq!(blocks[0].text, "");
    }

    #[test]
    fn test_parse_heading_and_paragraph() {
        let tree = parse_markdown("## Title\n\nBody text here.\n");
        let blocks = top_level(&tree);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].kind, BlockKind::Heading { level: 2 });
        assert_eq!(blocks[0].text, "Title");
        assert_eq!(blocks[1].kind, BlockKind::Paragraph);
        assert_eq!(blocks[1].text, "Body text here.");
    }

    #[test]
    fn test_parse_keeps_inline_markup_as_raw_text() {
        let tree = parse_markdown("some **bold** and a [link](https://x.example)\n");
        let blocks = top_level(&tree);
        assert_eq!(blocks[0].text, "some **bold** and a [link](https://x.example)");
    }

    #[test]
    fn test_parse_nested_list_with_tasks() {
        let tree = parse_markdown("- [x] done\n- [ ] open\n  - nested\n");
        let blocks = top_level(&tree);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, BlockKind::List { ordered: false });

        let items: Vec<&Block> = blocks[0]
            .children
            .iter()
            .map(|&k| tree.get(k).unwrap())
            .collect();
        assert_eq!(items[0].kind, BlockKind::ListItem { task: Some(true) });
        assert_eq!(items[0].text, "done");
        assert_eq!(items[1].kind, BlockKind::ListItem { task: Some(false) });
        assert_eq!(items[1].text, "open");

        let nested_list = tree.get(items[1].children[0]).unwrap();
        assert_eq!(nested_list.kind, BlockKind::List { ordered: false });
        let nested_item = tree.get(nested_list.children[0]).unwrap();
        assert_eq!(nested_item.text, "nested");
        tree.check_invariants();
    }

    #[test]
    fn test_parse_ordered_list() {
        let tree = parse_markdown("1. first\n2. second\n");
        let blocks = top_level(&tree);
        assert_eq!(blocks[0].kind, BlockKind::List { ordered: true });
        assert_eq!(blocks[0].children.len(), 2);
    }

    #[test]
    fn test_parse_fenced_code_block() {
        let tree = parse_markdown("```rust\nfn main() {}\n```\n");
        let blocks = top_level(&tree);
        assert_eq!(
            blocks[0].kind,
            BlockKind::CodeBlock {
                language: Some("rust".to_string())
            }
        );
        assert_eq!(blocks[0].text, "fn main() {}");
    }

    #[test]
    fn test_parse_blockquote_wraps_paragraph() {
        let tree = parse_markdown("> quoted words\n");
        let blocks = top_level(&tree);
        assert_eq!(blocks[0].kind, BlockKind::BlockQuote);
        let inner = tree.get(blocks[0].children[0]).unwrap();
        assert_eq!(inner.kind, BlockKind::Paragraph);
        assert_eq!(inner.text, "quoted words");
    }

    #[test]
    fn test_parse_table_with_alignment() {
        let tree = parse_markdown("| a | b |\n|:--|--:|\n| 1 | 2 |\n");
        let blocks = top_level(&tree);
        assert_eq!(blocks[0].kind, BlockKind::Table);

        let rows: Vec<&Block> = blocks[0]
            .children
            .iter()
            .map(|&k| tree.get(k).unwrap())
            .collect();
        assert_eq!(rows.len(), 2, "header row plus one body row");

        let header_cells: Vec<&Block> = rows[0]
            .children
            .iter()
            .map(|&k| tree.get(k).unwrap())
            .collect();
        assert_eq!(
            header_cells[0].kind,
            BlockKind::TableCell {
                align: CellAlign::Left
            }
        );
        assert_eq!(
            header_cells[1].kind,
            BlockKind::TableCell {
                align: CellAlign::Right
            }
        );
        assert_eq!(header_cells[0].text, "a");

        let body_cells: Vec<&Block> = rows[1]
            .children
            .iter()
            .map(|&k| tree.get(k).unwrap())
            .collect();
        assert_eq!(body_cells[1].text, "2");
    }

    #[test]
    fn test_parse_front_matter() {
        let tree = parse_markdown("---\ntitle: Notes\n---\n\nBody\n");
        let blocks = top_level(&tree);
        assert_eq!(blocks[0].kind, BlockKind::FrontMatter);
        assert_eq!(blocks[0].text, "title: Notes");
        assert_eq!(blocks[1].text, "Body");
    }

    #[test]
    fn test_parse_thematic_break() {
        let tree = parse_markdown("above\n\n---\n\nbelow\n");
        let blocks = top_level(&tree);
        assert_eq!(blocks[1].kind, BlockKind::ThematicBreak);
        assert_eq!(blocks.len(), 3);
    }

    #[test]
    fn test_parse_soft_break_joins_with_space() {
        let tree = parse_markdown("line one\nline two\n");
        let blocks = top_level(&tree);
        assert_eq!(blocks[0].text, "line one line two");
    }
}
