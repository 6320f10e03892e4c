//! Virtual node construction and the inline token scanner.

use std::sync::LazyLock;

use regex::Regex;

use crate::render::cache::content_hash;
use crate::tree::{Block, BlockKey, BlockKind, BlockTag, CellAlign};

/// One inline span inside a text-bearing block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InlineToken {
    Text(String),
    Strong(String),
    Emphasis(String),
    Code(String),
    Strikethrough(String),
    Link { text: String, href: String },
    Image { alt: String, src: String },
    Math(String),
    /// Placeholder for content that failed to compile (math/diagram source).
    Invalid(String),
}

/// Flat key/value attributes handed to the view surface alongside a node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeAttrs {
    pub pairs: Vec<(String, String)>,
}

impl NodeAttrs {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn push(&mut self, name: &str, value: impl Into<String>) {
        self.pairs.push((name.to_string(), value.into()));
    }
}

/// Cached per-block representation of what was last handed to the view
/// surface. Two vnodes with equal hash/inline/attrs/children need no patch.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualNode {
    pub key: BlockKey,
    pub tag: BlockTag,
    pub text_hash: u64,
    pub inline: Vec<InlineToken>,
    pub attrs: NodeAttrs,
    pub children: Vec<BlockKey>,
}

impl VirtualNode {
    /// Build a node from a block, scanning inline tokens with `scan`.
    /// The scanner is injected so the renderer can satisfy it from cache.
    pub(super) fn build(
        block: &Block,
        scan: impl FnOnce(&str) -> Vec<InlineToken>,
    ) -> Self {
        let inline = if block.kind.is_text_bearing() && !is_verbatim(&block.kind) {
            scan(&block.text)
        } else if block.kind.is_text_bearing() {
            // Code and front matter render their text verbatim
            vec![InlineToken::Text(block.text.clone())]
        } else {
            Vec::new()
        };
        Self {
            key: block.key,
            tag: block.kind.tag(),
            text_hash: content_hash(&block.text),
            inline,
            attrs: attrs_for(&block.kind),
            children: block.children.clone(),
        }
    }
}

fn is_verbatim(kind: &BlockKind) -> bool {
    matches!(kind, BlockKind::CodeBlock { .. } | BlockKind::FrontMatter)
}

fn attrs_for(kind: &BlockKind) -> NodeAttrs {
    let mut attrs = NodeAttrs::default();
    match kind {
        BlockKind::Heading { level } => attrs.push("level", level.to_string()),
        BlockKind::List { ordered } => attrs.push("ordered", ordered.to_string()),
        BlockKind::ListItem { task: Some(done) } => attrs.push("checked", done.to_string()),
        BlockKind::CodeBlock {
            language: Some(lang),
        } => attrs.push("language", lang.clone()),
        BlockKind::TableCell { align } => {
            let value = match align {
                CellAlign::None => None,
                CellAlign::Left => Some("left"),
                CellAlign::Center => Some("center"),
                CellAlign::Right => Some("right"),
            };
            if let Some(value) = value {
                attrs.push("align", value);
            }
        }
        _ => {}
    }
    attrs
}

// First-match-wins alternation; image before link so the leading `!` is
// not swallowed as plain text, strong before emphasis for `**`.
static RE_INLINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"!\[(?P<alt>[^\]]*)\]\((?P<src>[^)]*)\)",
        r"|\[(?P<ltext>[^\]]*)\]\((?P<href>[^)]*)\)",
        r"|\*\*(?P<strong>[^*]+)\*\*",
        r"|~~(?P<strike>[^~]+)~~",
        r"|\*(?P<em>[^*]+)\*",
        r"|_(?P<em2>[^_]+)_",
        r"|`(?P<code>[^`]+)`",
        r"|\$(?P<math>[^$]+)\$",
    ))
    .expect("inline pattern is valid")
});

/// Split markdown-flavored text into inline tokens. Unmatched text becomes
/// plain [`InlineToken::Text`] runs; the scanner never fails.
pub fn scan_inline(text: &str) -> Vec<InlineToken> {
    let mut tokens = Vec::new();
    let mut last = 0;
    for caps in RE_INLINE.captures_iter(text) {
        let whole = caps.get(0).expect("match 0 always present");
        if whole.start() > last {
            tokens.push(InlineToken::Text(text[last..whole.start()].to_string()));
        }
        let token = if let Some(alt) = caps.name("alt") {
            InlineToken::Image {
                alt: alt.as_str().to_string(),
                src: caps.name("src").map_or("", |m| m.as_str()).to_string(),
            }
        } else if let Some(link_text) = caps.name("ltext") {
            InlineToken::Link {
                text: link_text.as_str().to_string(),
                href: caps.name("href").map_or("", |m| m.as_str()).to_string(),
            }
        } else if let Some(m) = caps.name("strong") {
            InlineToken::Strong(m.as_str().to_string())
        } else if let Some(m) = caps.name("strike") {
            InlineToken::Strikethrough(m.as_str().to_string())
        } else if let Some(m) = caps.name("em").or_else(|| caps.name("em2")) {
            InlineToken::Emphasis(m.as_str().to_string())
        } else if let Some(m) = caps.name("code") {
            InlineToken::Code(m.as_str().to_string())
        } else if let Some(m) = caps.name("math") {
            InlineToken::Math(m.as_str().to_string())
        } else {
            InlineToken::Text(whole.as_str().to_string())
        };
        tokens.push(token);
        last = whole.end();
    }
    if last < text.len() {
        tokens.push(InlineToken::Text(text[last..].to_string()));
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_scan_plain_text_is_one_token() {
        assert_eq!(
            scan_inline("just words"),
            vec![InlineToken::Text("just words".to_string())]
        );
    }

    #[test]
    fn test_scan_mixed_spans() {
        let tokens = scan_inline("a **b** and `c`");
        assert_eq!(
            tokens,
            vec![
                InlineToken::Text("a ".to_string()),
                InlineToken::Strong("b".to_string()),
                InlineToken::Text(" and ".to_string()),
                InlineToken::Code("c".to_string()),
            ]
        );
    }

    #[test]
    fn test_scan_image_wins_over_link() {
        let tokens = scan_inline("![logo](a.png) [home](/)");
        assert_eq!(
            tokens,
            vec![
                InlineToken::Image {
                    alt: "logo".to_string(),
                    src: "a.png".to_string(),
                },
                InlineToken::Text(" ".to_string()),
                InlineToken::Link {
                    text: "home".to_string(),
                    href: "/".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_scan_strong_wins_over_emphasis() {
        assert_eq!(
            scan_inline("**bold**"),
            vec![InlineToken::Strong("bold".to_string())]
        );
        assert_eq!(
            scan_inline("*soft* ~~gone~~ $x^2$"),
            vec![
                InlineToken::Emphasis("soft".to_string()),
                InlineToken::Text(" ".to_string()),
                InlineToken::Strikethrough("gone".to_string()),
                InlineToken::Text(" ".to_string()),
                InlineToken::Math("x^2".to_string()),
            ]
        );
    }

    #[test]
    fn test_build_keeps_code_text_verbatim() {
        let block = Block::new(
            BlockKind::CodeBlock {
                language: Some("rust".to_string()),
            },
            "let x = **not bold**;",
        );
        let vnode = VirtualNode::build(&block, scan_inline);
        assert_eq!(
            vnode.inline,
            vec![InlineToken::Text("let x = **not bold**;".to_string())]
        );
        assert_eq!(vnode.attrs.get("language"), Some("rust"));
    }

    #[test]
    fn test_build_records_heading_level() {
        let block = Block::new(BlockKind::Heading { level: 3 }, "Title");
        let vnode = VirtualNode::build(&block, scan_inline);
        assert_eq!(vnode.tag, BlockTag::Heading);
        assert_eq!(vnode.attrs.get("level"), Some("3"));
    }
}
