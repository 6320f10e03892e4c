//! Block tree → markdown. The writer is deterministic: the same tree
//! always yields the same text, and feeding the output back through the
//! parser reproduces the same block structure.

use crate::tree::{BlockKey, BlockKind, CellAlign, DocumentTree};

pub fn serialize_markdown(tree: &DocumentTree) -> String {
    let Some(root) = tree.get(tree.root()) else {
        return String::new();
    };
    let rendered: Vec<String> = root
        .children
        .iter()
        .map(|&child| serialize_block(tree, child))
        .collect();
    let mut out = rendered.join("\n\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

fn serialize_block(tree: &DocumentTree, key: BlockKey) -> String {
    let Some(block) = tree.get(key) else {
        return String::new();
    };
    match &block.kind {
        BlockKind::Paragraph => block.text.clone(),
        BlockKind::Heading { level } => {
            format!("{} {}", "#".repeat(usize::from(*level)), block.text)
        }
        BlockKind::CodeBlock { language } => {
            let lang = language.as_deref().unwrap_or("");
            format!("```{lang}\n{}\n```", block.text)
        }
        BlockKind::BlockQuote => {
            let inner: Vec<String> = block
                .children
                .iter()
                .map(|&child| serialize_block(tree, child))
                .collect();
            quote_lines(&inner.join("\n\n"))
        }
        BlockKind::List { .. } => serialize_list(tree, key, 0),
        BlockKind::Table => serialize_table(tree, key),
        BlockKind::HtmlBlock => block.text.clone(),
        BlockKind::ThematicBreak => "---".to_string(),
        BlockKind::FrontMatter => format!("---\n{}\n---", block.text),
        // Items, rows and cells only occur under their containers
        BlockKind::Document | BlockKind::ListItem { .. } | BlockKind::TableRow
        | BlockKind::TableCell { .. } => block.text.clone(),
    }
}

fn quote_lines(text: &str) -> String {
    text.lines()
        .map(|line| {
            if line.is_empty() {
                ">".to_string()
            } else {
                format!("> {line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn serialize_list(tree: &DocumentTree, key: BlockKey, indent: usize) -> String {
    let Some(list) = tree.get(key) else {
        return String::new();
    };
    let ordered = matches!(list.kind, BlockKind::List { ordered: true });
    let mut lines: Vec<String> = Vec::new();
    for (index, &item_key) in list.children.iter().enumerate() {
        let Some(item) = tree.get(item_key) else {
            continue;
        };
        let bullet = if ordered {
            format!("{}. ", index + 1)
        } else {
            "- ".to_string()
        };
        let task = match item.kind {
            BlockKind::ListItem { task: Some(true) } => "[x] ",
            BlockKind::ListItem { task: Some(false) } => "[ ] ",
            _ => "",
        };
        lines.push(format!("{}{bullet}{task}{}", " ".repeat(indent), item.text));
        // Nested lists continue at the bullet's content column; the task
        // checkbox is item text, not marker, so it adds no indent.
        let child_indent = indent + bullet.len();
        for &child in &item.children {
            lines.push(serialize_list(tree, child, child_indent));
        }
    }
    lines.join("\n")
}

fn serialize_table(tree: &DocumentTree, key: BlockKey) -> String {
    let Some(table) = tree.get(key) else {
        return String::new();
    };
    let mut lines: Vec<String> = Vec::new();
    for (row_index, &row_key) in table.children.iter().enumerate() {
        let Some(row) = tree.get(row_key) else {
            continue;
        };
        let cells: Vec<String> = row
            .children
            .iter()
            .filter_map(|&cell| tree.get(cell))
            .map(|cell| cell.text.clone())
            .collect();
        lines.push(format!("| {} |", cells.join(" | ")));

        if row_index == 0 {
            let markers: Vec<&str> = row
                .children
                .iter()
                .filter_map(|&cell| tree.get(cell))
                .map(|cell| match cell.kind {
                    BlockKind::TableCell {
                        align: CellAlign::Left,
                    } => ":--",
                    BlockKind::TableCell {
                        align: CellAlign::Center,
                    } => ":-:",
                    BlockKind::TableCell {
                        align: CellAlign::Right,
                    } => "--:",
                    _ => "---",
                })
                .collect();
            lines.push(format!("| {} |", markers.join(" | ")));
        }
    }
    lines.join("\n")
}
