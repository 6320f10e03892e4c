//! The renderer: cached vnodes, minimal patch streams, deferred builds.

use std::collections::{HashMap, HashSet};

use crate::controllers::DirtyRange;
use crate::cursor::Caret;
use crate::render::cache::{content_hash, CompiledContent, RenderCaches};
use crate::render::diff::{diff_node, PatchOp};
use crate::render::vnode::{scan_inline, VirtualNode};
use crate::tree::{BlockKey, BlockKind, DocumentTree};

/// Caret re-resolved against the freshly patched surface. Offsets are
/// clamped onto char boundaries inside the block's current text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedCaret {
    pub key: BlockKey,
    pub offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredKind {
    Math,
    Diagram,
}

/// Handle for an asynchronous math/diagram build. The token is the
/// content hash at scheduling time; completion with a mismatched token
/// is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeferredJob {
    pub key: BlockKey,
    pub token: u64,
    pub kind: DeferredKind,
}

#[derive(Debug, Default)]
pub struct Renderer {
    vnodes: HashMap<BlockKey, VirtualNode>,
    caches: RenderCaches,
    pending_async: Vec<DeferredJob>,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vnode(&self, key: BlockKey) -> Option<&VirtualNode> {
        self.vnodes.get(&key)
    }

    pub fn caches(&self) -> &RenderCaches {
        &self.caches
    }

    /// Jobs scheduled since the last drain. The caller hands these to the
    /// math/diagram backends and feeds results back via
    /// [`complete_deferred`](Self::complete_deferred).
    pub fn take_deferred(&mut self) -> Vec<DeferredJob> {
        std::mem::take(&mut self.pending_async)
    }

    /// Rebuild everything. Used on load and after undo/redo.
    pub fn render_full(&mut self, tree: &DocumentTree) -> Vec<PatchOp> {
        let mut ops = self.unmount_removed(tree);
        // The root is tracked like any other node so that top-level child
        // list changes diff into a reorder; it just never mounts.
        self.refresh_block(tree, tree.root(), &mut ops);
        for key in tree.preorder_keys() {
            self.refresh_block(tree, key, &mut ops);
        }
        ops
    }

    /// Rebuild only the dirty span, in document order, plus the parents
    /// whose child lists the span touched.
    pub fn render_partial(&mut self, tree: &DocumentTree, dirty: DirtyRange) -> Vec<PatchOp> {
        match dirty {
            DirtyRange::None => Vec::new(),
            DirtyRange::Full => self.render_full(tree),
            DirtyRange::Single(key) => self.render_span(tree, key, key),
            DirtyRange::Span { start, end } => self.render_span(tree, start, end),
        }
    }

    /// Targeted re-render of one block, for isolated attribute changes
    /// that cannot have moved anything else.
    pub fn render_single(&mut self, tree: &DocumentTree, key: BlockKey) -> Vec<PatchOp> {
        if !tree.contains(key) {
            return self.unmount_removed(tree);
        }
        let mut ops = Vec::new();
        self.refresh_block(tree, key, &mut ops);
        ops
    }

    fn render_span(&mut self, tree: &DocumentTree, start: BlockKey, end: BlockKey) -> Vec<PatchOp> {
        let order = tree.preorder_keys();
        let (Some(a), Some(b)) = (
            order.iter().position(|&k| k == start),
            order.iter().position(|&k| k == end),
        ) else {
            // A stale dirty hint means the shape moved under us
            return self.render_full(tree);
        };
        let (first, last_key) = if a <= b { (a, end) } else { (b, start) };
        let last = order.iter().position(|&k| k == last_key).expect("present")
            + subtree_len(tree, last_key)
            - 1;

        let mut ops = self.unmount_removed(tree);
        let span: HashSet<BlockKey> = order[first..=last].iter().copied().collect();
        for &key in &order[first..=last] {
            self.refresh_block(tree, key, &mut ops);
        }
        // Mounts and unmounts shift child lists on parents outside the
        // span; refresh any cached node whose children drifted.
        let stale_parents: Vec<BlockKey> = self
            .vnodes
            .iter()
            .filter(|(key, vnode)| {
                !span.contains(key)
                    && tree.get(**key).is_some_and(|b| b.children != vnode.children)
            })
            .map(|(key, _)| *key)
            .collect();
        for parent in stale_parents {
            self.refresh_block(tree, parent, &mut ops);
        }
        ops
    }

    /// Rebuild one block's vnode, diff, and emit ops. Returns true when
    /// the block was newly mounted.
    fn refresh_block(&mut self, tree: &DocumentTree, key: BlockKey, ops: &mut Vec<PatchOp>) -> bool {
        let Some(block) = tree.get(key) else {
            return false;
        };
        let hash = content_hash(&block.text);
        let caches = &mut self.caches;
        let vnode = VirtualNode::build(block, |text| {
            if let Some(tokens) = caches.inline_tokens(key, hash) {
                return tokens.clone();
            }
            let tokens = scan_inline(text);
            caches.store_inline(key, hash, tokens.clone());
            tokens
        });
        self.schedule_deferred(&block.kind, key, &block.text, hash);

        let old = self.vnodes.get(&key);
        let mounted = old.is_none();
        if mounted {
            if let Some((parent, before)) = self.mount_point(tree, key) {
                ops.push(PatchOp::Mount {
                    key,
                    parent,
                    before,
                });
            }
            // The root itself is the surface's container, never mounted
        } else {
            diff_node(old, &vnode, ops);
        }
        self.vnodes.insert(key, vnode);
        mounted
    }

    fn mount_point(&self, tree: &DocumentTree, key: BlockKey) -> Option<(BlockKey, Option<BlockKey>)> {
        let parent = tree.get(key)?.parent?;
        let siblings = &tree.get(parent)?.children;
        let idx = siblings.iter().position(|&k| k == key)?;
        let before = siblings[idx + 1..]
            .iter()
            .copied()
            .find(|k| self.vnodes.contains_key(k));
        Some((parent, before))
    }

    fn unmount_removed(&mut self, tree: &DocumentTree) -> Vec<PatchOp> {
        let gone: Vec<BlockKey> = self
            .vnodes
            .keys()
            .copied()
            .filter(|&k| !tree.contains(k))
            .collect();
        let mut ops = Vec::with_capacity(gone.len());
        for key in gone {
            self.vnodes.remove(&key);
            self.caches.evict(key);
            self.pending_async.retain(|job| job.key != key);
            ops.push(PatchOp::Unmount(key));
        }
        ops
    }

    fn schedule_deferred(&mut self, kind: &BlockKind, key: BlockKey, text: &str, hash: u64) {
        let deferred_kind = match kind {
            BlockKind::CodeBlock {
                language: Some(lang),
            } => match lang.as_str() {
                "math" | "latex" => Some(DeferredKind::Math),
                "mermaid" | "diagram" => Some(DeferredKind::Diagram),
                _ => None,
            },
            _ => None,
        };
        let Some(deferred_kind) = deferred_kind else {
            return;
        };
        let cached = match deferred_kind {
            DeferredKind::Math => self.caches.math(key, hash).is_some(),
            DeferredKind::Diagram => self.caches.diagram(key, hash).is_some(),
        };
        if cached {
            return;
        }
        if text.trim().is_empty() {
            // Nothing to compile; mark the placeholder synchronously
            let invalid = CompiledContent::Invalid("empty source".to_string());
            match deferred_kind {
                DeferredKind::Math => self.caches.store_math(key, hash, invalid),
                DeferredKind::Diagram => self.caches.store_diagram(key, hash, invalid),
            }
            return;
        }
        self.pending_async.retain(|job| job.key != key);
        self.pending_async.push(DeferredJob {
            key,
            token: hash,
            kind: deferred_kind,
        });
    }

    /// Apply the result of a deferred build. Returns the patch to emit,
    /// or `None` when the block changed (or left the tree) since the job
    /// was scheduled and the result is stale.
    pub fn complete_deferred(
        &mut self,
        job: DeferredJob,
        result: Result<String, String>,
    ) -> Option<PatchOp> {
        let current = self.vnodes.get(&job.key)?;
        if current.text_hash != job.token {
            return None;
        }
        let value = match result {
            Ok(output) => CompiledContent::Ready(output),
            Err(reason) => CompiledContent::Invalid(reason),
        };
        match job.kind {
            DeferredKind::Math => self.caches.store_math(job.key, job.token, value),
            DeferredKind::Diagram => self.caches.store_diagram(job.key, job.token, value),
        }
        Some(PatchOp::SetText(job.key))
    }

    /// Re-resolve a caret against the current tree for the view surface.
    /// `None` when the block no longer exists or cannot carry a caret.
    pub fn resolve_caret(&self, tree: &DocumentTree, caret: Caret) -> Option<ResolvedCaret> {
        let block = tree.get(caret.block)?;
        if !block.kind.is_text_bearing() {
            return None;
        }
        let mut offset = caret.offset.min(block.text.len());
        while !block.text.is_char_boundary(offset) {
            offset -= 1;
        }
        Some(ResolvedCaret {
            key: caret.block,
            offset,
        })
    }
}

fn subtree_len(tree: &DocumentTree, key: BlockKey) -> usize {
    let mut count = 0;
    let mut stack = vec![key];
    while let Some(k) = stack.pop() {
        count += 1;
        if let Some(block) = tree.get(k) {
            stack.extend(block.children.iter().copied());
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Block;
    use pretty_assertions::assert_eq;

    fn two_paragraph_doc() -> (DocumentTree, BlockKey, BlockKey) {
        let mut tree = DocumentTree::new();
        let root = tree.root();
        let a = tree.append_child(root, Block::paragraph("alpha")).unwrap();
        let b = tree.append_child(root, Block::paragraph("beta")).unwrap();
        (tree, a, b)
    }

    #[test]
    fn test_full_render_mounts_everything_once() {
        let (tree, a, b) = two_paragraph_doc();
        let mut renderer = Renderer::new();

        let ops = renderer.render_full(&tree);
        let mounts: Vec<_> = ops
            .iter()
            .filter_map(|op| match op {
                PatchOp::Mount { key, .. } => Some(*key),
                _ => None,
            })
            .collect();
        assert_eq!(mounts, vec![a, b], "children mount in document order");

        // A second pass over an unchanged tree is silent
        assert!(renderer.render_full(&tree).is_empty());
    }

    #[test]
    fn test_partial_render_emits_set_text_for_edited_block() {
        let (mut tree, a, b) = two_paragraph_doc();
        let mut renderer = Renderer::new();
        renderer.render_full(&tree);

        tree.get_mut(a).unwrap().text.push('!');
        let ops = renderer.render_partial(&tree, DirtyRange::Single(a));
        assert_eq!(ops, vec![PatchOp::SetText(a)]);

        // The untouched sibling's vnode is still cached as-is
        assert_eq!(renderer.vnode(b).unwrap().text_hash, content_hash("beta"));
    }

    #[test]
    fn test_removed_block_unmounts_and_parent_reorders() {
        let (mut tree, a, b) = two_paragraph_doc();
        let root = tree.root();
        let mut renderer = Renderer::new();
        renderer.render_full(&tree);

        tree.get_mut(a).unwrap().text = "alphabeta".to_string();
        tree.remove(b).unwrap();
        let ops = renderer.render_partial(&tree, DirtyRange::Single(a));

        assert!(ops.contains(&PatchOp::Unmount(b)));
        assert!(ops.contains(&PatchOp::SetText(a)));
        assert!(ops.contains(&PatchOp::ReorderChildren(root)));
    }

    #[test]
    fn test_mount_lands_before_existing_sibling() {
        let (mut tree, a, b) = two_paragraph_doc();
        let root = tree.root();
        let mut renderer = Renderer::new();
        renderer.render_full(&tree);

        let mid = tree.insert_after(Block::paragraph("middle"), a).unwrap();
        let ops = renderer.render_partial(
            &tree,
            DirtyRange::Span { start: a, end: mid },
        );
        assert!(ops.contains(&PatchOp::Mount {
            key: mid,
            parent: root,
            before: Some(b),
        }));
    }

    #[test]
    fn test_math_block_schedules_deferred_job() {
        let mut tree = DocumentTree::new();
        let root = tree.root();
        let math = tree
            .append_child(
                root,
                Block::new(
                    BlockKind::CodeBlock {
                        language: Some("math".to_string()),
                    },
                    "x^2 + 1",
                ),
            )
            .unwrap();
        let mut renderer = Renderer::new();
        renderer.render_full(&tree);

        let jobs = renderer.take_deferred();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].key, math);
        assert_eq!(jobs[0].kind, DeferredKind::Math);
        assert_eq!(jobs[0].token, content_hash("x^2 + 1"));

        let op = renderer.complete_deferred(jobs[0], Ok("<mathml>".to_string()));
        assert_eq!(op, Some(PatchOp::SetText(math)));
        assert_eq!(
            renderer.caches().math(math, jobs[0].token),
            Some(&CompiledContent::Ready("<mathml>".to_string()))
        );
    }

    #[test]
    fn test_stale_deferred_result_is_discarded() {
        let mut tree = DocumentTree::new();
        let root = tree.root();
        let math = tree
            .append_child(
                root,
                Block::new(
                    BlockKind::CodeBlock {
                        language: Some("math".to_string()),
                    },
                    "a + b",
                ),
            )
            .unwrap();
        let mut renderer = Renderer::new();
        renderer.render_full(&tree);
        let jobs = renderer.take_deferred();

        // Edit the source before the backend finishes
        tree.get_mut(math).unwrap().text = "a + b + c".to_string();
        renderer.render_partial(&tree, DirtyRange::Single(math));

        assert!(renderer
            .complete_deferred(jobs[0], Ok("stale".to_string()))
            .is_none());
        // The re-render scheduled a fresh job for the new content
        let fresh = renderer.take_deferred();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].token, content_hash("a + b + c"));
    }

    #[test]
    fn test_empty_diagram_source_is_marked_invalid_synchronously() {
        let mut tree = DocumentTree::new();
        let root = tree.root();
        let diagram = tree
            .append_child(
                root,
                Block::new(
                    BlockKind::CodeBlock {
                        language: Some("mermaid".to_string()),
                    },
                    "   ",
                ),
            )
            .unwrap();
        let mut renderer = Renderer::new();
        renderer.render_full(&tree);

        assert!(renderer.take_deferred().is_empty());
        assert!(matches!(
            renderer.caches().diagram(diagram, content_hash("   ")),
            Some(CompiledContent::Invalid(_))
        ));
    }

    #[test]
    fn test_resolve_caret_clamps_past_the_end() {
        let (tree, a, _) = two_paragraph_doc();
        let renderer = Renderer::new();

        let resolved = renderer.resolve_caret(&tree, Caret::new(a, 999)).unwrap();
        assert_eq!(resolved, ResolvedCaret { key: a, offset: 5 });

        let ghost = Caret::new(BlockKey::new(), 0);
        assert!(renderer.resolve_caret(&tree, ghost).is_none());
    }

    #[test]
    fn test_resolve_caret_respects_char_boundaries() {
        let mut tree = DocumentTree::new();
        let root = tree.root();
        let p = tree.append_child(root, Block::paragraph("日本")).unwrap();
        let renderer = Renderer::new();

        let resolved = renderer.resolve_caret(&tree, Caret::new(p, 4)).unwrap();
        assert_eq!(resolved.offset, 3);
    }
}
