//! The per-document engine: one instance owns the tree, selection,
//! history, renderer and handler registry for a single open document.
//! Events are processed one at a time; nothing here is shared or global.

use std::time::Duration;

use crate::controllers::{EditContext, EditError, EditKind, HandlerRegistry, InputEvent};
use crate::cursor::{extract_range_html, extract_range_text, Selection};
use crate::history::{History, Snapshot};
use crate::markdown::{parse_markdown, serialize_markdown};
use crate::render::{DeferredJob, PatchOp, Renderer, ResolvedCaret};
use crate::tree::{Block, BlockKey, DocumentTree};

#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    pub history_depth: usize,
    pub coalesce_window: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            history_depth: History::DEFAULT_DEPTH,
            coalesce_window: History::DEFAULT_COALESCE_WINDOW,
        }
    }
}

pub struct DocumentEngine {
    tree: DocumentTree,
    selection: Selection,
    history: History,
    renderer: Renderer,
    registry: HandlerRegistry,
    options: EngineOptions,
    clipboard: Option<String>,
}

impl DocumentEngine {
    pub fn new(options: EngineOptions) -> Self {
        let tree = DocumentTree::default();
        let selection = initial_selection(&tree);
        let mut renderer = Renderer::new();
        // Prime the vnode map so the first event diffs instead of mounting
        renderer.render_full(&tree);
        Self {
            tree,
            selection,
            history: History::new(options.history_depth, options.coalesce_window),
            renderer,
            registry: HandlerRegistry::standard(),
            options,
            clipboard: None,
        }
    }

    pub fn from_markdown(text: &str, options: EngineOptions) -> (Self, Vec<PatchOp>) {
        let mut engine = Self::new(options);
        let patches = engine.load_markdown(text);
        (engine, patches)
    }

    /// Replace the document wholesale. History is reset; the surface gets
    /// a full patch stream.
    pub fn load_markdown(&mut self, text: &str) -> Vec<PatchOp> {
        self.tree = parse_markdown(text);
        self.selection = initial_selection(&self.tree);
        self.history = History::new(self.options.history_depth, self.options.coalesce_window);
        self.renderer = Renderer::new();
        self.renderer.render_full(&self.tree)
    }

    /// The single-threaded edit pipeline: dispatch, record history,
    /// re-render the dirty span. An event that changes nothing returns an
    /// empty patch stream and records nothing.
    pub fn apply_event(&mut self, event: &InputEvent) -> Result<Vec<PatchOp>, EditError> {
        let snapshot = Snapshot::capture(&self.tree, &self.selection);
        let outcome = {
            let mut ctx = EditContext {
                tree: &mut self.tree,
                selection: &mut self.selection,
            };
            self.registry.dispatch(&mut ctx, event)?
        };
        if let Some(text) = outcome.clipboard {
            self.clipboard = Some(text);
        }
        if outcome.dirty.is_none() {
            return Ok(Vec::new());
        }
        match outcome.kind {
            EditKind::InsertText | EditKind::DeleteBackward | EditKind::DeleteForward => {
                self.history.push_pending(snapshot, outcome.kind);
            }
            EditKind::Structural => self.history.push(snapshot),
        }
        Ok(self.renderer.render_partial(&self.tree, outcome.dirty))
    }

    pub fn undo(&mut self) -> Option<Vec<PatchOp>> {
        let current = Snapshot::capture(&self.tree, &self.selection);
        let snapshot = self.history.undo(current)?;
        self.restore(snapshot)
    }

    pub fn redo(&mut self) -> Option<Vec<PatchOp>> {
        let current = Snapshot::capture(&self.tree, &self.selection);
        let snapshot = self.history.redo(current)?;
        self.restore(snapshot)
    }

    fn restore(&mut self, snapshot: Snapshot) -> Option<Vec<PatchOp>> {
        self.tree = snapshot.tree;
        self.selection = snapshot.selection;
        Some(self.renderer.render_full(&self.tree))
    }

    pub fn markdown(&self) -> String {
        serialize_markdown(&self.tree)
    }

    pub fn tree(&self) -> &DocumentTree {
        &self.tree
    }

    pub fn get_block(&self, key: BlockKey) -> Option<&Block> {
        self.tree.get(key)
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// Move the selection from outside the edit pipeline. A selection
    /// jump is a coalescing boundary; an invalid target is ignored.
    pub fn set_selection(&mut self, selection: Selection) {
        if selection.is_valid(&self.tree) && selection != self.selection {
            self.history.commit_pending();
            self.selection = selection;
        }
    }

    pub fn resolved_caret(&self) -> Option<ResolvedCaret> {
        self.renderer.resolve_caret(&self.tree, self.selection.focus)
    }

    pub fn extract_selection_text(&self) -> String {
        let (start, end) = self.selection.ordered(&self.tree);
        extract_range_text(&self.tree, &start, &end)
    }

    pub fn extract_selection_html(&self) -> String {
        let (start, end) = self.selection.ordered(&self.tree);
        extract_range_html(&self.tree, &start, &end)
    }

    /// Most recent cut/copy payload, if an event produced one.
    pub fn take_clipboard(&mut self) -> Option<String> {
        self.clipboard.take()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn take_deferred(&mut self) -> Vec<DeferredJob> {
        self.renderer.take_deferred()
    }

    pub fn complete_deferred(
        &mut self,
        job: DeferredJob,
        result: Result<String, String>,
    ) -> Option<PatchOp> {
        self.renderer.complete_deferred(job, result)
    }
}

impl Default for DocumentEngine {
    fn default() -> Self {
        Self::new(EngineOptions::default())
    }
}

fn initial_selection(tree: &DocumentTree) -> Selection {
    let first = tree
        .first_text_descendant(tree.root())
        .unwrap_or_else(|| tree.root());
    Selection::collapsed_at(first, 0)
}
