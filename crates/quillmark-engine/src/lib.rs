pub mod controllers;
pub mod cursor;
pub mod engine;
pub mod history;
pub mod io;
pub mod markdown;
pub mod render;
pub mod tree;

// Re-export key types for easier usage
pub use controllers::{
    DirtyRange, EditError, EditKind, EditOutcome, EventKind, HandlerRegistry, InputEvent,
    PasteContent,
};
pub use cursor::{Caret, Selection};
pub use engine::{DocumentEngine, EngineOptions};
pub use history::{History, Snapshot};
pub use io::*;
pub use markdown::{parse_markdown, serialize_markdown};
pub use render::{DeferredJob, PatchOp, Renderer, ResolvedCaret, VirtualNode};
pub use tree::{Block, BlockKey, BlockKind, BlockTag, DocumentTree, TreeError};
