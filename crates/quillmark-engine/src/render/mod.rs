//! Virtual-node rendering: per-block cached representations, minimal
//! patch streams for the view surface, and content-hash keyed caches
//! with deferred math/diagram completion.

mod cache;
mod diff;
mod renderer;
mod vnode;

pub use cache::{CacheEntry, CompiledContent, RenderCaches, content_hash};
pub use diff::PatchOp;
pub use renderer::{DeferredJob, DeferredKind, Renderer, ResolvedCaret};
pub use vnode::{InlineToken, NodeAttrs, VirtualNode, scan_inline};
