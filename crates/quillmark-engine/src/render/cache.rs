//! Per-block render caches keyed by content hash.
//!
//! Every cache maps a block key to a `(hash, value)` pair. A lookup hits
//! only when the stored hash matches the block's current content hash, so
//! editing a block's text invalidates that block's entries and nobody
//! else's. Unmounting a block drops its entries outright.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};

use crate::render::vnode::InlineToken;
use crate::tree::BlockKey;

/// 64-bit content hash used for cache keys and deferred-job tokens.
pub fn content_hash(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub hash: u64,
    pub value: T,
}

/// Outcome of a deferred math/diagram build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompiledContent {
    /// Backend output ready for the view surface.
    Ready(String),
    /// Source failed to compile; rendered as a marked placeholder.
    Invalid(String),
}

#[derive(Debug, Default)]
pub struct RenderCaches {
    inline: HashMap<BlockKey, CacheEntry<Vec<InlineToken>>>,
    images: HashMap<BlockKey, CacheEntry<Vec<String>>>,
    math: HashMap<BlockKey, CacheEntry<CompiledContent>>,
    diagrams: HashMap<BlockKey, CacheEntry<CompiledContent>>,
}

impl RenderCaches {
    pub fn inline_tokens(&self, key: BlockKey, hash: u64) -> Option<&Vec<InlineToken>> {
        lookup(&self.inline, key, hash)
    }

    pub fn store_inline(&mut self, key: BlockKey, hash: u64, tokens: Vec<InlineToken>) {
        let images = tokens
            .iter()
            .filter_map(|t| match t {
                InlineToken::Image { src, .. } => Some(src.clone()),
                _ => None,
            })
            .collect::<Vec<_>>();
        if images.is_empty() {
            self.images.remove(&key);
        } else {
            self.images.insert(
                key,
                CacheEntry {
                    hash,
                    value: images,
                },
            );
        }
        self.inline.insert(
            key,
            CacheEntry {
                hash,
                value: tokens,
            },
        );
    }

    pub fn image_sources(&self, key: BlockKey, hash: u64) -> Option<&Vec<String>> {
        lookup(&self.images, key, hash)
    }

    pub fn math(&self, key: BlockKey, hash: u64) -> Option<&CompiledContent> {
        lookup(&self.math, key, hash)
    }

    pub fn store_math(&mut self, key: BlockKey, hash: u64, value: CompiledContent) {
        self.math.insert(key, CacheEntry { hash, value });
    }

    pub fn diagram(&self, key: BlockKey, hash: u64) -> Option<&CompiledContent> {
        lookup(&self.diagrams, key, hash)
    }

    pub fn store_diagram(&mut self, key: BlockKey, hash: u64, value: CompiledContent) {
        self.diagrams.insert(key, CacheEntry { hash, value });
    }

    /// Drop every entry for a block that left the tree.
    pub fn evict(&mut self, key: BlockKey) {
        self.inline.remove(&key);
        self.images.remove(&key);
        self.math.remove(&key);
        self.diagrams.remove(&key);
    }
}

fn lookup<T>(map: &HashMap<BlockKey, CacheEntry<T>>, key: BlockKey, hash: u64) -> Option<&T> {
    map.get(&key)
        .filter(|entry| entry.hash == hash)
        .map(|entry| &entry.value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_stale_hash_misses() {
        let mut caches = RenderCaches::default();
        let key = BlockKey::new();
        let hash = content_hash("old text");
        caches.store_inline(key, hash, vec![InlineToken::Text("old text".to_string())]);

        assert!(caches.inline_tokens(key, hash).is_some());
        assert!(caches.inline_tokens(key, content_hash("new text")).is_none());
    }

    #[test]
    fn test_store_inline_tracks_image_sources() {
        let mut caches = RenderCaches::default();
        let key = BlockKey::new();
        let hash = content_hash("![a](x.png)");
        caches.store_inline(
            key,
            hash,
            vec![InlineToken::Image {
                alt: "a".to_string(),
                src: "x.png".to_string(),
            }],
        );
        assert_eq!(
            caches.image_sources(key, hash),
            Some(&vec!["x.png".to_string()])
        );

        // Re-store without images clears the derived entry
        let hash2 = content_hash("plain");
        caches.store_inline(key, hash2, vec![InlineToken::Text("plain".to_string())]);
        assert!(caches.image_sources(key, hash2).is_none());
    }

    #[test]
    fn test_evict_clears_all_entries() {
        let mut caches = RenderCaches::default();
        let key = BlockKey::new();
        let hash = content_hash("x");
        caches.store_inline(key, hash, vec![]);
        caches.store_math(key, hash, CompiledContent::Ready("x".to_string()));

        caches.evict(key);
        assert!(caches.inline_tokens(key, hash).is_none());
        assert!(caches.math(key, hash).is_none());
    }
}
