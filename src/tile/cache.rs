//! Cache for decoded tiles.
//!
//! An LRU cache from [`TileIndex`] to the tile's greyscale pixels, bounded
//! by entry count, total bytes, or both.
//!
//! # Eviction
//!
//! After every insert, least-recently-used entries are dropped while the
//! cache holds more than `max_items` entries, and then while the summed
//! pixel bytes exceed `max_bytes`. Byte usage is summed over the live
//! entries on demand rather than tracked incrementally.
//!
//! The cache has no internal locking; each fetcher owns its own.

use lru::LruCache;
use ndarray::Array2;
use tracing::trace;

use crate::stack::TileIndex;

/// Default maximum number of cached tiles
pub const DEFAULT_CACHE_ITEMS: usize = 10;

// =============================================================================
// Tile Cache
// =============================================================================

/// Bounded LRU cache of decoded tiles.
///
/// # Example
///
/// ```
/// use catmaid_tiles::stack::TileIndex;
/// use catmaid_tiles::tile::TileCache;
/// use ndarray::Array2;
///
/// let mut cache = TileCache::new(Some(2), None);
/// let a = TileIndex::new(0, 0, 0, 0, 4, 4);
/// let b = TileIndex::new(1, 0, 0, 0, 4, 4);
/// let c = TileIndex::new(2, 0, 0, 0, 4, 4);
///
/// cache.put(a, Array2::zeros((4, 4)));
/// cache.put(b, Array2::zeros((4, 4)));
/// cache.get(&a); // a is now the most recent
/// cache.put(c, Array2::zeros((4, 4)));
///
/// assert!(cache.contains(&a));
/// assert!(!cache.contains(&b));
/// ```
pub struct TileCache {
    entries: LruCache<TileIndex, Array2<u8>>,
    max_items: Option<usize>,
    max_bytes: Option<usize>,
}

impl TileCache {
    /// Create a cache; `None` disables that bound.
    pub fn new(max_items: Option<usize>, max_bytes: Option<usize>) -> Self {
        Self {
            entries: LruCache::unbounded(),
            max_items,
            max_bytes,
        }
    }

    pub fn max_items(&self) -> Option<usize> {
        self.max_items
    }

    pub fn max_bytes(&self) -> Option<usize> {
        self.max_bytes
    }

    /// Insert or overwrite a tile and mark it most recently used, then
    /// evict down to the bounds.
    pub fn put(&mut self, key: TileIndex, tile: Array2<u8>) {
        self.entries.put(key, tile);
        self.evict();
    }

    /// Look up a tile, marking it most recently used.
    pub fn get(&mut self, key: &TileIndex) -> Option<&Array2<u8>> {
        self.entries.get(key)
    }

    /// Whether a tile is cached, without touching recency.
    pub fn contains(&self, key: &TileIndex) -> bool {
        self.entries.contains(key)
    }

    pub fn remove(&mut self, key: &TileIndex) -> Option<Array2<u8>> {
        self.entries.pop(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total pixel bytes of every cached tile.
    pub fn current_bytes(&self) -> usize {
        self.entries.iter().map(|(_, tile)| tile.len()).sum()
    }

    /// Cached keys, least recently used first.
    pub fn keys(&self) -> Vec<TileIndex> {
        self.entries.iter().rev().map(|(key, _)| *key).collect()
    }

    fn evict(&mut self) {
        if let Some(max_items) = self.max_items {
            while self.entries.len() > max_items {
                if let Some((key, _)) = self.entries.pop_lru() {
                    trace!(tile = %key, "Evicted tile (item limit)");
                }
            }
        }

        if let Some(max_bytes) = self.max_bytes {
            let mut bytes = self.current_bytes();
            while bytes > max_bytes {
                match self.entries.pop_lru() {
                    Some((key, tile)) => {
                        trace!(tile = %key, bytes = tile.len(), "Evicted tile (byte limit)");
                        bytes -= tile.len();
                    }
                    None => break,
                }
            }
        }
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new(Some(DEFAULT_CACHE_ITEMS), None)
    }
}
