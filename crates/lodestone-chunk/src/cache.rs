use lodestone_common::ChunkKey;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::chunk::Chunk;

pub type ChunkRef = Rc<RefCell<Chunk>>;

/// Explicit bounded LRU over shared chunk handles. Dirty chunks are
/// pinned: capacity pressure only ever evicts clean entries, so unsaved
/// work cannot be dropped.
pub struct ChunkCache {
    capacity: usize,
    map: HashMap<ChunkKey, ChunkRef>,
    // Front is least recently used.
    order: VecDeque<ChunkKey>,
}

impl ChunkCache {
    pub fn new(capacity: usize) -> Self {
        ChunkCache {
            capacity: capacity.max(1),
            map: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get(&mut self, key: ChunkKey) -> Option<ChunkRef> {
        let chunk = self.map.get(&key)?.clone();
        self.touch(key);
        Some(chunk)
    }

    pub fn contains(&self, key: ChunkKey) -> bool {
        self.map.contains_key(&key)
    }

    pub fn insert(&mut self, key: ChunkKey, chunk: ChunkRef) {
        if self.map.insert(key, chunk).is_none() {
            self.order.push_back(key);
        } else {
            self.touch(key);
        }
        self.evict_over_capacity();
    }

    pub fn remove(&mut self, key: ChunkKey) -> Option<ChunkRef> {
        let chunk = self.map.remove(&key)?;
        self.order.retain(|k| *k != key);
        Some(chunk)
    }

    /// Keys of every chunk currently marked dirty.
    pub fn dirty_keys(&self) -> Vec<ChunkKey> {
        self.map
            .iter()
            .filter(|(_, c)| c.borrow().is_dirty())
            .map(|(k, _)| *k)
            .collect()
    }

    fn touch(&mut self, key: ChunkKey) {
        self.order.retain(|k| *k != key);
        self.order.push_back(key);
    }

    fn evict_over_capacity(&mut self) {
        while self.map.len() > self.capacity {
            let Some(pos) = self
                .order
                .iter()
                .position(|k| !self.map[k].borrow().is_dirty())
            else {
                // Everything is dirty; stay over capacity rather than
                // lose unsaved chunks.
                return;
            };
            let key = self.order.remove(pos).unwrap();
            self.map.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean_chunk(cx: i32, cz: i32) -> ChunkRef {
        let mut chunk = Chunk::new(cx, cz);
        chunk.mark_clean();
        Rc::new(RefCell::new(chunk))
    }

    fn key(cx: i32, cz: i32) -> ChunkKey {
        ChunkKey::new(cx, cz)
    }

    #[test]
    fn test_lru_evicts_oldest_clean() {
        let mut cache = ChunkCache::new(2);
        cache.insert(key(0, 0), clean_chunk(0, 0));
        cache.insert(key(1, 0), clean_chunk(1, 0));
        cache.insert(key(2, 0), clean_chunk(2, 0));

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(key(0, 0)));
        assert!(cache.contains(key(1, 0)));
        assert!(cache.contains(key(2, 0)));
    }

    #[test]
    fn test_get_refreshes_recency() {
        let mut cache = ChunkCache::new(2);
        cache.insert(key(0, 0), clean_chunk(0, 0));
        cache.insert(key(1, 0), clean_chunk(1, 0));

        assert!(cache.get(key(0, 0)).is_some());
        cache.insert(key(2, 0), clean_chunk(2, 0));

        // (1, 0) was the least recently used after the get.
        assert!(cache.contains(key(0, 0)));
        assert!(!cache.contains(key(1, 0)));
    }

    #[test]
    fn test_dirty_chunks_are_pinned() {
        let mut cache = ChunkCache::new(1);
        // Chunk::new starts dirty.
        cache.insert(key(0, 0), Rc::new(RefCell::new(Chunk::new(0, 0))));
        cache.insert(key(1, 0), clean_chunk(1, 0));

        // The clean newcomer is evicted before the dirty resident.
        assert!(cache.contains(key(0, 0)));
        assert_eq!(cache.len(), 1);

        assert_eq!(cache.dirty_keys(), vec![key(0, 0)]);
    }
}
