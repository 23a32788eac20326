use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::world::ChunkPos;

/// Serialized blobs of recently unloaded chunks, evicted least recently used first
#[derive(Debug, Default)]
pub struct ChunkCache {
    capacity: usize,
    entries: FxHashMap<ChunkPos, (Vec<u8>, u64)>,
    /// Access stamp to position, oldest first
    order: BTreeMap<u64, ChunkPos>,
    clock: u64,
    bytes: usize,
    hits: u64,
    misses: u64,
}

impl ChunkCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total size of the stored blobs
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn hit_rate(&self) -> f32 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f32 / total as f32
        }
    }

    pub fn contains(&self, pos: ChunkPos) -> bool {
        self.entries.contains_key(&pos)
    }

    /// Store a blob, evicting the oldest entries over capacity
    pub fn insert(&mut self, pos: ChunkPos, blob: Vec<u8>) {
        if self.capacity == 0 {
            return;
        }
        self.remove(pos);
        self.clock += 1;
        self.bytes += blob.len();
        self.order.insert(self.clock, pos);
        self.entries.insert(pos, (blob, self.clock));

        while self.entries.len() > self.capacity {
            let Some((_, oldest)) = self.order.pop_first() else {
                break;
            };
            if let Some((blob, _)) = self.entries.remove(&oldest) {
                self.bytes -= blob.len();
                log::trace!("[ChunkCache] Evicted {:?}", oldest);
            }
        }
    }

    /// Remove and return a blob; a chunk leaves the cache when it becomes resident again
    pub fn take(&mut self, pos: ChunkPos) -> Option<Vec<u8>> {
        match self.remove(pos) {
            Some(blob) => {
                self.hits += 1;
                Some(blob)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    fn remove(&mut self, pos: ChunkPos) -> Option<Vec<u8>> {
        let (blob, stamp) = self.entries.remove(&pos)?;
        self.order.remove(&stamp);
        self.bytes -= blob.len();
        Some(blob)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.bytes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_least_recent_is_evicted() {
        let mut cache = ChunkCache::new(2);
        cache.insert(ChunkPos::new(0, 0), vec![1; 10]);
        cache.insert(ChunkPos::new(1, 0), vec![2; 10]);
        // Re-inserting refreshes the stamp
        cache.insert(ChunkPos::new(0, 0), vec![3; 10]);
        cache.insert(ChunkPos::new(2, 0), vec![4; 10]);

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(ChunkPos::new(1, 0)));
        assert_eq!(cache.bytes(), 20);
        assert_eq!(cache.take(ChunkPos::new(0, 0)), Some(vec![3; 10]));
        assert_eq!(cache.take(ChunkPos::new(0, 0)), None);
        assert!((cache.hit_rate() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let mut cache = ChunkCache::new(0);
        cache.insert(ChunkPos::new(0, 0), vec![1]);
        assert!(cache.is_empty());
    }
}
