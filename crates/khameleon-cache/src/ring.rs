//! Reference-counted FIFO ring cache

use bytes::Bytes;
use khameleon_core::{CacheData, CachePolicy, Fragment, Header};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, warn};

use crate::{CacheHooks, CacheStats, FragmentCache};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Slot {
    key: String,
    block_id: u32,
}

/// Ring of `(key, fragment)` insertion slots.
///
/// Every write occupies one slot. When the ring is full the oldest slot is
/// released first: its fragment's count drops by one, the fragment is freed at
/// zero, and the key's entry is dropped once it holds no fragments. Writing a
/// fragment that is already held bumps its count and replaces its payload.
///
/// Invariant: the sum of all fragment counts equals the number of slots, which
/// never exceeds `capacity`.
#[derive(Debug)]
pub struct RingCache {
    capacity: usize,
    ring: VecDeque<Slot>,
    entries: HashMap<String, CacheData>,
    hooks: CacheHooks,
    stats: CacheStats,
}

impl RingCache {
    /// Ring with `capacity` slots
    pub fn new(capacity: usize, hooks: CacheHooks) -> Self {
        Self {
            capacity,
            ring: VecDeque::with_capacity(capacity),
            entries: HashMap::new(),
            hooks,
            stats: CacheStats::default(),
        }
    }

    /// Occupied slots
    pub fn slots(&self) -> usize {
        self.ring.len()
    }

    /// Reference count of one fragment, zero when absent
    pub fn ref_count(&self, key: &str, block_id: u32) -> u32 {
        self.entries
            .get(key)
            .and_then(|e| e.blocks.get(&block_id))
            .map(|f| f.count)
            .unwrap_or(0)
    }

    fn evict(&mut self, slot: Slot) {
        let Some(entry) = self.entries.get_mut(&slot.key) else {
            warn!(key = %slot.key, block_id = slot.block_id, "Ring slot without entry");
            return;
        };
        let Some(fragment) = entry.blocks.get_mut(&slot.block_id) else {
            warn!(key = %slot.key, block_id = slot.block_id, "Ring slot without fragment");
            return;
        };

        fragment.count = fragment.count.saturating_sub(1);
        let remaining = fragment.count;
        if remaining == 0 {
            entry.blocks.remove(&slot.block_id);
            self.stats.evictions += 1;
            debug!(key = %slot.key, block_id = slot.block_id, "Ring freed fragment");
        }
        if entry.blocks.is_empty() {
            self.entries.remove(&slot.key);
        }
        self.hooks.evicted(&slot.key, slot.block_id, remaining);
    }
}

impl FragmentCache for RingCache {
    fn write(&mut self, data: Bytes, header: &Header, frame_index: u32) {
        self.stats.writes += 1;
        if self.capacity == 0 {
            debug!(key = %header.key, block_id = header.block_id, "Zero-slot ring drops write");
            return;
        }
        if self.ring.len() + 1 > self.capacity {
            if let Some(slot) = self.ring.pop_front() {
                self.evict(slot);
            }
        }

        self.ring.push_back(Slot {
            key: header.key.clone(),
            block_id: header.block_id,
        });

        let entry = self
            .entries
            .entry(header.key.clone())
            .or_insert_with(|| CacheData::new(header.nblocks));
        entry.nblocks = header.nblocks;
        match entry.blocks.get_mut(&header.block_id) {
            Some(fragment) => {
                fragment.count += 1;
                fragment.data = data;
            }
            None => {
                entry.blocks.insert(header.block_id, Fragment::new(data));
            }
        }

        self.hooks.written(&header.key, header.block_id, frame_index);
    }

    fn get(&mut self, key: &str) -> Option<CacheData> {
        match self.entries.get(key) {
            Some(data) => {
                self.stats.hits += 1;
                let data = data.clone();
                self.hooks.read(key, &data);
                Some(data)
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn policy(&self) -> CachePolicy {
        CachePolicy::RingIndex
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            fragments: self.entries.values().map(CacheData::held).sum(),
            ..self.stats.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use khameleon_core::{SystemLogger, TelemetrySink};
    use std::sync::Arc;

    fn write(cache: &mut RingCache, key: &str, block_id: u32, nblocks: u32) {
        cache.write(
            Bytes::from(format!("{key}-{block_id}")),
            &Header::new(key, block_id, nblocks),
            1,
        );
    }

    #[test]
    fn test_zero_slots_hold_nothing() {
        let mut cache = RingCache::new(0, CacheHooks::new());
        write(&mut cache, "a", 0, 1);
        write(&mut cache, "a", 1, 2);

        assert_eq!(cache.slots(), 0);
        assert!(cache.is_empty());
        assert!(cache.get("a").is_none());
        assert_eq!(cache.stats().writes, 2);
    }

    #[test]
    fn test_capacity_two_evicts_oldest_key() {
        let mut cache = RingCache::new(2, CacheHooks::new());
        write(&mut cache, "a", 0, 1);
        write(&mut cache, "b", 0, 1);
        write(&mut cache, "c", 0, 1);

        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
        assert_eq!(cache.slots(), 2);
    }

    #[test]
    fn test_duplicate_delivery_is_ref_counted() {
        let mut cache = RingCache::new(3, CacheHooks::new());
        write(&mut cache, "a", 0, 2);
        write(&mut cache, "a", 0, 2);
        assert_eq!(cache.ref_count("a", 0), 2);
        assert_eq!(cache.get("a").unwrap().held(), 1);

        write(&mut cache, "b", 0, 1);
        // evicts the first "a"/0 slot; one reference survives
        write(&mut cache, "c", 0, 1);
        assert_eq!(cache.ref_count("a", 0), 1);
        assert!(cache.contains("a"));

        // evicts the second "a"/0 slot
        write(&mut cache, "d", 0, 1);
        assert_eq!(cache.ref_count("a", 0), 0);
        assert!(!cache.contains("a"));
    }

    #[test]
    fn test_entry_survives_while_any_fragment_held() {
        let mut cache = RingCache::new(2, CacheHooks::new());
        write(&mut cache, "a", 0, 2);
        write(&mut cache, "a", 1, 2);
        write(&mut cache, "b", 0, 1);

        let data = cache.get("a").unwrap();
        assert_eq!(data.block_ids(), vec![1]);
    }

    #[test]
    fn test_nblocks_tracks_latest_header() {
        let mut cache = RingCache::new(4, CacheHooks::new());
        write(&mut cache, "a", 0, 2);
        write(&mut cache, "a", 1, 5);
        assert_eq!(cache.get("a").unwrap().nblocks, 5);
    }

    #[test]
    fn test_duplicate_replaces_payload() {
        let mut cache = RingCache::new(4, CacheHooks::new());
        cache.write(Bytes::from_static(b"old"), &Header::new("a", 0, 1), 1);
        cache.write(Bytes::from_static(b"new"), &Header::new("a", 0, 1), 2);
        assert_eq!(&cache.get("a").unwrap().blocks[&0].data[..], b"new");
    }

    #[test]
    fn test_over_push_reporting() {
        let logger = Arc::new(SystemLogger::new(true, false));
        let hooks = CacheHooks::new().with_telemetry(logger.clone());
        let mut cache = RingCache::new(1, hooks);

        write(&mut cache, "a", 0, 1);
        assert!(cache.get("a").is_some());
        write(&mut cache, "b", 0, 1);
        write(&mut cache, "c", 0, 1);

        let record = logger.over_push();
        assert_eq!(record.total, 3);
        // "a" was read before eviction, "b" never was
        assert_eq!(record.missed, 1);
        assert!(logger.summary().is_none());
    }
}
