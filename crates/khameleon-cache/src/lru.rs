//! Whole-entry least-recently-used cache

use bytes::Bytes;
use indexmap::IndexMap;
use khameleon_core::{CacheData, CachePolicy, Fragment, Header};
use tracing::debug;

use crate::{CacheHooks, CacheStats, FragmentCache};

/// Entries keyed by query, bounded by key count.
///
/// Recency order is the map's insertion order: front is least recent.
/// A write merges the fragment into the key's set unless
/// `replace_on_write` is set, in which case the set is replaced by the single
/// new fragment.
#[derive(Debug)]
pub struct LruCache {
    capacity: usize,
    replace_on_write: bool,
    entries: IndexMap<String, CacheData>,
    hooks: CacheHooks,
    stats: CacheStats,
}

impl LruCache {
    /// Cache holding up to `capacity` keys
    pub fn new(capacity: usize, hooks: CacheHooks) -> Self {
        Self {
            capacity,
            replace_on_write: false,
            entries: IndexMap::with_capacity(capacity + 1),
            hooks,
            stats: CacheStats::default(),
        }
    }

    /// Replace a key's fragment set on every write
    pub fn with_replace_on_write(mut self, replace: bool) -> Self {
        self.replace_on_write = replace;
        self
    }

    /// Keys from least to most recently used
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    fn evict_overflow(&mut self) {
        while self.entries.len() > self.capacity {
            let Some((key, data)) = self.entries.shift_remove_index(0) else {
                break;
            };
            for block_id in data.blocks.keys() {
                self.hooks.evicted(&key, *block_id, 0);
            }
            self.stats.evictions += data.blocks.len() as u64;
            debug!(key = %key, fragments = data.blocks.len(), "LRU evicted entry");
        }
    }
}

impl FragmentCache for LruCache {
    fn write(&mut self, data: Bytes, header: &Header, frame_index: u32) {
        let mut entry = self
            .entries
            .shift_remove(&header.key)
            .unwrap_or_else(|| CacheData::new(header.nblocks));

        if self.replace_on_write {
            let dropped: Vec<u32> = entry
                .blocks
                .keys()
                .copied()
                .filter(|id| *id != header.block_id)
                .collect();
            for block_id in dropped {
                self.hooks.evicted(&header.key, block_id, 0);
                self.stats.evictions += 1;
            }
            entry.blocks.clear();
        }

        entry.nblocks = header.nblocks;
        entry.blocks.insert(header.block_id, Fragment::new(data));
        self.entries.insert(header.key.clone(), entry);
        self.evict_overflow();

        self.stats.writes += 1;
        self.hooks.written(&header.key, header.block_id, frame_index);
    }

    fn get(&mut self, key: &str) -> Option<CacheData> {
        let Some(index) = self.entries.get_index_of(key) else {
            self.stats.misses += 1;
            return None;
        };
        let last = self.entries.len() - 1;
        self.entries.move_index(index, last);
        self.stats.hits += 1;

        let data = self.entries.get(key).cloned()?;
        self.hooks.read(key, &data);
        Some(data)
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
        CachePolicy::Lru
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
    use tokio::sync::mpsc;

    fn write(cache: &mut LruCache, key: &str, block_id: u32, nblocks: u32) {
        let payload = Bytes::from(format!("{key}-{block_id}"));
        cache.write(payload, &Header::new(key, block_id, nblocks), block_id);
    }

    #[test]
    fn test_merge_accumulates_fragments() {
        let mut cache = LruCache::new(4, CacheHooks::new());
        write(&mut cache, "a", 0, 3);
        write(&mut cache, "a", 2, 3);

        let data = cache.get("a").unwrap();
        assert_eq!(data.block_ids(), vec![0, 2]);
        assert_eq!(data.nblocks, 3);
        assert_eq!(&data.blocks[&2].data[..], b"a-2");
    }

    #[test]
    fn test_replace_on_write_keeps_only_latest() {
        let mut cache = LruCache::new(4, CacheHooks::new()).with_replace_on_write(true);
        write(&mut cache, "a", 0, 3);
        write(&mut cache, "a", 1, 3);

        let data = cache.get("a").unwrap();
        assert_eq!(data.block_ids(), vec![1]);
        assert_eq!(data.blocks[&1].count, 1);
    }

    #[test]
    fn test_evicts_least_recent_key() {
        let mut cache = LruCache::new(2, CacheHooks::new());
        write(&mut cache, "a", 0, 1);
        write(&mut cache, "b", 0, 1);
        // touch "a" so "b" becomes least recent
        assert!(cache.get("a").is_some());
        write(&mut cache, "c", 0, 1);

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
        assert_eq!(cache.keys().collect::<Vec<_>>(), vec!["a", "c"]);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_rewrite_refreshes_recency() {
        let mut cache = LruCache::new(2, CacheHooks::new());
        write(&mut cache, "a", 0, 2);
        write(&mut cache, "b", 0, 1);
        write(&mut cache, "a", 1, 2);
        write(&mut cache, "c", 0, 1);

        assert!(!cache.contains("b"));
        assert_eq!(cache.get("a").unwrap().held(), 2);
    }

    #[test]
    fn test_emits_block_event_per_write() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut cache = LruCache::new(2, CacheHooks::new().with_notifier(tx));
        write(&mut cache, "a", 0, 1);
        write(&mut cache, "b", 5, 6);

        let first = rx.try_recv().unwrap();
        assert_eq!(first.key, "a");
        assert_eq!(first.source, "cache");
        let second = rx.try_recv().unwrap();
        assert_eq!((second.key.as_str(), second.frame_index), ("b", 5));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_miss_counts() {
        let mut cache = LruCache::new(1, CacheHooks::new());
        assert!(cache.get("nope").is_none());
        write(&mut cache, "a", 0, 1);
        assert!(cache.get("a").is_some());

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.writes), (1, 1, 1));
        assert_eq!(stats.fragments, 1);
    }
}
