//! Capacity-bounded cache that hands evicted entries back to the caller.
//!
//! Nothing is released implicitly: `push` returns the least recently used
//! entry once the cache is over capacity and the caller decides how to close
//! it.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

pub(crate) struct LruCache<K, V> {
    capacity: usize,
    tick: u64,
    entries: HashMap<K, (V, u64)>,
    /// Last-use tick to key; the first entry is the eviction candidate.
    recency: BTreeMap<u64, K>,
}

impl<K: Eq + Hash + Clone, V> LruCache<K, V> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tick: 0,
            entries: HashMap::new(),
            recency: BTreeMap::new(),
        }
    }

    /// Look up `key`, marking it most recently used.
    pub(crate) fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let tick = self.next_tick();
        let (value, last_used) = self.entries.get_mut(key)?;
        self.recency.remove(&*last_used);
        *last_used = tick;
        self.recency.insert(tick, key.clone());
        Some(value)
    }

    /// Insert `value` as most recently used.
    ///
    /// Returns the entry that no longer fits: the previous value for `key`,
    /// or the least recently used entry when the cache is over capacity.
    pub(crate) fn push(&mut self, key: K, value: V) -> Option<(K, V)> {
        let tick = self.next_tick();
        self.recency.insert(tick, key.clone());
        if let Some((old, last_used)) = self.entries.insert(key.clone(), (value, tick)) {
            self.recency.remove(&last_used);
            return Some((key, old));
        }
        if self.entries.len() > self.capacity {
            return self.pop_lru();
        }
        None
    }

    pub(crate) fn pop_lru(&mut self) -> Option<(K, V)> {
        let (_, key) = self.recency.pop_first()?;
        let (value, _) = self.entries.remove(&key)?;
        Some((key, value))
    }

    pub(crate) fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn values_mut(&mut self) -> impl Iterator<Item = (&K, &mut V)> {
        self.entries.iter_mut().map(|(key, (value, _))| (key, value))
    }

    /// Remove every entry, least recently used first.
    pub(crate) fn drain(&mut self) -> Vec<(K, V)> {
        let mut drained = Vec::with_capacity(self.entries.len());
        while let Some(entry) = self.pop_lru() {
            drained.push(entry);
        }
        drained
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}
