//! Generic set-associative LRU tag cache.
//!
//! Grounded on the original simulator's `perf_sim/mem/cache_tag_array.h`
//! (set-associative tag array with an LRU usage list per set) and on the
//! teacher's `LruPolicy` (`core/units/cache/policies/lru.rs`), whose
//! front-is-MRU `Vec<usize>` usage stack this reuses directly. Used both by
//! the branch predictor (§4.5) and, in principle, by any tag-only L1 model.

use std::hash::Hash;

struct Set<K, V> {
    entries: Vec<Option<(K, V)>>,
    /// Usage stack of way indices; front is MRU, back is LRU.
    usage: Vec<usize>,
}

impl<K, V> Set<K, V> {
    fn new(ways: usize) -> Self {
        let mut entries = Vec::with_capacity(ways);
        entries.resize_with(ways, || None);
        Self {
            entries,
            usage: (0..ways).collect(),
        }
    }

    fn touch(&mut self, way: usize) {
        self.usage.retain(|&w| w != way);
        self.usage.insert(0, way);
    }
}

/// A fixed-associativity, set-indexed LRU cache mapping `K` to `V`.
///
/// The number of sets is fixed at construction; a key's set is chosen by its
/// hash. Within a set, a full way array evicts the least-recently-used way
/// on insert; a partially-filled set uses the first free way.
pub struct LRUTagCache<K, V> {
    ways: usize,
    sets: Vec<Set<K, V>>,
}

impl<K: Eq + Hash + Clone, V> LRUTagCache<K, V> {
    /// Builds a cache with `num_sets` sets of `ways` ways each.
    ///
    /// # Panics
    ///
    /// Panics if `num_sets == 0` or `ways == 0`.
    #[must_use]
    pub fn new(num_sets: usize, ways: usize) -> Self {
        assert!(num_sets > 0 && ways > 0, "cache geometry must be non-empty");
        Self {
            ways,
            sets: (0..num_sets).map(|_| Set::new(ways)).collect(),
        }
    }

    /// Number of ways per set.
    #[must_use]
    pub fn ways(&self) -> usize {
        self.ways
    }

    fn set_index(&self, key: &K) -> usize {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::Hasher;
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.sets.len()
    }

    /// Looks up `key`, promoting its way to MRU on hit.
    pub fn lookup(&mut self, key: &K) -> Option<&V> {
        let idx = self.set_index(key);
        let set = &mut self.sets[idx];
        let way = set
            .entries
            .iter()
            .position(|e| matches!(e, Some((k, _)) if k == key))?;
        set.touch(way);
        set.entries[way].as_ref().map(|(_, v)| v)
    }

    /// Inserts or overwrites `key` with `value`.
    ///
    /// If `key` is already present, its way is updated in place and promoted
    /// to MRU. Otherwise a free way is used if one exists; if the set is
    /// full, the least-recently-used way is evicted.
    pub fn insert(&mut self, key: K, value: V) {
        let idx = self.set_index(&key);
        let set = &mut self.sets[idx];

        if let Some(way) = set
            .entries
            .iter()
            .position(|e| matches!(e, Some((k, _)) if *k == key))
        {
            set.entries[way] = Some((key, value));
            set.touch(way);
            return;
        }

        let way = set
            .entries
            .iter()
            .position(Option::is_none)
            .unwrap_or_else(|| *set.usage.last().expect("set has at least one way"));
        set.entries[way] = Some((key, value));
        set.touch(way);
    }

    /// True iff `key` is currently cached, without disturbing MRU order.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        let idx = self.set_index(key);
        self.sets[idx]
            .entries
            .iter()
            .any(|e| matches!(e, Some((k, _)) if k == key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_lookup_hits() {
        let mut cache: LRUTagCache<u32, u32> = LRUTagCache::new(1, 2);
        cache.insert(1, 100);
        assert_eq!(cache.lookup(&1), Some(&100));
    }

    #[test]
    fn lookup_of_absent_key_misses() {
        let mut cache: LRUTagCache<u32, u32> = LRUTagCache::new(1, 2);
        assert_eq!(cache.lookup(&1), None);
    }

    #[test]
    fn full_set_evicts_least_recently_used() {
        let mut cache: LRUTagCache<u32, u32> = LRUTagCache::new(1, 2);
        cache.insert(1, 10);
        cache.insert(2, 20);
        // touch key 1 so key 2 becomes LRU
        cache.lookup(&1);
        cache.insert(3, 30);
        assert!(cache.contains(&1));
        assert!(!cache.contains(&2));
        assert!(cache.contains(&3));
    }

    #[test]
    fn overwrite_existing_key_promotes_to_mru() {
        let mut cache: LRUTagCache<u32, u32> = LRUTagCache::new(1, 2);
        cache.insert(1, 10);
        cache.insert(2, 20);
        cache.insert(1, 11);
        cache.insert(3, 30);
        assert_eq!(cache.lookup(&1), Some(&11));
        assert!(!cache.contains(&2));
    }
}
