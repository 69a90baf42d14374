/// A sorted map from child key to child value, carrying each entry's own `size`
/// and the running sum of sizes of lexicographically earlier siblings (spec.md 3,
/// "Ordered-Sum Map"). Lookups by key are a binary search over `keys`; random
/// access by cumulative offset is a binary search over `cum` (inclusive prefix
/// sums), matching spec.md 4.3's "upper-bound-minus-one" rule.
pub struct OrderedSumMap<K, V> {
    keys: Vec<K>,
    values: Vec<V>,
    sizes: Vec<usize>,
    cum: Vec<usize>,
}

impl<K: Ord + Copy, V> OrderedSumMap<K, V> {
    pub fn new() -> Self {
        OrderedSumMap {
            keys: Vec::new(),
            values: Vec::new(),
            sizes: Vec::new(),
            cum: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn find(&self, key: K) -> Result<usize, usize> {
        self.keys.binary_search(&key)
    }

    pub fn get(&self, key: K) -> Option<&V> {
        self.find(key).ok().map(|i| &self.values[i])
    }

    pub fn get_index(&self, key: K) -> Option<usize> {
        self.find(key).ok()
    }

    pub fn key_at(&self, index: usize) -> K {
        self.keys[index]
    }

    pub fn value_at(&self, index: usize) -> &V {
        &self.values[index]
    }

    pub fn size_at(&self, index: usize) -> usize {
        self.sizes[index]
    }

    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    /// Inserts `key` with `value` and size 0 if absent; returns its index either way.
    pub fn get_or_insert_with(&mut self, key: K, make: impl FnOnce() -> V) -> usize {
        match self.find(key) {
            Ok(i) => i,
            Err(i) => {
                self.keys.insert(i, key);
                self.values.insert(i, make());
                self.sizes.insert(i, 0);
                let prefix = if i == 0 { 0 } else { self.cum[i - 1] };
                self.cum.insert(i, prefix);
                i
            }
        }
    }

    /// Adds `delta` to `key`'s recorded size, propagating to every later sibling's
    /// partial sum. `key` must already exist.
    pub fn add_size(&mut self, key: K, delta: isize) {
        let i = self.find(key).expect("add_size on missing child key");
        self.sizes[i] = (self.sizes[i] as isize + delta) as usize;
        for c in self.cum.iter_mut().skip(i) {
            *c = (*c as isize + delta) as usize;
        }
    }

    pub fn total_size(&self) -> usize {
        self.cum.last().copied().unwrap_or(0)
    }

    /// Locates the child containing the `offset`-th element and the offset
    /// relative to that child's own range.
    pub fn locate(&self, offset: usize) -> Option<(usize, usize)> {
        if offset >= self.total_size() {
            return None;
        }
        // First index whose inclusive cumulative sum exceeds `offset`.
        let idx = self.cum.partition_point(|&c| c <= offset);
        let prefix = if idx == 0 { 0 } else { self.cum[idx - 1] };
        Some((idx, offset - prefix))
    }
}

impl<K: Ord + Copy, V> Default for OrderedSumMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_keeps_keys_sorted() {
        let mut map: OrderedSumMap<u32, &str> = OrderedSumMap::new();
        map.get_or_insert_with(5, || "five");
        map.get_or_insert_with(1, || "one");
        map.get_or_insert_with(3, || "three");
        assert_eq!(map.keys(), &[1, 3, 5]);
    }

    #[test]
    fn add_size_propagates_to_later_siblings() {
        let mut map: OrderedSumMap<u32, &str> = OrderedSumMap::new();
        map.get_or_insert_with(1, || "a");
        map.get_or_insert_with(2, || "b");
        map.get_or_insert_with(3, || "c");

        map.add_size(1, 3);
        map.add_size(2, 2);

        assert_eq!(map.size_at(0), 3);
        assert_eq!(map.size_at(1), 2);
        assert_eq!(map.total_size(), 5);
    }

    #[test]
    fn locate_finds_owning_child_and_relative_offset() {
        let mut map: OrderedSumMap<u32, &str> = OrderedSumMap::new();
        map.get_or_insert_with(1, || "a");
        map.get_or_insert_with(2, || "b");
        map.get_or_insert_with(3, || "c");
        map.add_size(1, 3);
        map.add_size(2, 2);
        map.add_size(3, 4);

        assert_eq!(map.locate(0), Some((0, 0)));
        assert_eq!(map.locate(2), Some((0, 2)));
        assert_eq!(map.locate(3), Some((1, 0)));
        assert_eq!(map.locate(4), Some((1, 1)));
        assert_eq!(map.locate(5), Some((2, 0)));
        assert_eq!(map.locate(8), Some((2, 3)));
        assert_eq!(map.locate(9), None);
    }
}
