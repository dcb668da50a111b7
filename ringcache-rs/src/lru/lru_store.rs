use linked_hash_map::LinkedHashMap;

use crate::lru::{ByteSize, OnEvicted};

/// Provides a size constrained LRU store.
///
/// A store behaves just like a **Map** as long as its keys and values fit into **max_bytes**.
/// Once an insertion pushes the total size above this limit, the least recently used entries
/// are evicted until the store fits again. A **max_bytes** of 0 disables the limit altogether.
///
/// Note that an entry which is larger than the whole store is accepted, but as nothing else
/// remains to be evicted, it will immediately be evicted itself, leaving an empty store behind.
///
/// # Examples
/// ```
/// # use ringcache::lru::LruStore;
/// // Specifies a store which can hold 12 bytes of keys and values...
/// let mut lru = LruStore::new(12);
///
/// lru.add("Foo".to_owned(), "Bar".to_owned());
/// assert_eq!(lru.get("Foo").unwrap(), &"Bar".to_owned());
///
/// // this will still fit..
/// lru.add("Foo1".to_owned(), "X".to_owned());
/// assert_eq!(lru.len(), 2);
///
/// // this will hit the memory constraint...
/// lru.add("Foo2".to_owned(), "XYZ".to_owned());
/// // ..and therefore will throw out the least recently used entry:
/// assert_eq!(lru.get("Foo").is_some(), false);
/// assert_eq!(lru.get("Foo1").is_some(), true);
/// assert_eq!(lru.get("Foo2").is_some(), true);
///```
pub struct LruStore<V: ByteSize> {
    max_bytes: usize,
    allocated_bytes: usize,
    map: LinkedHashMap<String, Entry<V>>,
    on_evicted: Option<Box<dyn OnEvicted<V> + Send>>,
}

struct Entry<V: ByteSize> {
    mem_size: usize,
    value: V,
}

impl<V: ByteSize> LruStore<V> {
    /// Creates a new store which permits its keys and values to occupy up to **max_bytes**.
    pub fn new(max_bytes: usize) -> Self {
        LruStore {
            max_bytes,
            allocated_bytes: 0,
            map: LinkedHashMap::new(),
            on_evicted: None,
        }
    }

    /// Creates a new store which notifies the given listener for each removed entry.
    pub fn with_listener<L>(max_bytes: usize, listener: L) -> Self
    where
        L: OnEvicted<V> + Send + 'static,
    {
        LruStore {
            on_evicted: Some(Box::new(listener)),
            ..LruStore::new(max_bytes)
        }
    }

    /// Stores the given value for the given key.
    ///
    /// If the key is already present, its value is replaced and the entry is marked as most
    /// recently used. Afterwards, the least recently used entries are evicted until the store
    /// fits into its limit again.
    ///
    /// # Examples
    /// ```
    /// # use ringcache::lru::LruStore;
    /// let mut lru = LruStore::new(0);
    ///
    /// lru.add("Foo".to_owned(), "Bar".to_owned());
    /// lru.add("Foo".to_owned(), "Barbara".to_owned());
    ///
    /// assert_eq!(lru.len(), 1);
    /// assert_eq!(lru.get("Foo").unwrap(), &"Barbara".to_owned());
    /// assert_eq!(lru.allocated_bytes(), 10);
    ///```
    pub fn add(&mut self, key: String, value: V) {
        let mem_size = key.len() + value.allocated_size();

        if let Some(entry) = self.map.get_refresh(key.as_str()) {
            self.allocated_bytes = self.allocated_bytes - entry.mem_size + mem_size;
            entry.mem_size = mem_size;
            entry.value = value;
        } else {
            self.allocated_bytes += mem_size;
            let _ = self.map.insert(key, Entry { mem_size, value });
        }

        self.enforce_constraints();
    }

    fn enforce_constraints(&mut self) {
        while self.max_bytes != 0 && self.allocated_bytes > self.max_bytes {
            if !self.remove_oldest() {
                break;
            }
        }
    }

    /// Returns the value which has previously been stored for the given key or **None** if
    /// no value is present.
    ///
    /// A successful lookup marks the entry as most recently used.
    pub fn get(&mut self, key: &str) -> Option<&V> {
        self.map.get_refresh(key).map(|entry| &entry.value)
    }

    /// Returns the value stored for the given key without touching its position in the
    /// usage order.
    pub fn peek(&self, key: &str) -> Option<&V> {
        self.map.get(key).map(|entry| &entry.value)
    }

    /// Removes the entry for the given key if present.
    ///
    /// Returns **true** if an entry was removed.
    ///
    /// # Examples
    /// ```
    /// # use ringcache::lru::LruStore;
    /// let mut lru = LruStore::new(1024);
    ///
    /// // After inserting a value...
    /// lru.add("Foo".to_owned(), "Bar".to_owned());
    /// // ..it can be retrieved.
    /// assert_eq!(lru.get("Foo").unwrap(), &"Bar".to_owned());
    ///
    /// // However, once it is removed...
    /// assert_eq!(lru.remove("Foo"), true);
    /// // ..it's no longer accessible.
    /// assert_eq!(lru.get("Foo"), None);
    /// assert_eq!(lru.allocated_bytes(), 0);
    /// ```
    pub fn remove(&mut self, key: &str) -> bool {
        match self.map.remove(key) {
            Some(entry) => {
                self.notify_removal(key.to_owned(), entry);
                true
            }
            None => false,
        }
    }

    /// Removes the least recently used entry.
    ///
    /// Returns **false** if the store was already empty.
    pub fn remove_oldest(&mut self) -> bool {
        match self.map.pop_front() {
            Some((key, entry)) => {
                self.notify_removal(key, entry);
                true
            }
            None => false,
        }
    }

    fn notify_removal(&mut self, key: String, entry: Entry<V>) {
        self.allocated_bytes -= entry.mem_size;

        if let Some(listener) = self.on_evicted.as_mut() {
            listener.on_evicted(key, entry.value);
        }
    }

    /// Removes all entries of this store.
    ///
    /// Note that the eviction listener (if present) is notified for every entry, starting with
    /// the least recently used one.
    pub fn clear(&mut self) {
        if self.on_evicted.is_some() {
            while self.remove_oldest() {}
        } else {
            self.map.clear();
            self.allocated_bytes = 0;
        }
    }

    /// Returns the number of entries in the store.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Determines if the store is completely empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns the number of bytes occupied by all keys and values.
    pub fn allocated_bytes(&self) -> usize {
        self.allocated_bytes
    }

    /// Returns the maximal number of bytes to be occupied (0 if unbounded).
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Changes the maximal amount of memory to be occupied by this store.
    ///
    /// If the limit is reduced, the least recently used entries are evicted immediately.
    ///
    /// # Examples
    /// ```
    /// # use ringcache::lru::LruStore;
    /// let mut lru = LruStore::new(0);
    /// lru.add("Foo0".to_owned(), "Bar".to_owned());
    /// lru.add("Foo1".to_owned(), "Bar".to_owned());
    /// lru.add("Foo2".to_owned(), "Bar".to_owned());
    ///
    /// // Only two entries of 7 bytes each remain...
    /// lru.set_max_bytes(14);
    /// assert_eq!(lru.len(), 2);
    /// assert_eq!(lru.get("Foo0"), None);
    /// ```
    pub fn set_max_bytes(&mut self, max_bytes: usize) {
        self.max_bytes = max_bytes;
        self.enforce_constraints();
    }

    /// Iterates over all keys, starting with the least recently used one.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(|key| key.as_str())
    }
}

#[cfg(test)]
mod tests {
    use crate::lru::LruStore;
    use std::sync::{Arc, Mutex};

    /// Sums up the size of all entries so that it can be compared to the tracked size.
    fn computed_size(lru: &LruStore<String>) -> usize {
        lru.keys()
            .map(|key| key.len() + lru.peek(key).map(|value| value.len()).unwrap_or(0))
            .sum()
    }

    #[test]
    fn existing_keys_are_updated_in_place() {
        let mut lru = LruStore::new(0);
        assert_eq!(lru.len(), 0);

        lru.add("key1".to_owned(), "value1".to_owned());
        assert_eq!(lru.len(), 1);

        lru.add("key1".to_owned(), "v1".to_owned());
        assert_eq!(lru.len(), 1);
        assert_eq!(lru.get("key1").unwrap(), "v1");
        assert_eq!(lru.allocated_bytes(), 6);
    }

    #[test]
    fn lookups_distinguish_hits_and_misses() {
        let mut lru = LruStore::new(0);
        lru.add("key1".to_owned(), "value1".to_owned());

        assert_eq!(lru.get("key1").unwrap(), "value1");
        assert_eq!(lru.get("key2"), None);
        assert_eq!(lru.allocated_bytes(), 10);
    }

    #[test]
    fn least_recently_used_entry_is_evicted_first() {
        let mut lru = LruStore::new("k1v1k2v2".len());
        lru.add("k1".to_owned(), "v1".to_owned());
        lru.add("k2".to_owned(), "v2".to_owned());
        lru.add("k3".to_owned(), "v3".to_owned());

        assert_eq!(lru.get("k1"), None);
        assert_eq!(lru.len(), 2);
        assert_eq!(lru.get("k3").unwrap(), "v3");

        // Reading "k2" protects it, so that "k3" is the next one to go...
        let _ = lru.get("k2");
        lru.add("k4".to_owned(), "v4".to_owned());
        assert_eq!(lru.get("k3"), None);
        assert_eq!(lru.get("k2").unwrap(), "v2");
        assert_eq!(lru.get("k4").unwrap(), "v4");
    }

    #[test]
    fn updating_an_entry_marks_it_as_recently_used() {
        let mut lru = LruStore::new("k1v1k2v2".len());
        lru.add("k1".to_owned(), "v1".to_owned());
        lru.add("k2".to_owned(), "v2".to_owned());
        lru.add("k1".to_owned(), "V1".to_owned());
        lru.add("k3".to_owned(), "v3".to_owned());

        assert_eq!(lru.get("k2"), None);
        assert_eq!(lru.get("k1").unwrap(), "V1");
        assert_eq!(lru.keys().collect::<Vec<_>>(), vec!["k3", "k1"]);
    }

    #[test]
    fn entries_can_be_removed() {
        let mut lru = LruStore::new("k1k2k3v1v2v3".len());
        lru.add("k1".to_owned(), "v1".to_owned());
        lru.add("k2".to_owned(), "v2".to_owned());
        lru.add("k3".to_owned(), "v3".to_owned());

        assert_eq!(lru.remove("k2"), true);
        assert_eq!(lru.remove("k2"), false);
        assert_eq!(lru.get("k2"), None);
        assert_eq!(lru.len(), 2);
        assert_eq!(lru.get("k3").unwrap(), "v3");
        assert_eq!(lru.allocated_bytes(), 8);
    }

    #[test]
    fn removing_the_oldest_entry_of_an_empty_store_is_a_no_op() {
        let mut lru: LruStore<String> = LruStore::new(10);
        assert_eq!(lru.remove_oldest(), false);
        assert_eq!(lru.len(), 0);
        assert_eq!(lru.allocated_bytes(), 0);
    }

    #[test]
    fn listener_observes_evictions_in_order() {
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let listener = evicted.clone();
        let mut lru = LruStore::with_listener(10, move |key: String, _: String| {
            listener.lock().unwrap().push(key);
        });

        lru.add("key1".to_owned(), "123456".to_owned());
        lru.add("k2".to_owned(), "v2".to_owned());
        lru.add("k3".to_owned(), "v3".to_owned());
        lru.add("k4".to_owned(), "v4".to_owned());

        assert_eq!(
            *evicted.lock().unwrap(),
            vec!["key1".to_owned(), "k2".to_owned()]
        );
    }

    #[test]
    fn listener_observes_explicit_removals() {
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let listener = evicted.clone();
        let mut lru = LruStore::with_listener(0, move |key: String, value: String| {
            listener.lock().unwrap().push(format!("{}={}", key, value));
        });

        lru.add("a".to_owned(), "1".to_owned());
        lru.add("b".to_owned(), "2".to_owned());
        lru.add("c".to_owned(), "3".to_owned());
        let _ = lru.remove("b");
        lru.clear();

        assert_eq!(
            *evicted.lock().unwrap(),
            vec!["b=2".to_owned(), "a=1".to_owned(), "c=3".to_owned()]
        );
        assert_eq!(lru.is_empty(), true);
        assert_eq!(lru.allocated_bytes(), 0);
    }

    #[test]
    fn an_oversized_entry_leaves_an_empty_store() {
        let mut lru = LruStore::new(8);
        lru.add("k1".to_owned(), "v1".to_owned());
        lru.add("huge".to_owned(), "X".repeat(64));

        assert_eq!(lru.len(), 0);
        assert_eq!(lru.allocated_bytes(), 0);
        assert_eq!(lru.get("huge"), None);
        assert_eq!(lru.get("k1"), None);
    }

    #[test]
    fn size_accounting_matches_the_stored_entries() {
        let mut lru = LruStore::new(64);
        for round in 0..50 {
            let key = format!("key{}", round % 7);
            let value = "x".repeat(round % 13);
            lru.add(key, value);

            if round % 5 == 0 {
                let _ = lru.remove(&format!("key{}", round % 3));
            }
            if round % 11 == 0 {
                let _ = lru.remove_oldest();
            }

            assert_eq!(lru.allocated_bytes(), computed_size(&lru));
            assert!(lru.allocated_bytes() <= 64);
        }
    }

    #[test]
    fn shrinking_the_limit_evicts_entries() {
        let mut lru = LruStore::new(0);
        for index in 0..10 {
            lru.add(format!("Hello{}", index), format!("World{}", index));
        }
        assert_eq!(lru.len(), 10);
        assert_eq!(lru.allocated_bytes(), 12 * 10);

        lru.set_max_bytes(12 * 4);
        assert_eq!(lru.max_bytes(), 12 * 4);
        assert_eq!(lru.len(), 4);
        assert_eq!(lru.get("Hello5"), None);
        assert_eq!(lru.get("Hello6").unwrap(), "World6");
    }
}
