//! Provides a thread safe wrapper around an [LruStore](crate::lru::LruStore).
//!
//! Each [Group](crate::group::Group) owns exactly one **Cache**. All operations acquire a single
//! mutex for the duration of an in-memory operation, therefore no I/O ever happens while the
//! lock is held. The underlying store is only created once the first value is added, so that
//! groups which are registered but never used don't allocate anything.
use std::sync::Mutex;

use crate::byteview::ByteView;
use crate::lru::LruStore;

/// Guards a lazily created [LruStore](crate::lru::LruStore) of [ByteViews](ByteView).
///
/// # Examples
/// ```
/// # use ringcache::cache::Cache;
/// # use ringcache::byteview::ByteView;
/// let cache = Cache::new(1024);
/// assert_eq!(cache.get("Foo"), None);
///
/// cache.add("Foo", ByteView::from("Bar"));
/// assert_eq!(cache.get("Foo").unwrap().to_string(), "Bar");
/// ```
pub struct Cache {
    inner: Mutex<Inner>,
}

struct Inner {
    max_bytes: usize,
    store: Option<LruStore<ByteView>>,
    gets: u64,
    hits: u64,
}

/// Provides a snapshot of the metrics of a [Cache](Cache).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Contains the number of bytes occupied by all keys and values.
    pub bytes: usize,
    /// Contains the number of entries.
    pub items: usize,
    /// Contains the number of lookups.
    pub gets: u64,
    /// Contains the number of lookups which found a value.
    pub hits: u64,
}

impl CacheStats {
    /// Returns the cache hit rate in percent.
    pub fn hit_rate(&self) -> f32 {
        match self.gets {
            0 => 0.,
            n => self.hits as f32 / n as f32 * 100.,
        }
    }
}

impl Cache {
    /// Creates a new cache which will hold up to **max_bytes** of keys and values.
    ///
    /// Note that 0 is treated as "unbounded".
    pub fn new(max_bytes: usize) -> Self {
        Cache {
            inner: Mutex::new(Inner {
                max_bytes,
                store: None,
                gets: 0,
                hits: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stores the given value, creating the underlying store if necessary.
    pub fn add(&self, key: &str, value: ByteView) {
        let mut inner = self.lock();
        let max_bytes = inner.max_bytes;
        inner
            .store
            .get_or_insert_with(|| LruStore::new(max_bytes))
            .add(key.to_owned(), value);
    }

    /// Performs a lookup for the given key.
    ///
    /// A successful lookup marks the entry as most recently used.
    pub fn get(&self, key: &str) -> Option<ByteView> {
        let mut inner = self.lock();
        inner.gets += 1;

        let value = inner
            .store
            .as_mut()
            .and_then(|store| store.get(key).cloned());
        if value.is_some() {
            inner.hits += 1;
        }

        value
    }

    /// Removes the value stored for the given key.
    pub fn remove(&self, key: &str) -> bool {
        self.lock()
            .store
            .as_mut()
            .map(|store| store.remove(key))
            .unwrap_or(false)
    }

    /// Returns the maximal number of bytes to be occupied.
    pub fn max_bytes(&self) -> usize {
        self.lock().max_bytes
    }

    /// Changes the maximal number of bytes to be occupied.
    ///
    /// If the limit was reduced, the least recently used entries are evicted right away.
    pub fn set_max_bytes(&self, max_bytes: usize) {
        let mut inner = self.lock();
        inner.max_bytes = max_bytes;
        if let Some(store) = inner.store.as_mut() {
            store.set_max_bytes(max_bytes);
        }
    }

    /// Determines if the underlying store has already been created.
    pub fn is_initialized(&self) -> bool {
        self.lock().store.is_some()
    }

    /// Returns the current metrics of this cache.
    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            bytes: inner
                .store
                .as_ref()
                .map(|store| store.allocated_bytes())
                .unwrap_or(0),
            items: inner.store.as_ref().map(|store| store.len()).unwrap_or(0),
            gets: inner.gets,
            hits: inner.hits,
        }
    }
}
