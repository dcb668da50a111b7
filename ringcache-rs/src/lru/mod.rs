//! Provides a size constrained LRU store.
//!
//! An LRU store drops the least recently used entry once the total size of its keys and values
//! grows beyond a given limit. The size of each entry is computed as the length of its key plus
//! the [ByteSize](ByteSize) of its value.
//!
//! The store itself is not thread safe at all, it is intended to be guarded by an outer lock.
//! This is exactly what [Cache](crate::cache::Cache) does.
//!
//! Each store can be equipped with an [OnEvicted](OnEvicted) listener which is notified for
//! every entry which leaves the store, either due to an explicit removal or because the store
//! had to make room for new entries.
mod lru_store;

pub use lru_store::LruStore;

/// Returns the allocated memory in bytes.
pub trait ByteSize {
    /// Returns the number of bytes occupied by the payload of this value.
    ///
    /// This is used to enforce the memory limit of a store and therefore only needs to account
    /// for the "largest" part of a value (e.g. the bytes of a string but not its length field).
    fn allocated_size(&self) -> usize;
}

impl ByteSize for String {
    fn allocated_size(&self) -> usize {
        self.len()
    }
}

impl ByteSize for Vec<u8> {
    fn allocated_size(&self) -> usize {
        self.len()
    }
}

impl ByteSize for bytes::Bytes {
    fn allocated_size(&self) -> usize {
        self.len()
    }
}

/// Receives entries which have been removed from an [LruStore](LruStore).
///
/// Any closure accepting the key and the value of the removed entry can be used as listener.
/// As stores are commonly moved between threads, a listener has to be **Send**.
///
/// # Examples
/// ```
/// # use ringcache::lru::LruStore;
/// # use std::sync::{Arc, Mutex};
/// let evicted = Arc::new(Mutex::new(Vec::new()));
/// let listener = evicted.clone();
///
/// // Room for two entries of 4 bytes each...
/// let mut lru = LruStore::with_listener(8, move |key: String, _value: String| {
///     listener.lock().unwrap().push(key)
/// });
/// lru.add("k1".to_owned(), "v1".to_owned());
/// lru.add("k2".to_owned(), "v2".to_owned());
///
/// // ..therefore the third one pushes the oldest one out.
/// lru.add("k3".to_owned(), "v3".to_owned());
/// assert_eq!(*evicted.lock().unwrap(), vec!["k1".to_owned()]);
/// ```
pub trait OnEvicted<V> {
    /// Invoked once the given entry has been removed from the store.
    fn on_evicted(&mut self, key: String, value: V);
}

impl<V, F> OnEvicted<V> for F
where
    F: FnMut(String, V),
{
    fn on_evicted(&mut self, key: String, value: V) {
        self(key, value)
    }
}
