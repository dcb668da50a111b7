//! Provides the group coordinator which implements the cache-aside read path.
//!
//! A **Group** is a named cache namespace. It combines a [Cache](crate::cache::Cache), a
//! [Loader](Loader) which knows how to produce a value for a key and an optional
//! [PeerPicker](crate::peers::PeerPicker) which decides which peer of the cluster is responsible
//! for a key.
//!
//! A lookup via [Group::get](Group::get) works as follows:
//! 1. An empty key is rejected right away.
//! 2. If the local cache contains the key, the cached value is returned.
//! 3. Otherwise, if the picker reports a remote owner, the value is fetched from that peer.
//!    Peers answer these requests via [Group::get_locally](Group::get_locally), therefore a
//!    request is never forwarded more than once.
//! 4. If the key is owned locally (or no picker is present), the loader is invoked.
//!
//! Successfully fetched values are put into the local cache. Failures are reported as
//! [CacheError::LoadFailure](crate::error::CacheError::LoadFailure) and never cached, so the next
//! lookup tries again.
//!
//! # Load modes
//! By default, concurrent misses for the same key each invoke the loader (or peer). Using
//! [LoadMode::SingleFlight](LoadMode::SingleFlight), all callers which miss the same key while a
//! load is running wait for this load and share its result.
//!
//! # Examples
//! ```
//! # use ringcache::group::{Group, LoaderFn};
//! # use std::sync::Arc;
//! # #[tokio::main]
//! # async fn main() {
//! let group = Group::builder("scores")
//!     .max_bytes(2 * 1024)
//!     .loader(LoaderFn::new(|key: &str| match key {
//!         "Tom" => Ok(b"630".to_vec()),
//!         _ => Err(anyhow::anyhow!("{} does not exist", key)),
//!     }))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(group.get("Tom").await.unwrap().to_string(), "630");
//! assert_eq!(group.get("Sam").await.is_err(), true);
//! # }
//! ```
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};

use crate::byteview::ByteView;
use crate::cache::{Cache, CacheStats};
use crate::error::CacheError;
use crate::peers::PeerPicker;

/// Produces the value of a key from the underlying data source.
#[async_trait]
pub trait Loader: Send + Sync {
    /// Loads the raw bytes for the given key.
    async fn load(&self, key: &str) -> anyhow::Result<Vec<u8>>;
}

/// Turns a plain (blocking) closure into a [Loader](Loader).
///
/// This is intended for cheap computations or tests. Anything which performs I/O should rather
/// implement **Loader** directly.
pub struct LoaderFn<F> {
    function: F,
}

impl<F> LoaderFn<F>
where
    F: Fn(&str) -> anyhow::Result<Vec<u8>> + Send + Sync,
{
    /// Wraps the given closure.
    pub fn new(function: F) -> Self {
        LoaderFn { function }
    }
}

#[async_trait]
impl<F> Loader for LoaderFn<F>
where
    F: Fn(&str) -> anyhow::Result<Vec<u8>> + Send + Sync,
{
    async fn load(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        (self.function)(key)
    }
}

/// Determines how concurrent misses for the same key are handled.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LoadMode {
    /// Each miss performs its own load.
    Concurrent,
    /// At most one load per key is in flight, all other callers await its result.
    SingleFlight,
}

impl Default for LoadMode {
    fn default() -> Self {
        LoadMode::Concurrent
    }
}

/// Provides a snapshot of the statistics of a group.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct GroupStats {
    /// Contains the number of lookups (including rejected ones).
    pub gets: u64,
    /// Contains the number of lookups served by the local cache.
    pub cache_hits: u64,
    /// Contains the number of lookups which missed the cache.
    pub loads: u64,
    /// Contains the number of misses which joined an already running load.
    pub loads_deduped: u64,
    /// Contains the number of values successfully fetched from a remote peer.
    pub peer_loads: u64,
    /// Contains the number of failed remote fetches.
    pub peer_errors: u64,
    /// Contains the number of values successfully produced by the local loader.
    pub local_loads: u64,
    /// Contains the number of failures reported by the local loader.
    pub local_load_errors: u64,
}

#[derive(Default)]
struct Counters {
    gets: AtomicU64,
    cache_hits: AtomicU64,
    loads: AtomicU64,
    loads_deduped: AtomicU64,
    peer_loads: AtomicU64,
    peer_errors: AtomicU64,
    local_loads: AtomicU64,
    local_load_errors: AtomicU64,
}

fn increment(counter: &AtomicU64) {
    let _ = counter.fetch_add(1, Ordering::Relaxed);
}

impl Counters {
    fn snapshot(&self) -> GroupStats {
        GroupStats {
            gets: self.gets.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            loads_deduped: self.loads_deduped.load(Ordering::Relaxed),
            peer_loads: self.peer_loads.load(Ordering::Relaxed),
            peer_errors: self.peer_errors.load(Ordering::Relaxed),
            local_loads: self.local_loads.load(Ordering::Relaxed),
            local_load_errors: self.local_load_errors.load(Ordering::Relaxed),
        }
    }
}

type SharedLoad = Shared<BoxFuture<'static, Result<ByteView, CacheError>>>;

type InFlight = Mutex<HashMap<FlightKey, SharedLoad>>;

fn lock_flights(in_flight: &InFlight) -> MutexGuard<'_, HashMap<FlightKey, SharedLoad>> {
    in_flight
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Distinguishes routed loads from loads on behalf of another peer in the in-flight table.
#[derive(Clone, Hash, PartialEq, Eq)]
struct FlightKey {
    routed: bool,
    key: String,
}

/// Contains everything a running load needs, so that it can outlive the call which started it.
struct Source {
    name: String,
    loader: Arc<dyn Loader>,
    peers: Option<Arc<dyn PeerPicker>>,
    cache: Cache,
    counters: Counters,
}

impl Source {
    async fn load(&self, key: &str, routed: bool) -> Result<ByteView, CacheError> {
        if routed {
            if let Some(peer) = self.peers.as_ref().and_then(|peers| peers.pick_peer(key)) {
                return match peer.get(&self.name, key).await {
                    Ok(data) => {
                        increment(&self.counters.peer_loads);
                        Ok(self.populate(key, data))
                    }
                    Err(error) => {
                        increment(&self.counters.peer_errors);
                        log::warn!(
                            "Fetching {} of group {} from its peer failed: {:#}",
                            key,
                            self.name,
                            error
                        );
                        Err(CacheError::load_failure(key, error))
                    }
                };
            }
        }

        match self.loader.load(key).await {
            Ok(data) => {
                increment(&self.counters.local_loads);
                Ok(self.populate(key, data))
            }
            Err(error) => {
                increment(&self.counters.local_load_errors);
                log::debug!("Loading {} of group {} failed: {:#}", key, self.name, error);
                Err(CacheError::load_failure(key, error))
            }
        }
    }

    fn populate(&self, key: &str, data: Vec<u8>) -> ByteView {
        let value = ByteView::from(data);
        self.cache.add(key, value.clone());
        value
    }
}

/// Represents a named cache namespace along with its loader.
pub struct Group {
    source: Arc<Source>,
    mode: LoadMode,
    in_flight: Arc<InFlight>,
}

impl Group {
    /// Creates a group which caches up to **max_bytes** and loads values via **loader**.
    ///
    /// The group has no peers and uses [LoadMode::Concurrent](LoadMode::Concurrent). Use
    /// [Group::builder](Group::builder) for anything else.
    pub fn new(name: impl Into<String>, max_bytes: usize, loader: Arc<dyn Loader>) -> Self {
        Group::create(name.into(), max_bytes, loader, None, LoadMode::Concurrent)
    }

    /// Creates a builder for a group with the given name.
    pub fn builder(name: impl Into<String>) -> GroupBuilder {
        GroupBuilder {
            name: name.into(),
            max_bytes: 0,
            loader: None,
            peers: None,
            mode: LoadMode::Concurrent,
        }
    }

    fn create(
        name: String,
        max_bytes: usize,
        loader: Arc<dyn Loader>,
        peers: Option<Arc<dyn PeerPicker>>,
        mode: LoadMode,
    ) -> Self {
        Group {
            source: Arc::new(Source {
                name,
                loader,
                peers,
                cache: Cache::new(max_bytes),
                counters: Counters::default(),
            }),
            mode,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns the name of this group.
    pub fn name(&self) -> &str {
        &self.source.name
    }

    /// Returns the load mode of this group.
    pub fn load_mode(&self) -> LoadMode {
        self.mode
    }

    /// Determines if this group delegates keys to other peers.
    pub fn has_peers(&self) -> bool {
        self.source.peers.is_some()
    }

    /// Returns the value for the given key.
    ///
    /// Misses are served by the owning peer or, if the key is owned locally, by the loader.
    pub async fn get(&self, key: &str) -> Result<ByteView, CacheError> {
        self.lookup(key, true).await
    }

    /// Returns the value for the given key without ever asking another peer.
    ///
    /// This is used to answer requests of other peers which have determined that this peer owns
    /// the key.
    pub async fn get_locally(&self, key: &str) -> Result<ByteView, CacheError> {
        self.lookup(key, false).await
    }

    async fn lookup(&self, key: &str, routed: bool) -> Result<ByteView, CacheError> {
        increment(&self.source.counters.gets);
        if key.is_empty() {
            return Err(CacheError::InvalidArgument);
        }

        if let Some(value) = self.source.cache.get(key) {
            log::debug!("Cache hit for {} in group {}.", key, self.source.name);
            increment(&self.source.counters.cache_hits);
            return Ok(value);
        }

        log::debug!("Cache miss for {} in group {}.", key, self.source.name);
        increment(&self.source.counters.loads);

        match self.mode {
            LoadMode::Concurrent => self.source.load(key, routed).await,
            LoadMode::SingleFlight => self.load_once(key, routed).await,
        }
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, HashMap<FlightKey, SharedLoad>> {
        lock_flights(&self.in_flight)
    }

    /// Joins the running load of the key or starts a new one.
    ///
    /// The load itself removes its entry once it completes. Therefore the entry outlives callers
    /// which give up waiting, and a load which nobody awaits anymore is resumed by the next
    /// caller of the same key.
    async fn load_once(&self, key: &str, routed: bool) -> Result<ByteView, CacheError> {
        let flight_key = FlightKey {
            routed,
            key: key.to_owned(),
        };

        let load = {
            let mut in_flight = self.lock_in_flight();
            if let Some(load) = in_flight.get(&flight_key) {
                increment(&self.source.counters.loads_deduped);
                load.clone()
            } else {
                let source = self.source.clone();
                let table: Weak<InFlight> = Arc::downgrade(&self.in_flight);
                let owned_key = flight_key.clone();
                let load = async move {
                    let result = source.load(&owned_key.key, owned_key.routed).await;
                    if let Some(table) = table.upgrade() {
                        let _ = lock_flights(&table).remove(&owned_key);
                    }

                    result
                }
                .boxed()
                .shared();
                let _ = in_flight.insert(flight_key, load.clone());

                load
            }
        };

        load.await
    }

    /// Changes the number of bytes the cache of this group may occupy.
    ///
    /// Shrinking the limit evicts the least recently used entries right away.
    pub fn set_cache_bytes(&self, max_bytes: usize) {
        self.source.cache.set_max_bytes(max_bytes);
    }

    /// Returns the number of bytes the cache of this group may occupy.
    pub fn cache_bytes(&self) -> usize {
        self.source.cache.max_bytes()
    }

    /// Returns the metrics of the underlying cache.
    pub fn cache_stats(&self) -> CacheStats {
        self.source.cache.stats()
    }

    /// Returns the statistics of this group.
    pub fn stats(&self) -> GroupStats {
        self.source.counters.snapshot()
    }
}

impl Display for Group {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        let cache = self.cache_stats();
        writeln!(f, "{:<30} {:>20}", "Group", self.name())?;
        writeln!(f, "{:<30} {:>20}", "Load mode", format!("{:?}", self.mode))?;
        writeln!(f, "{:<30} {:>20}", "Entries", cache.items)?;
        writeln!(
            f,
            "{:<30} {:>20}",
            "Memory",
            format!(
                "{} / {}",
                crate::fmt::format_size(cache.bytes),
                crate::fmt::format_size(self.cache_bytes())
            )
        )?;
        writeln!(f, "{:<30} {:>20}", "Gets", stats.gets)?;
        writeln!(f, "{:<30} {:>20}", "Cache hits", stats.cache_hits)?;
        writeln!(f, "{:<30} {:>19.2}%", "Hit rate", cache.hit_rate())?;
        writeln!(f, "{:<30} {:>20}", "Loads", stats.loads)?;
        writeln!(f, "{:<30} {:>20}", "Deduplicated loads", stats.loads_deduped)?;
        writeln!(f, "{:<30} {:>20}", "Peer loads", stats.peer_loads)?;
        writeln!(f, "{:<30} {:>20}", "Peer errors", stats.peer_errors)?;
        writeln!(f, "{:<30} {:>20}", "Local loads", stats.local_loads)?;
        writeln!(f, "{:<30} {:>20}", "Local load errors", stats.local_load_errors)
    }
}

/// Collects the settings of a [Group](Group).
pub struct GroupBuilder {
    name: String,
    max_bytes: usize,
    loader: Option<Arc<dyn Loader>>,
    peers: Option<Arc<dyn PeerPicker>>,
    mode: LoadMode,
}

impl GroupBuilder {
    /// Specifies the number of bytes the cache may occupy (0 = unbounded).
    pub fn max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Specifies the loader which produces values for locally owned keys.
    pub fn loader(self, loader: impl Loader + 'static) -> Self {
        self.shared_loader(Arc::new(loader))
    }

    /// Specifies a loader which is shared with other groups.
    pub fn shared_loader(mut self, loader: Arc<dyn Loader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Specifies the picker which determines the owner of a key.
    pub fn peers(mut self, peers: Arc<dyn PeerPicker>) -> Self {
        self.peers = Some(peers);
        self
    }

    /// Specifies how concurrent misses for the same key are handled.
    pub fn load_mode(mut self, mode: LoadMode) -> Self {
        self.mode = mode;
        self
    }

    /// Creates the group.
    ///
    /// Fails with [CacheError::Configuration](CacheError::Configuration) if no loader was given.
    pub fn build(self) -> Result<Group, CacheError> {
        let loader = self.loader.ok_or_else(|| {
            CacheError::Configuration(format!("group '{}' requires a loader", self.name))
        })?;

        Ok(Group::create(
            self.name, self.max_bytes, loader, self.peers, self.mode,
        ))
    }
}

#[cfg(test)]
mod tests {
    use crate::error::CacheError;
    use crate::group::{Group, LoadMode, Loader, LoaderFn};
    use crate::peers::{PeerGetter, PeerPicker};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Serves a fixed set of scores and counts how often each key was requested.
    struct CountingLoader {
        calls: std::sync::Mutex<HashMap<String, usize>>,
        delay: Option<Duration>,
    }

    impl CountingLoader {
        fn new(delay: Option<Duration>) -> Arc<Self> {
            Arc::new(CountingLoader {
                calls: std::sync::Mutex::new(HashMap::new()),
                delay,
            })
        }

        fn calls(&self, key: &str) -> usize {
            self.calls.lock().unwrap().get(key).copied().unwrap_or(0)
        }
    }

    #[async_trait::async_trait]
    impl Loader for CountingLoader {
        async fn load(&self, key: &str) -> anyhow::Result<Vec<u8>> {
            *self.calls.lock().unwrap().entry(key.to_owned()).or_insert(0) += 1;
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            match key {
                "Tom" => Ok(b"630".to_vec()),
                "Jack" => Ok(b"589".to_vec()),
                "Sam" => Ok(b"567".to_vec()),
                _ => Err(anyhow::anyhow!("{} does not exist", key)),
            }
        }
    }

    /// Claims that all keys starting with "remote" are owned by another peer.
    struct FakePeers {
        getter: Arc<FakeGetter>,
    }

    struct FakeGetter {
        calls: AtomicUsize,
    }

    impl PeerPicker for FakePeers {
        fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>> {
            if key.starts_with("remote") {
                Some(self.getter.clone())
            } else {
                None
            }
        }
    }

    #[async_trait::async_trait]
    impl PeerGetter for FakeGetter {
        async fn get(&self, group: &str, key: &str) -> anyhow::Result<Vec<u8>> {
            let _ = self.calls.fetch_add(1, Ordering::SeqCst);
            if key.ends_with("broken") {
                Err(anyhow::anyhow!("connection refused"))
            } else {
                Ok(format!("{}:{}", group, key).into_bytes())
            }
        }
    }

    fn group_with_peers(loader: Arc<CountingLoader>) -> (Group, Arc<FakeGetter>) {
        let getter = Arc::new(FakeGetter {
            calls: AtomicUsize::new(0),
        });
        let group = Group::builder("scores")
            .shared_loader(loader)
            .peers(Arc::new(FakePeers {
                getter: getter.clone(),
            }))
            .build()
            .unwrap();

        (group, getter)
    }

    #[test]
    fn values_are_loaded_once_and_then_cached() {
        crate::testing::test_async(async {
            let loader = CountingLoader::new(None);
            let group = Group::new("scores", 2 << 10, loader.clone());

            for (key, value) in [("Tom", "630"), ("Jack", "589"), ("Sam", "567")] {
                assert_eq!(group.get(key).await.unwrap().to_string(), value);
                assert_eq!(group.get(key).await.unwrap().to_string(), value);
                assert_eq!(loader.calls(key), 1);
            }

            let stats = group.stats();
            assert_eq!(stats.gets, 6);
            assert_eq!(stats.cache_hits, 3);
            assert_eq!(stats.loads, 3);
            assert_eq!(stats.local_loads, 3);
            assert_eq!(group.cache_stats().items, 3);
        });
    }

    #[test]
    fn empty_keys_are_rejected() {
        crate::testing::test_async(async {
            let loader = CountingLoader::new(None);
            let group = Group::new("scores", 0, loader.clone());

            assert!(matches!(
                group.get("").await,
                Err(CacheError::InvalidArgument)
            ));
            assert!(matches!(
                group.get_locally("").await,
                Err(CacheError::InvalidArgument)
            ));
            assert_eq!(loader.calls(""), 0);
        });
    }

    #[test]
    fn failures_are_not_cached() {
        crate::testing::test_async(async {
            let loader = CountingLoader::new(None);
            let group = Group::new("scores", 0, loader.clone());

            for _ in 0..2 {
                match group.get("Unknown").await {
                    Err(CacheError::LoadFailure { key, cause }) => {
                        assert_eq!(key, "Unknown");
                        assert_eq!(cause.to_string(), "Unknown does not exist");
                    }
                    other => panic!("unexpected result: {:?}", other),
                }
            }

            assert_eq!(loader.calls("Unknown"), 2);
            assert_eq!(group.stats().local_load_errors, 2);
            assert_eq!(group.cache_stats().items, 0);

            // A failing key doesn't affect others...
            assert_eq!(group.get("Tom").await.unwrap().to_string(), "630");
        });
    }

    #[test]
    fn remotely_owned_keys_are_fetched_from_the_peer() {
        crate::testing::test_async(async {
            let loader = CountingLoader::new(None);
            let (group, getter) = group_with_peers(loader.clone());

            assert_eq!(
                group.get("remote-1").await.unwrap().to_string(),
                "scores:remote-1"
            );
            assert_eq!(
                group.get("remote-1").await.unwrap().to_string(),
                "scores:remote-1"
            );
            assert_eq!(getter.calls.load(Ordering::SeqCst), 1);
            assert_eq!(loader.calls("remote-1"), 0);

            // Locally owned keys never touch the peer...
            assert_eq!(group.get("Tom").await.unwrap().to_string(), "630");
            assert_eq!(getter.calls.load(Ordering::SeqCst), 1);

            let stats = group.stats();
            assert_eq!(stats.peer_loads, 1);
            assert_eq!(stats.local_loads, 1);
        });
    }

    #[test]
    fn peer_failures_do_not_fall_back_to_the_loader() {
        crate::testing::test_async(async {
            let loader = CountingLoader::new(None);
            let (group, getter) = group_with_peers(loader.clone());

            assert!(matches!(
                group.get("remote-broken").await,
                Err(CacheError::LoadFailure { .. })
            ));
            assert_eq!(getter.calls.load(Ordering::SeqCst), 1);
            assert_eq!(loader.calls("remote-broken"), 0);
            assert_eq!(group.stats().peer_errors, 1);
        });
    }

    #[test]
    fn local_gets_never_ask_a_peer() {
        crate::testing::test_async(async {
            let loader = CountingLoader::new(None);
            let (group, getter) = group_with_peers(loader.clone());

            assert!(group.get_locally("remote-1").await.is_err());
            assert_eq!(getter.calls.load(Ordering::SeqCst), 0);
            assert_eq!(loader.calls("remote-1"), 1);
        });
    }

    #[test]
    fn single_flight_shares_a_running_load() {
        crate::testing::test_async(async {
            let loader = CountingLoader::new(Some(Duration::from_millis(50)));
            let group = Group::builder("scores")
                .shared_loader(loader.clone())
                .load_mode(LoadMode::SingleFlight)
                .build()
                .unwrap();

            let results = futures::future::join_all((0..10).map(|_| group.get("Tom"))).await;
            for result in results {
                assert_eq!(result.unwrap().to_string(), "630");
            }

            assert_eq!(loader.calls("Tom"), 1);
            assert_eq!(group.stats().loads_deduped, 9);
            assert_eq!(group.lock_in_flight().is_empty(), true);

            // Errors are shared as well but not remembered...
            let results = futures::future::join_all((0..3).map(|_| group.get("Bob"))).await;
            assert!(results.iter().all(|result| result.is_err()));
            assert_eq!(loader.calls("Bob"), 1);
            assert!(group.get("Bob").await.is_err());
            assert_eq!(loader.calls("Bob"), 2);
        });
    }

    #[test]
    fn single_flight_survives_callers_which_give_up() {
        crate::testing::test_async(async {
            let loader = CountingLoader::new(Some(Duration::from_millis(200)));
            let group = Group::builder("scores")
                .shared_loader(loader.clone())
                .load_mode(LoadMode::SingleFlight)
                .build()
                .unwrap();

            // The first caller gives up while another one still waits for the load...
            let impatient = tokio::time::timeout(Duration::from_millis(20), group.get("Tom"));
            let patient = async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                group.get("Tom").await
            };
            let late = async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                group.get("Tom").await
            };
            let (impatient, patient, late) = tokio::join!(impatient, patient, late);

            assert_eq!(impatient.is_err(), true);
            assert_eq!(patient.unwrap().to_string(), "630");
            assert_eq!(late.unwrap().to_string(), "630");
            assert_eq!(loader.calls("Tom"), 1);
            assert_eq!(group.stats().loads_deduped, 2);

            // A load without any remaining caller is picked up by the next one...
            assert_eq!(
                tokio::time::timeout(Duration::from_millis(20), group.get("Jack"))
                    .await
                    .is_err(),
                true
            );
            assert_eq!(group.get("Jack").await.unwrap().to_string(), "589");
            assert_eq!(loader.calls("Jack"), 1);
            assert_eq!(group.lock_in_flight().is_empty(), true);
        });
    }

    #[test]
    fn concurrent_mode_loads_for_each_miss() {
        crate::testing::test_async(async {
            let loader = CountingLoader::new(Some(Duration::from_millis(20)));
            let group = Group::new("scores", 0, loader.clone());

            let _ = futures::future::join_all((0..4).map(|_| group.get("Tom"))).await;
            assert_eq!(loader.calls("Tom"), 4);
            assert_eq!(group.stats().loads_deduped, 0);
        });
    }

    #[test]
    fn a_loader_is_required() {
        assert!(matches!(
            Group::builder("scores").build(),
            Err(CacheError::Configuration(_))
        ));

        let group = Group::builder("scores")
            .loader(LoaderFn::new(|key: &str| Ok(key.as_bytes().to_vec())))
            .build()
            .unwrap();
        assert_eq!(group.name(), "scores");
        assert_eq!(group.has_peers(), false);
        assert_eq!(group.load_mode(), LoadMode::Concurrent);
    }

    #[test]
    fn shrinking_the_cache_evicts_entries() {
        crate::testing::test_async(async {
            let group = Group::builder("echo")
                .max_bytes(64)
                .loader(LoaderFn::new(|key: &str| Ok(key.as_bytes().to_vec())))
                .build()
                .unwrap();

            for index in 0..4 {
                let _ = group.get(&format!("key-{}", index)).await.unwrap();
            }
            assert_eq!(group.cache_stats().bytes, 40);

            group.set_cache_bytes(20);
            assert_eq!(group.cache_bytes(), 20);
            assert_eq!(group.cache_stats().items, 2);
            assert_eq!(group.cache_stats().bytes, 20);
        });
    }
}
