//! Defines how a group reaches the peers of a cluster.
//!
//! A [Group](crate::group::Group) never talks to the network itself. Instead it asks its
//! [PeerPicker](PeerPicker) who owns a key. If another peer does, the returned
//! [PeerGetter](PeerGetter) fetches the value from there. If the picker returns **None**, the key
//! is owned locally and the group invokes its own loader.
//!
//! [RingPeers](RingPeers) is the picker used in practice. It places all members of the cluster on
//! a [HashRing](crate::consistenthash::HashRing) and keeps one getter per remote member. The
//! member set can be replaced at any time via [RingPeers::set_peers](RingPeers::set_peers), which
//! builds a fresh ring. This is also how a peer is removed from the cluster.
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::consistenthash::HashRing;

/// Fetches the value of a key from a remote peer.
#[async_trait]
pub trait PeerGetter: Send + Sync {
    /// Asks the remote peer for the value of **key** within the given **group**.
    async fn get(&self, group: &str, key: &str) -> anyhow::Result<Vec<u8>>;
}

/// Determines which peer owns a key.
pub trait PeerPicker: Send + Sync {
    /// Returns the getter of the owning peer or **None** if the key is owned locally.
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>>;
}

/// Creates a getter for the peer at the given address.
pub type Connector = dyn Fn(&str) -> Arc<dyn PeerGetter> + Send + Sync;

/// Provides a [PeerPicker](PeerPicker) based on consistent hashing.
///
/// # Examples
/// ```
/// # use ringcache::peers::{PeerGetter, PeerPicker, RingPeers};
/// # use std::sync::Arc;
/// struct Unreachable;
///
/// #[async_trait::async_trait]
/// impl PeerGetter for Unreachable {
///     async fn get(&self, _group: &str, _key: &str) -> anyhow::Result<Vec<u8>> {
///         Err(anyhow::anyhow!("unreachable"))
///     }
/// }
///
/// let peers = RingPeers::new(Arc::new(|_address: &str| {
///     Arc::new(Unreachable) as Arc<dyn PeerGetter>
/// }));
///
/// // Without any members, everything is owned locally...
/// assert_eq!(peers.pick_peer("my-key").is_none(), true);
///
/// // ...and a single member cluster also only consists of ourself.
/// peers.set_peers("10.0.0.1:2410", 50, &["10.0.0.1:2410".to_owned()]);
/// assert_eq!(peers.pick_peer("my-key").is_none(), true);
/// ```
pub struct RingPeers {
    connector: Arc<Connector>,
    state: RwLock<RingState>,
}

struct RingState {
    self_address: String,
    ring: HashRing,
    getters: HashMap<String, Arc<dyn PeerGetter>>,
}

impl RingPeers {
    /// Creates an empty set of peers.
    ///
    /// The **connector** is invoked once for each remote member to create its getter.
    pub fn new(connector: Arc<Connector>) -> Self {
        RingPeers {
            connector,
            state: RwLock::new(RingState {
                self_address: String::new(),
                ring: HashRing::new(0, None),
                getters: HashMap::new(),
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, RingState> {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, RingState> {
        self.state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replaces the members of the cluster.
    ///
    /// **self_address** is the address under which this peer appears in **members**. Each member
    /// is placed **replicas** times on the ring. Getters of members which were already known are
    /// kept, so that their connections are reused. Members which are no longer listed are
    /// dropped along with their getters.
    pub fn set_peers(&self, self_address: &str, replicas: usize, members: &[String]) {
        let mut members: Vec<&str> = members.iter().map(|member| member.as_str()).collect();
        members.sort_unstable();
        members.dedup();

        let mut ring = HashRing::new(replicas, None);
        ring.add(&members);

        let mut state = self.write();
        let mut getters = HashMap::with_capacity(members.len());
        for member in members.iter().filter(|member| **member != self_address) {
            let getter = match state.getters.remove(*member) {
                Some(getter) => getter,
                None => {
                    log::debug!("Connecting to peer {}...", member);
                    (self.connector)(member)
                }
            };
            let _ = getters.insert((*member).to_owned(), getter);
        }

        log::info!(
            "Updated the cluster: {} is one of {} peer(s) ({} virtual nodes).",
            self_address,
            members.len(),
            ring.len()
        );

        state.self_address = self_address.to_owned();
        state.ring = ring;
        state.getters = getters;
    }

    /// Returns the address of this peer as given in the last call to **set_peers**.
    pub fn self_address(&self) -> String {
        self.read().self_address.clone()
    }

    /// Returns the number of virtual nodes per member.
    pub fn replicas(&self) -> usize {
        self.read().ring.replicas()
    }

    /// Lists all members of the cluster, including this peer.
    pub fn members(&self) -> Vec<String> {
        self.read()
            .ring
            .peers()
            .into_iter()
            .map(|peer| peer.to_owned())
            .collect()
    }

    /// Returns the address of the member owning the given key.
    pub fn owner(&self, key: &str) -> Option<String> {
        self.read().ring.get(key).map(|owner| owner.to_owned())
    }
}

impl PeerPicker for RingPeers {
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>> {
        let state = self.read();
        let owner = state.ring.get(key)?;
        if owner == state.self_address {
            return None;
        }

        log::debug!("Key {} is owned by peer {}...", key, owner);
        state.getters.get(owner).cloned()
    }
}

#[cfg(test)]
mod tests {
    use crate::peers::{PeerGetter, PeerPicker, RingPeers};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct NamedPeer(String);

    #[async_trait::async_trait]
    impl PeerGetter for NamedPeer {
        async fn get(&self, group: &str, key: &str) -> anyhow::Result<Vec<u8>> {
            Ok(format!("{}/{}@{}", group, key, self.0).into_bytes())
        }
    }

    fn peers_with_counter() -> (RingPeers, Arc<AtomicUsize>) {
        let connects = Arc::new(AtomicUsize::new(0));
        let counter = connects.clone();
        let peers = RingPeers::new(
            Arc::new(move |address: &str| {
                let _ = counter.fetch_add(1, Ordering::SeqCst);
                Arc::new(NamedPeer(address.to_owned())) as Arc<dyn PeerGetter>
            }),
        );

        (peers, connects)
    }

    fn members(addresses: &[&str]) -> Vec<String> {
        addresses.iter().map(|address| address.to_string()).collect()
    }

    #[test]
    fn keys_owned_by_self_are_loaded_locally() {
        let (peers, connects) = peers_with_counter();
        peers.set_peers("a", 50, &members(&["a", "b", "c"]));

        assert_eq!(connects.load(Ordering::SeqCst), 2);
        assert_eq!(peers.members(), vec!["a", "b", "c"]);

        let mut local = 0;
        let mut remote = 0;
        for index in 0..300 {
            let key = format!("key-{}", index);
            let owner = peers.owner(&key).unwrap();
            match peers.pick_peer(&key) {
                Some(_) => {
                    assert_ne!(owner, "a");
                    remote += 1;
                }
                None => {
                    assert_eq!(owner, "a");
                    local += 1;
                }
            }
        }

        assert!(local > 0);
        assert!(remote > 0);
    }

    #[test]
    fn picked_peers_are_the_owners() {
        let (peers, _) = peers_with_counter();
        peers.set_peers("a", 50, &members(&["a", "b"]));

        crate::testing::test_async(async {
            for index in 0..100 {
                let key = format!("key-{}", index);
                if let Some(getter) = peers.pick_peer(&key) {
                    let value = getter.get("scores", &key).await.unwrap();
                    assert_eq!(
                        String::from_utf8(value).unwrap(),
                        format!("scores/{}@b", key)
                    );
                }
            }
        });
    }

    #[test]
    fn rebuilding_keeps_known_getters_and_drops_removed_peers() {
        let (peers, connects) = peers_with_counter();
        peers.set_peers("a", 50, &members(&["a", "b", "c"]));
        peers.set_peers("a", 50, &members(&["a", "c", "d"]));

        // Only "d" required a new connection...
        assert_eq!(connects.load(Ordering::SeqCst), 3);
        assert_eq!(peers.members(), vec!["a", "c", "d"]);
        for index in 0..300 {
            assert_ne!(peers.owner(&format!("key-{}", index)).unwrap(), "b");
        }

        // Once we're alone, everything is local again...
        peers.set_peers("a", 50, &members(&["a"]));
        assert_eq!(peers.pick_peer("key-1").is_none(), true);
        assert_eq!(peers.self_address(), "a");
    }
}
