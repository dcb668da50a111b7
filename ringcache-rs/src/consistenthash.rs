//! Provides a consistent-hash ring which maps keys onto peers.
//!
//! Each peer is placed onto a ring of 32-bit hash values several times (once per *replica* or
//! virtual node). A key is owned by the peer whose position is the first one at or after the
//! hash of the key, wrapping around at the end of the ring. Using virtual nodes smooths out the
//! distribution of keys across a small number of peers. Adding a peer only moves the keys which
//! now fall into one of its intervals, all other keys keep their owner.
//!
//! Note that two virtual nodes of different peers might hash to the same position. In this
//! case the peer added last owns the position. Using a well distributed 32-bit hash this is
//! rare enough to be ignored.
//!
//! The ring itself is not synchronized, as it is only mutated via **&mut self**. Shared access
//! is provided by [RingPeers](crate::peers::RingPeers) which keeps the ring behind a **RwLock**.
//!
//! # Examples
//! ```
//! # use ringcache::consistenthash::HashRing;
//! let mut ring = HashRing::new(50, None);
//! assert_eq!(ring.get("my-key"), None);
//!
//! ring.add(&["10.0.0.1:2410", "10.0.0.2:2410", "10.0.0.3:2410"]);
//! let owner = ring.get("my-key").unwrap().to_owned();
//!
//! // Lookups are deterministic...
//! assert_eq!(ring.get("my-key").unwrap(), owner);
//! ```
use fnv::FnvHashMap;

/// Maps arbitrary data onto a position on the ring.
pub type Hash = fn(&[u8]) -> u32;

/// Represents the ring of virtual nodes.
pub struct HashRing {
    hash: Hash,
    replicas: usize,
    positions: Vec<u32>,
    owners: FnvHashMap<u32, String>,
}

impl HashRing {
    /// Creates a new and empty ring which places each peer **replicas** times.
    ///
    /// If no hash function is given, CRC-32 (IEEE) is used.
    pub fn new(replicas: usize, hash: Option<Hash>) -> Self {
        HashRing {
            hash: hash.unwrap_or(crc32fast::hash),
            replicas,
            positions: Vec::new(),
            owners: FnvHashMap::default(),
        }
    }

    /// Determines if no peer has been added yet.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Returns the number of virtual nodes on the ring.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns the number of virtual nodes per peer.
    pub fn replicas(&self) -> usize {
        self.replicas
    }

    /// Places the given peers onto the ring.
    ///
    /// Note that adding the same peer twice duplicates its virtual nodes, therefore each peer
    /// must only be added once.
    pub fn add<S: AsRef<str>>(&mut self, peers: &[S]) {
        for peer in peers {
            let peer = peer.as_ref();
            for replica in 0..self.replicas {
                let position = (self.hash)(format!("{}{}", replica, peer).as_bytes());
                self.positions.push(position);
                let _ = self.owners.insert(position, peer.to_owned());
            }
        }

        self.positions.sort_unstable();
    }

    /// Returns the peer which owns the given key or **None** if the ring is empty.
    pub fn get(&self, key: &str) -> Option<&str> {
        if self.positions.is_empty() {
            return None;
        }

        let hash = (self.hash)(key.as_bytes());
        let index = self.positions.partition_point(|position| *position < hash);
        let position = self.positions[index % self.positions.len()];

        self.owners.get(&position).map(|peer| peer.as_str())
    }

    /// Lists all distinct peers on the ring in alphabetical order.
    pub fn peers(&self) -> Vec<&str> {
        let mut peers: Vec<&str> = self.owners.values().map(|peer| peer.as_str()).collect();
        peers.sort_unstable();
        peers.dedup();

        peers
    }
}

#[cfg(test)]
mod tests {
    use crate::consistenthash::HashRing;

    /// Uses the numeric value of the given data as position so that the layout of the ring
    /// is predictable.
    fn numeric_hash(data: &[u8]) -> u32 {
        std::str::from_utf8(data).unwrap().parse().unwrap()
    }

    #[test]
    fn keys_are_assigned_to_the_next_position() {
        let mut ring = HashRing::new(3, Some(numeric_hash));

        // Places the positions 2, 4, 6, 12, 14, 16, 22, 24, 26 onto the ring...
        ring.add(&["6", "4", "2"]);
        assert_eq!(ring.len(), 9);

        let expectations = [("2", "2"), ("11", "2"), ("23", "4"), ("27", "2")];
        for (key, owner) in expectations.iter() {
            assert_eq!(ring.get(key), Some(*owner), "wrong owner for {}", key);
        }

        // Adding 8, 18 and 28 takes over 27...
        ring.add(&["8"]);
        assert_eq!(ring.get("27"), Some("8"));
        assert_eq!(ring.get("11"), Some("2"));
        assert_eq!(ring.peers(), vec!["2", "4", "6", "8"]);
    }

    #[test]
    fn lookups_wrap_around_at_the_end_of_the_ring() {
        let mut ring = HashRing::new(1, Some(numeric_hash));
        ring.add(&["10", "20", "30"]);

        // The peers are placed at "010", "020" and "030" (replica index + name)...
        assert_eq!(ring.get("31"), Some("10"));
        assert_eq!(ring.get(&u32::MAX.to_string()), Some("10"));
        assert_eq!(ring.get("0"), Some("10"));
    }

    #[test]
    fn an_empty_ring_has_no_owner() {
        let ring = HashRing::new(10, None);
        assert_eq!(ring.is_empty(), true);
        assert_eq!(ring.get("anything"), None);
        assert_eq!(ring.peers().is_empty(), true);
    }

    #[test]
    fn lookups_are_deterministic() {
        let mut ring = HashRing::new(50, None);
        ring.add(&["alpha", "beta", "gamma"]);

        let mut other = HashRing::new(50, None);
        other.add(&["gamma", "alpha", "beta"]);

        for index in 0..1000 {
            let key = format!("key-{}", index);
            assert_eq!(ring.get(&key), ring.get(&key));
            assert_eq!(ring.get(&key), other.get(&key));
        }
    }

    #[test]
    fn adding_a_peer_only_moves_a_fraction_of_the_keys() {
        const NUM_KEYS: usize = 10_000;
        let mut ring = HashRing::new(100, None);
        ring.add(&["peer-1", "peer-2", "peer-3"]);

        let before: Vec<String> = (0..NUM_KEYS)
            .map(|index| ring.get(&format!("key-{}", index)).unwrap().to_owned())
            .collect();

        ring.add(&["peer-4"]);

        let mut moved = 0;
        for (index, previous_owner) in before.iter().enumerate() {
            let owner = ring.get(&format!("key-{}", index)).unwrap();
            if owner != previous_owner.as_str() {
                // Keys only ever move to the new peer...
                assert_eq!(owner, "peer-4");
                moved += 1;
            }
        }

        // We'd expect a quarter of the keys to move (in contrast to ~75% when using a naive
        // modulo based distribution)...
        let fraction = moved as f64 / NUM_KEYS as f64;
        assert!(fraction > 0.15 && fraction < 0.35, "moved {}", fraction);
    }
}
