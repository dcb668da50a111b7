//! Keeps track of all groups known to a node.
//!
//! Groups are looked up by name, e.g. when answering a request of another peer. The registry is
//! an explicit object (usually owned by a [Node](crate::node::Node)), so that several independent
//! registries can coexist within one process (which is mostly useful for tests).
//!
//! Registering is an atomic check-then-insert: once a name is taken, all further attempts to
//! register a group with this name fail and the original group remains in place.
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::CacheError;
use crate::group::{Group, Loader};
use crate::peers::PeerPicker;

/// Maps group names to groups.
///
/// # Examples
/// ```
/// # use ringcache::registry::Groups;
/// # use ringcache::group::LoaderFn;
/// # use std::sync::Arc;
/// let groups = Groups::new();
/// let loader = Arc::new(LoaderFn::new(|key: &str| Ok(key.as_bytes().to_vec())));
///
/// let scores = groups.new_group("scores", 1024, loader.clone()).unwrap();
/// assert_eq!(scores.name(), "scores");
///
/// assert_eq!(groups.new_group("scores", 2048, loader).is_err(), true);
/// assert_eq!(groups.get("scores").unwrap().cache_bytes(), 1024);
/// ```
#[derive(Default)]
pub struct Groups {
    groups: RwLock<HashMap<String, Arc<Group>>>,
    peers: Option<Arc<dyn PeerPicker>>,
}

impl Groups {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Groups::default()
    }

    /// Creates an empty registry whose groups created via **new_group** use the given peers.
    pub fn with_peers(peers: Arc<dyn PeerPicker>) -> Self {
        Groups {
            groups: RwLock::new(HashMap::new()),
            peers: Some(peers),
        }
    }

    /// Returns the peers handed to groups created by this registry.
    pub fn peers(&self) -> Option<Arc<dyn PeerPicker>> {
        self.peers.clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Group>>> {
        self.groups
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Group>>> {
        self.groups
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Creates and registers a new group.
    ///
    /// The group uses the peers of this registry (if present) and the default load mode.
    pub fn new_group(
        &self,
        name: &str,
        max_bytes: usize,
        loader: Arc<dyn Loader>,
    ) -> Result<Arc<Group>, CacheError> {
        let mut builder = Group::builder(name)
            .max_bytes(max_bytes)
            .shared_loader(loader);
        if let Some(peers) = self.peers.as_ref() {
            builder = builder.peers(peers.clone());
        }

        self.register(builder.build()?)
    }

    /// Registers an already created group.
    ///
    /// Fails with [CacheError::AlreadyExists](CacheError::AlreadyExists) if the name is taken.
    pub fn register(&self, group: Group) -> Result<Arc<Group>, CacheError> {
        let mut groups = self.write();
        if groups.contains_key(group.name()) {
            log::warn!("Refusing to register group {} twice.", group.name());
            return Err(CacheError::AlreadyExists(group.name().to_owned()));
        }

        log::info!(
            "Registered group {} ({} bytes).",
            group.name(),
            group.cache_bytes()
        );
        let group = Arc::new(group);
        let _ = groups.insert(group.name().to_owned(), group.clone());

        Ok(group)
    }

    /// Returns the group with the given name.
    pub fn get(&self, name: &str) -> Option<Arc<Group>> {
        self.read().get(name).cloned()
    }

    /// Returns the group with the given name or fails with
    /// [CacheError::NotFound](CacheError::NotFound).
    pub fn require(&self, name: &str) -> Result<Arc<Group>, CacheError> {
        self.get(name)
            .ok_or_else(|| CacheError::NotFound(name.to_owned()))
    }

    /// Lists the names of all groups in alphabetical order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();

        names
    }

    /// Returns the number of registered groups.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Determines if no group has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use crate::error::CacheError;
    use crate::group::{Group, LoadMode, Loader, LoaderFn};
    use crate::registry::Groups;
    use std::sync::Arc;

    fn echo() -> Arc<dyn Loader> {
        Arc::new(LoaderFn::new(|key: &str| Ok(key.as_bytes().to_vec())))
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let groups = Groups::new();
        let first = groups.new_group("scores", 100, echo()).unwrap();

        assert!(matches!(
            groups.new_group("scores", 200, echo()),
            Err(CacheError::AlreadyExists(name)) if name == "scores"
        ));
        let other = Group::builder("scores")
            .loader(LoaderFn::new(|_: &str| Ok(Vec::new())))
            .load_mode(LoadMode::SingleFlight)
            .build()
            .unwrap();
        assert!(groups.register(other).is_err());

        // The original group is still in place...
        let current = groups.require("scores").unwrap();
        assert_eq!(Arc::ptr_eq(&first, &current), true);
        assert_eq!(current.cache_bytes(), 100);
        assert_eq!(current.load_mode(), LoadMode::Concurrent);
    }

    #[test]
    fn unknown_groups_are_reported() {
        let groups = Groups::new();
        assert_eq!(groups.is_empty(), true);
        assert_eq!(groups.get("scores").is_none(), true);
        assert!(matches!(
            groups.require("scores"),
            Err(CacheError::NotFound(name)) if name == "scores"
        ));
    }

    #[test]
    fn names_are_sorted() {
        let groups = Groups::new();
        for name in ["users", "scores", "articles"] {
            let _ = groups.new_group(name, 0, echo()).unwrap();
        }

        assert_eq!(groups.len(), 3);
        assert_eq!(groups.names(), vec!["articles", "scores", "users"]);
    }

    #[test]
    fn concurrent_registrations_only_admit_one_group() {
        let groups = Arc::new(Groups::new());
        let mut threads = Vec::new();
        for _ in 0..8 {
            let groups = groups.clone();
            threads.push(std::thread::spawn(move || {
                groups.new_group("scores", 0, echo()).is_ok()
            }));
        }

        let successes = threads
            .into_iter()
            .map(|thread| thread.join().unwrap())
            .filter(|success| *success)
            .count();
        assert_eq!(successes, 1);
    }
}
