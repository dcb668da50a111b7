//! Wires groups, peers, the config and the server into a running cache node.
//!
//! A **Node** owns the [Groups](crate::registry::Groups) registry and the shared
//! [RingPeers](crate::peers::RingPeers). All groups created via the registry use these peers to
//! determine the owner of a key.
//!
//! If a config is present, the node applies it initially and once it changes:
//! * **peers.members**, **peers.self** and **peers.replicas** rebuild the ring.
//! * **peers.timeout** determines how long a remote peer may take to answer (this applies to
//!   peers which join the cluster after the change).
//! * Each entry in **groups** creates a group which serves the files of its **source**
//!   directory. Groups which already exist are resized according to **max_memory**. Groups which
//!   vanish from the config keep running, as the registry never removes a group.
//!
//! Invalid entries are logged and skipped. They never tear down a running group.
//!
//! # Examples
//! ```
//! # use ringcache::node::Node;
//! # use ringcache::config::Config;
//! # use std::sync::Arc;
//! let config = Arc::new(Config::new("settings.yml"));
//! config.load_from_string("
//! peers:
//!     self: 10.0.0.1:2410
//!     members: [ 10.0.0.1:2410, 10.0.0.2:2410 ]
//! groups:
//!     scores:
//!         max_memory: 16m
//!         source: data/scores
//! ", None).unwrap();
//!
//! let node = Node::new(Some(config.clone()), None);
//! node.apply_config(&config.current());
//!
//! assert_eq!(node.peers().members(), vec!["10.0.0.1:2410", "10.0.0.2:2410"]);
//! assert_eq!(node.groups().require("scores").unwrap().cache_bytes(), 16 * 1024 * 1024);
//! ```
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use yaml_rust::Yaml;

use crate::client::RespPeer;
use crate::config::{Config, Handle};
use crate::group::{Group, LoadMode};
use crate::loaders::FileLoader;
use crate::peers::{PeerGetter, PeerPicker, RingPeers};
use crate::registry::Groups;
use crate::server::Server;

/// Contains the number of virtual nodes per peer if none is configured.
pub const DEFAULT_REPLICAS: usize = 50;

/// Contains the time a peer may take to answer if nothing else is configured.
pub const DEFAULT_PEER_TIMEOUT: Duration = Duration::from_secs(5);

/// Represents a cache node.
pub struct Node {
    groups: Arc<Groups>,
    peers: Arc<RingPeers>,
    config: Option<Arc<Config>>,
    server: Option<Arc<Server>>,
    peer_timeout_millis: Arc<AtomicU64>,
    configured_groups: Mutex<HashSet<String>>,
    running: AtomicBool,
}

/// Describes the cluster as given in the config.
#[derive(Debug, PartialEq, Eq)]
struct PeerSettings {
    self_address: String,
    members: Vec<String>,
    replicas: usize,
    timeout: Duration,
}

/// Describes a group as given in the config.
#[derive(Debug, PartialEq, Eq)]
struct GroupSettings {
    max_bytes: usize,
    mode: LoadMode,
    source: Option<String>,
}

impl Node {
    /// Creates a new node which uses the given config and server (if present).
    ///
    /// Note that the config isn't applied here. Use [apply_config](Node::apply_config) or let
    /// the [Builder](crate::builder::Builder) take care of this.
    pub fn new(config: Option<Arc<Config>>, server: Option<Arc<Server>>) -> Arc<Self> {
        let peer_timeout_millis = Arc::new(AtomicU64::new(DEFAULT_PEER_TIMEOUT.as_millis() as u64));
        let timeout = peer_timeout_millis.clone();
        let peers = Arc::new(RingPeers::new(Arc::new(move |address: &str| {
            Arc::new(RespPeer::new(
                address,
                Duration::from_millis(timeout.load(Ordering::Relaxed)),
            )) as Arc<dyn PeerGetter>
        })));

        Arc::new(Node {
            groups: Arc::new(Groups::with_peers(peers.clone() as Arc<dyn PeerPicker>)),
            peers,
            config,
            server,
            peer_timeout_millis,
            configured_groups: Mutex::new(HashSet::new()),
            running: AtomicBool::new(true),
        })
    }

    /// Returns the registry of all groups of this node.
    pub fn groups(&self) -> &Arc<Groups> {
        &self.groups
    }

    /// Returns the members of the cluster.
    pub fn peers(&self) -> &Arc<RingPeers> {
        &self.peers
    }

    /// Returns the config of this node, if present.
    pub fn config(&self) -> Option<&Arc<Config>> {
        self.config.as_ref()
    }

    /// Returns the server of this node, if present.
    pub fn server(&self) -> Option<&Arc<Server>> {
        self.server.as_ref()
    }

    /// Determines if the node is still running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stops the node.
    ///
    /// All background tasks (server, config watcher) will complete shortly after.
    pub fn terminate(&self) {
        log::info!("Terminating node...");
        self.running.store(false, Ordering::Release);
    }

    /// Runs the server until the node is terminated.
    ///
    /// If no server is present, this simply waits for the node to be terminated.
    pub async fn run(self: &Arc<Self>) {
        match self.server.as_ref() {
            Some(server) => server.event_loop(self).await,
            None => {
                while self.is_running() {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
            }
        }
    }

    /// Applies the given config to the peers and groups of this node.
    pub fn apply_config(&self, handle: &Handle) {
        match PeerSettings::parse(handle) {
            Ok(settings) => {
                self.peer_timeout_millis
                    .store(settings.timeout.as_millis() as u64, Ordering::Relaxed);
                self.peers.set_peers(
                    &settings.self_address,
                    settings.replicas,
                    &settings.members,
                );
            }
            Err(error) => log::error!("Ignoring invalid peer config: {:#}", error),
        }

        let no_groups = yaml_rust::yaml::Hash::new();
        let groups = match handle.query("groups") {
            Yaml::Hash(groups) => groups,
            Yaml::BadValue | Yaml::Null => &no_groups,
            _ => {
                log::error!("Ignoring invalid group config: 'groups' must be a mapping.");
                return;
            }
        };

        let mut configured = self
            .configured_groups
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut seen = HashSet::new();
        for (name, settings) in groups.iter() {
            let name = match name.as_str() {
                Some(name) => name,
                None => {
                    log::error!("Ignoring group with a non-string name: {:?}", name);
                    continue;
                }
            };
            let _ = seen.insert(name.to_owned());

            match GroupSettings::parse(settings) {
                Ok(settings) => {
                    if self.apply_group(name, settings) {
                        let _ = configured.insert(name.to_owned());
                    }
                }
                Err(error) => log::error!("Ignoring invalid config of group {}: {:#}", name, error),
            }
        }

        for vanished in configured.iter().filter(|name| !seen.contains(*name)) {
            log::warn!(
                "Group {} was removed from the config but remains active until the node restarts.",
                vanished
            );
        }
    }

    /// Creates or resizes a group. Returns **true** if the group is present afterwards.
    fn apply_group(&self, name: &str, settings: GroupSettings) -> bool {
        if let Some(group) = self.groups.get(name) {
            if group.cache_bytes() != settings.max_bytes {
                log::info!(
                    "Resizing group {} from {} to {}...",
                    name,
                    crate::fmt::format_size(group.cache_bytes()),
                    crate::fmt::format_size(settings.max_bytes)
                );
                group.set_cache_bytes(settings.max_bytes);
            }
            if group.load_mode() != settings.mode {
                log::warn!(
                    "The load mode of group {} cannot be changed without a restart.",
                    name
                );
            }

            return true;
        }

        let source = match settings.source {
            Some(source) => source,
            None => {
                log::error!("Group {} requires a 'source' directory.", name);
                return false;
            }
        };

        let mut builder = Group::builder(name)
            .max_bytes(settings.max_bytes)
            .load_mode(settings.mode)
            .loader(FileLoader::new(source));
        if let Some(peers) = self.groups.peers() {
            builder = builder.peers(peers);
        }

        match builder
            .build()
            .and_then(|group| self.groups.register(group))
        {
            Ok(_) => true,
            Err(error) => {
                log::error!("Cannot create group {}: {}", name, error);
                false
            }
        }
    }
}

/// Re-applies the config of the given node whenever it changes.
pub fn listen_for_config_changes(node: Arc<Node>) {
    let config = match node.config() {
        Some(config) => config.clone(),
        None => return,
    };

    let mut notifier = config.notifier();
    crate::spawn!(async move {
        while node.is_running() {
            match tokio::time::timeout(Duration::from_millis(500), notifier.recv()).await {
                Ok(Ok(_)) | Ok(Err(tokio::sync::broadcast::error::RecvError::Lagged(_))) => {
                    log::info!("Applying the changed config...");
                    node.apply_config(&config.current());
                }
                Ok(Err(_)) => return,
                Err(_) => (),
            }
        }
    });
}

impl PeerSettings {
    fn parse(handle: &Handle) -> anyhow::Result<Self> {
        let port = match handle.query("server.port") {
            Yaml::BadValue => crate::server::DEFAULT_PORT,
            port => port
                .as_i64()
                .filter(|port| *port > 0 && *port <= u16::MAX as i64)
                .ok_or_else(|| anyhow::anyhow!("'server.port' must be a valid port"))?
                as u16,
        };

        let self_address = match handle.query("peers.self") {
            Yaml::BadValue => format!("127.0.0.1:{}", port),
            address => address
                .as_str()
                .ok_or_else(|| anyhow::anyhow!("'peers.self' must be an address"))?
                .to_owned(),
        };

        let members = match handle.query("peers.members") {
            Yaml::BadValue | Yaml::Null => Vec::new(),
            Yaml::Array(members) => members
                .iter()
                .map(|member| {
                    member
                        .as_str()
                        .map(|member| member.to_owned())
                        .ok_or_else(|| anyhow::anyhow!("Invalid member: {:?}", member))
                })
                .collect::<anyhow::Result<Vec<String>>>()?,
            _ => return Err(anyhow::anyhow!("'peers.members' must be a list")),
        };

        if !members.is_empty() && !members.contains(&self_address) {
            log::warn!(
                "This node ({}) isn't listed in 'peers.members' and will delegate all keys.",
                self_address
            );
        }

        let replicas = match handle.query("peers.replicas") {
            Yaml::BadValue => DEFAULT_REPLICAS,
            replicas => replicas
                .as_i64()
                .filter(|replicas| *replicas > 0)
                .ok_or_else(|| anyhow::anyhow!("'peers.replicas' must be a positive number"))?
                as usize,
        };

        let timeout = match handle.query("peers.timeout") {
            Yaml::BadValue => DEFAULT_PEER_TIMEOUT,
            Yaml::Integer(millis) if *millis > 0 => Duration::from_millis(*millis as u64),
            Yaml::String(timeout) => crate::fmt::parse_duration(timeout)?,
            _ => return Err(anyhow::anyhow!("'peers.timeout' must be a duration like '5s'")),
        };

        Ok(PeerSettings {
            self_address,
            members,
            replicas,
            timeout,
        })
    }
}

impl GroupSettings {
    fn parse(settings: &Yaml) -> anyhow::Result<Self> {
        if settings.as_hash().is_none() {
            return Err(anyhow::anyhow!("the settings must be a mapping"));
        }

        let max_bytes = match &settings["max_memory"] {
            Yaml::BadValue => 0,
            Yaml::Integer(bytes) if *bytes >= 0 => *bytes as usize,
            Yaml::String(size) => crate::fmt::parse_size(size)?,
            _ => return Err(anyhow::anyhow!("'max_memory' must be a size like '64m'")),
        };

        let mode = match &settings["single_flight"] {
            Yaml::BadValue | Yaml::Boolean(false) => LoadMode::Concurrent,
            Yaml::Boolean(true) => LoadMode::SingleFlight,
            _ => return Err(anyhow::anyhow!("'single_flight' must be true or false")),
        };

        let source = match &settings["source"] {
            Yaml::BadValue => None,
            Yaml::String(source) => Some(source.clone()),
            _ => return Err(anyhow::anyhow!("'source' must be a directory")),
        };

        Ok(GroupSettings {
            max_bytes,
            mode,
            source,
        })
    }
}
