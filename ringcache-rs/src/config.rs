//! Contains the system configuration.
//!
//! The configuration is read from **config/settings.yml**. This file is observed and re-loaded
//! once a change is detected, so that a node picks up new peers, new groups or a changed memory
//! budget without being restarted (a restart would drop the whole cache after all).
//!
//! Each user of the config should therefore subscribe to the [Config::notifier](Config::notifier)
//! and re-process the config once a change message is received. Note that a [Handle](Handle)
//! obtained via [Config::current](Config::current) must not be kept around, as it isn't updated
//! once a new config has been loaded.
//!
//! # Examples
//! ```
//! # use ringcache::config::Config;
//! let config = Config::new("settings.yml");
//! config.load_from_string("
//! server:
//!     port: 2411
//! groups:
//!     scores:
//!         max_memory: 64m
//! ", None).unwrap();
//!
//! let handle = config.current();
//! assert_eq!(handle.query("server.port").as_i64(), Some(2411));
//! assert_eq!(handle.query("groups.scores.max_memory").as_str(), Some("64m"));
//!
//! // Unknown paths yield a BadValue...
//! assert_eq!(handle.query("server.host").is_badvalue(), true);
//! ```
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::Context;
use arc_swap::ArcSwap;
use yaml_rust::{Yaml, YamlLoader};

use crate::node::Node;

/// Contains the file which is loaded by [install](install).
pub const CONFIG_FILE: &str = "config/settings.yml";

/// Provides access to the system configuration.
pub struct Config {
    filename: String,
    tx: tokio::sync::broadcast::Sender<()>,
    config: ArcSwap<(Yaml, Option<SystemTime>)>,
}

/// Represents the change listener.
///
/// The message itself carries no information. Once it is received, the config has changed and
/// needs to be re-processed.
pub type ChangeNotifier = tokio::sync::broadcast::Receiver<()>;

/// Represents a handle to the currently loaded configuration.
pub struct Handle {
    config: Arc<(Yaml, Option<SystemTime>)>,
}

impl Config {
    /// Creates a new and empty config which is backed by the given file.
    pub fn new(file: &str) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(1);
        Config {
            filename: file.to_owned(),
            config: ArcSwap::new(Arc::new((Yaml::Null, None))),
            tx,
        }
    }

    /// Obtains a change notifier which receives a message once the config changed.
    pub fn notifier(&self) -> ChangeNotifier {
        self.tx.subscribe()
    }

    /// Obtains a handle to the currently loaded configuration.
    pub fn current(&self) -> Handle {
        Handle {
            config: self.config.load_full(),
        }
    }

    /// Determines the last modified date of the config file.
    ///
    /// An unmounted docker volume shows up as directory and is therefore treated as absent.
    #[cfg(not(test))]
    async fn last_modified(&self) -> Option<SystemTime> {
        tokio::fs::metadata(&self.filename)
            .await
            .ok()
            .filter(|metadata| metadata.is_file())
            .and_then(|metadata| metadata.modified().ok())
    }

    /// Reads the underlying file.
    pub async fn load(&self) -> anyhow::Result<()> {
        log::info!("Loading config file {}...", &self.filename);

        let metadata = match tokio::fs::metadata(&self.filename).await {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => {
                log::info!("Config file doesn't exist or isn't a file - skipping config load.");
                return Ok(());
            }
        };

        let data = tokio::fs::read_to_string(&self.filename)
            .await
            .with_context(|| format!("Cannot load config file {}", &self.filename))?;

        self.load_from_string(&data, metadata.modified().ok())
    }

    /// Validates and writes the given config into the underlying file.
    ///
    /// The file watcher will then pick up the new contents.
    pub async fn store(&self, config: &str) -> anyhow::Result<()> {
        let _ = YamlLoader::load_from_str(config).context("Cannot parse config data")?;

        tokio::fs::write(&self.filename, config)
            .await
            .with_context(|| format!("Failed to write config file {}", &self.filename))?;
        log::info!("Config file {} has been updated.", &self.filename);

        Ok(())
    }

    /// Loads the configuration from the given string instead of the file.
    ///
    /// An invalid document is rejected and leaves the current config in place. A valid one
    /// replaces the current config and notifies all listeners.
    pub fn load_from_string(
        &self,
        data: &str,
        last_modified: Option<SystemTime>,
    ) -> anyhow::Result<()> {
        let docs = YamlLoader::load_from_str(data)
            .with_context(|| format!("Cannot parse config file {}", &self.filename))?;

        let doc = match docs.into_iter().next() {
            Some(doc @ Yaml::Hash(_)) => doc,
            Some(Yaml::Null) | None => Yaml::Null,
            Some(_) => {
                return Err(anyhow::anyhow!(
                    "Config file {} must contain a mapping at the top level",
                    &self.filename
                ))
            }
        };

        self.config.store(Arc::new((doc, last_modified)));

        // There might be no listeners at all...
        let _ = self.tx.send(());

        Ok(())
    }

    #[cfg(not(test))]
    fn last_loaded(&self) -> Option<SystemTime> {
        self.config.load().1
    }
}

impl Handle {
    /// Returns the root of the loaded document.
    pub fn root(&self) -> &Yaml {
        &self.config.0
    }

    /// Navigates along the given dotted path, e.g. "peers.members".
    ///
    /// Returns **Yaml::BadValue** if any part of the path doesn't exist.
    pub fn query(&self, path: impl AsRef<str>) -> &Yaml {
        path.as_ref()
            .split('.')
            .fold(self.root(), |node, key| &node[key])
    }
}

/// Creates the config, loads **config/settings.yml** if present and returns it.
///
/// Call [watch](watch) once the node exists to keep the config up to date.
pub async fn install() -> Arc<Config> {
    let path = Path::new(CONFIG_FILE);
    if let Some(directory) = path.parent() {
        if let Err(error) = tokio::fs::create_dir_all(directory).await {
            log::warn!(
                "Failed to create config directory {}: {}",
                directory.display(),
                error
            );
        }
    }

    let config = Arc::new(Config::new(CONFIG_FILE));
    if let Err(error) = config.load().await {
        log::error!("{:#}", error);
    }

    config
}

/// Polls the config file every 2s and re-loads it once it was modified.
#[cfg(not(test))]
pub fn watch(node: Arc<Node>, config: Arc<Config>) {
    crate::spawn!(async move {
        while node.is_running() {
            tokio::time::sleep(std::time::Duration::from_secs(2)).await;

            let last_modified = config.last_modified().await;
            let last_loaded = config.last_loaded();
            if last_modified.is_some() && (last_loaded.is_none() || last_modified > last_loaded) {
                match config.load().await {
                    Ok(_) => log::info!("System configuration was re-loaded."),
                    Err(error) => log::error!("Failed to re-load system config: {:#}", error),
                }
            }
        }
    });
}

#[cfg(test)]
pub fn watch(_node: Arc<Node>, _config: Arc<Config>) {
    // No automatic reloads during tests...
}
