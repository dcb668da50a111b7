//! Provides a builder which sets up and initializes a cache node.
//!
//! Logging, the config file, the RESP server and the signal handler are all optional. A builder
//! permits to selectively enable or disable them.
//!
//! # Example
//! Setting up a node with all features enabled:
//! ```no_run
//! # use ringcache::builder::Builder;
//! #[tokio::main]
//! async fn main() {
//!     // Enable all features and build the node...
//!     let node = Builder::new().enable_all().build().await;
//!
//!     // Register custom groups here...
//!
//!     // Run the server until the node is terminated...
//!     node.run().await;
//! }
//! ```
use std::sync::Arc;

use crate::config::Config;
use crate::node::Node;
use crate::server::Server;
use crate::{init_logging, RINGCACHE_REVISION, RINGCACHE_VERSION};

/// Initializes a [Node](crate::node::Node) along with the selected components.
#[derive(Default)]
pub struct Builder {
    setup_logging: bool,
    enable_signals: bool,
    setup_config: bool,
    setup_server: bool,
    config: Option<Arc<Config>>,
}

impl Builder {
    /// Creates a new builder with all components disabled.
    pub fn new() -> Self {
        Builder::default()
    }

    /// Enables all features.
    ///
    /// Note that components added in a later version will then also be enabled by default.
    pub fn enable_all(mut self) -> Self {
        self.setup_logging = true;
        self.enable_signals = true;
        self.setup_config = true;
        self.setup_server = true;

        self
    }

    /// Enables the automatic setup of the logging system.
    ///
    /// This initializes **simplelog** to log to stdout, which is all that is needed when running
    /// in a container.
    pub fn enable_logging(mut self) -> Self {
        self.setup_logging = true;
        self
    }

    /// Disables the setup of the logging system after [enable_all()](Builder::enable_all)
    /// has been used.
    pub fn disable_logging(mut self) -> Self {
        self.setup_logging = false;
        self
    }

    /// Installs a signal listener which terminates the node once **CTRL-C** or **SIGHUP**
    /// is received.
    ///
    /// For more details see: [signals](crate::signals)
    pub fn enable_signals(mut self) -> Self {
        self.enable_signals = true;
        self
    }

    /// Disables installing the signal listener after [enable_all()](Builder::enable_all)
    /// has been used.
    pub fn disable_signals(mut self) -> Self {
        self.enable_signals = false;
        self
    }

    /// Loads and observes **config/settings.yml**.
    ///
    /// For more details see: [config](crate::config)
    pub fn enable_config(mut self) -> Self {
        self.setup_config = true;
        self
    }

    /// Disables loading the config file after [enable_all()](Builder::enable_all)
    /// has been used.
    pub fn disable_config(mut self) -> Self {
        self.setup_config = false;
        self
    }

    /// Uses the given config instead of loading **config/settings.yml**.
    ///
    /// The config isn't watched for file changes, but each change made via
    /// [load_from_string](Config::load_from_string) is still applied to the node.
    pub fn with_config(mut self, config: Arc<Config>) -> Self {
        self.config = Some(config);
        self
    }

    /// Creates a [Server](crate::server::Server) for the node.
    ///
    /// Note that the server is started by [Node::run](crate::node::Node::run).
    pub fn enable_server(mut self) -> Self {
        self.setup_server = true;
        self
    }

    /// Disables creating a server after [enable_all()](Builder::enable_all) has been used.
    pub fn disable_server(mut self) -> Self {
        self.setup_server = false;
        self
    }

    /// Builds the node with all enabled components.
    pub async fn build(self) -> Arc<Node> {
        if self.setup_logging {
            init_logging();
        }

        log::info!(
            "||. RINGCACHE (v {} - rev {}) running on {} core(s) in {} CPU(s)",
            RINGCACHE_VERSION,
            RINGCACHE_REVISION,
            num_cpus::get(),
            num_cpus::get_physical()
        );

        let (config, watch_config) = match self.config {
            Some(config) => (Some(config), false),
            None if self.setup_config => (Some(crate::config::install().await), true),
            None => (None, false),
        };

        let server = if self.setup_server {
            Some(Server::new())
        } else {
            None
        };

        let node = Node::new(config.clone(), server);
        if let Some(config) = config {
            node.apply_config(&config.current());
            if watch_config {
                crate::config::watch(node.clone(), config);
            }
            crate::node::listen_for_config_changes(node.clone());
        }

        if self.enable_signals {
            crate::signals::install(node.clone());
        }

        node
    }
}
