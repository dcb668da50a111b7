//! Ringcache is a distributed read-through cache for immutable values.
//!
//! # Introduction
//! Data is organized in named **groups**. Each group has a byte budget and a **loader** which
//! fetches a value from the system of record once it isn't cached. Several **peers** form a
//! cluster: a consistent-hash ring assigns each key to exactly one owning peer, so that every
//! value is loaded by one node and then served from its memory. Other peers ask the owner for
//! the value instead of loading it themselves.
//!
//! Peers talk to each other via the [RESP Protocol](https://redis.io/topics/protocol) as defined
//! by **Redis**. Therefore any Redis client can also be used to query a node.
//!
//! # Features
//! * **Byte bounded LRU caches** which evict the least recently used entries once the
//!   configured budget is exceeded (see [lru](crate::lru) and [cache](crate::cache)).
//! * **Consistent hashing** with virtual nodes (see [consistenthash](crate::consistenthash)), so
//!   that adding or removing a peer only moves a fraction of all keys.
//! * **One hop routing**: a request is either answered locally or forwarded to the owning peer,
//!   which never forwards it again (see [group](crate::group)).
//! * **Optional single-flight loading** which collapses concurrent loads of the same key.
//! * **100% Async/Await** - the whole server builds upon [tokio](https://tokio.rs/).
//! * **Reload-aware config facility** which permits to change peers, groups and even the server
//!   address during operation (see [config](crate::config) and [node](crate::node)).
//!
//! # Examples
//! Using a group without any peers:
//! ```
//! # use ringcache::group::{Group, LoaderFn};
//! # #[tokio::main]
//! # async fn main() {
//! let scores = Group::builder("scores")
//!     .max_bytes(1024 * 1024)
//!     .loader(LoaderFn::new(|key: &str| match key {
//!         "Tom" => Ok(b"630".to_vec()),
//!         _ => Err(anyhow::anyhow!("{} doesn't exist", key)),
//!     }))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(scores.get("Tom").await.unwrap().as_slice(), b"630");
//! assert_eq!(scores.get("Jerry").await.is_err(), true);
//! # }
//! ```
//!
//! A complete node is set up via the [Builder](builder::Builder). The **ringcache-io** binary
//! does exactly this and serves the groups declared in **config/settings.yml**.
#![warn(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_results
)]
use simplelog::{format_description, ConfigBuilder, LevelFilter, SimpleLogger};
use std::sync::Once;

pub mod builder;
pub mod byteview;
pub mod cache;
pub mod client;
pub mod config;
pub mod consistenthash;
pub mod error;
pub mod fmt;
pub mod group;
pub mod loaders;
pub mod lru;
pub mod node;
pub mod peers;
pub mod registry;
pub mod request;
pub mod response;
pub mod server;
pub mod signals;

/// Contains the version of the ringcache library.
pub const RINGCACHE_VERSION: &str = "DEVELOPMENT-SNAPSHOT";

/// Contains the git commit hash of the build being used.
pub const RINGCACHE_REVISION: &str = "NO-REVISION";

/// Initializes the logging system.
///
/// Note that most probably the simplest way is to use a [Builder](builder::Builder) to set up the
/// framework, which will also set up logging if enabled.
pub fn init_logging() {
    static INIT_LOGGING: Once = Once::new();

    // Tests might build several nodes, but the logger may only be installed once...
    INIT_LOGGING.call_once(|| {
        if let Err(error) = SimpleLogger::init(
            LevelFilter::Debug,
            ConfigBuilder::new()
                .set_time_format_custom(format_description!(
                    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]"
                ))
                .set_thread_level(LevelFilter::Trace)
                .set_target_level(LevelFilter::Error)
                .set_location_level(LevelFilter::Trace)
                .build(),
        ) {
            panic!("Failed to initialize logging system: {}", error);
        }
    });
}

/// Provides a simple macro to execute an async lambda within `tokio::spawn`.
///
/// The returned join handle is dropped, so the task simply runs detached.
///
/// # Example
/// ```rust
/// # #[macro_use] extern crate ringcache;
/// # #[tokio::main]
/// # async fn main() {
/// spawn!(async move {
///     // perform some async stuff here...
/// });
/// # }
/// ```
#[macro_export]
macro_rules! spawn {
    ($e:expr) => {{
        std::mem::drop(tokio::spawn($e));
    }};
}
